//! Protocol state machine - core orchestration engine.
//!
//! [`ProtocolState`] holds every ledger and registry of the engine.
//! [`Protocol`] owns that state and is the only way to change it: each
//! public entry point runs inside [`Protocol::transact`], which snapshots
//! the state, runs the operation and restores the snapshot if anything
//! fails. A multi-step operation (mint, invest, emit) therefore either
//! commits completely or leaves no trace, events included.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::core::config::ProtocolParams;
use crate::core::leadrate::{Leadrate, RateProposal};
use crate::core::savings::Savings;
use crate::core::stablecoin::Stablecoin;
use crate::core::token::TokenLedger;
use crate::error::{Error, Result};
use crate::position::challenge::{Challenge, ChallengeBook};
use crate::position::kind::MintReceipt;
use crate::position::position::{Position, PositionId, PositionState};
use crate::position::registry::PositionRegistry;
use crate::protocol::events::{EventLog, EventRecord, ProtocolEvent};
use crate::protocol::operations::*;
use crate::reserve::pool::ReservePool;
use crate::storage::backend::{make_key, prefixes, StorageBackend, TypedStore, ENGINE_STATE_KEY};
use crate::utils::address::Address;
use crate::utils::constants::TOKEN_DECIMALS;

// ═══════════════════════════════════════════════════════════════════════════════
// CONTRACT REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// What lives at a contract address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractKind {
    /// Minting hub (position factory and challenge escrow)
    Hub,
    /// Position roller
    Roller,
    /// Reserve pool
    Reserve,
    /// Savings module
    Savings,
    /// Bridge minter
    Bridge,
    /// Collateral token
    Token,
    /// A position
    Position(PositionId),
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolState {
    /// Tunable parameters
    pub params: ProtocolParams,
    /// Current block height
    pub block_height: u64,
    /// Current timestamp
    pub timestamp: u64,
    /// Stablecoin ledger
    pub stablecoin: Stablecoin,
    /// Collateral token ledgers by token address
    pub tokens: HashMap<Address, TokenLedger>,
    /// Reserve pool
    pub reserve: ReservePool,
    /// Leading rate
    pub leadrate: Leadrate,
    /// Savings module
    pub savings: Savings,
    /// Position arena
    pub positions: PositionRegistry,
    /// Challenges
    pub challenges: ChallengeBook,
    /// Contract addresses and what they hold
    pub contracts: HashMap<Address, ContractKind>,
    /// Emitted events
    pub events: EventLog,
    /// Minting hub address
    pub hub: Address,
    /// Roller address
    pub roller: Address,
    /// Bridge minter address
    pub bridge: Address,
}

impl ProtocolState {
    /// Fresh state with the hub, roller and bridge as initial minters
    pub fn genesis(params: ProtocolParams, leadrate_ppm: u32, timestamp: u64) -> Result<Self> {
        params.validate()?;

        let hub = Address::derive("hub", 0);
        let roller = Address::derive("roller", 0);
        let bridge = Address::derive("bridge", 0);
        let reserve = ReservePool::new(Address::derive("reserve", 0), &params);
        let savings = Savings::new(Address::derive("savings", 0));

        let mut stablecoin = Stablecoin::new("JUSD", reserve.address());
        stablecoin.initialize_minter(hub, "minting hub")?;
        stablecoin.initialize_minter(roller, "position roller")?;
        stablecoin.initialize_minter(bridge, "bridge")?;

        let contracts = HashMap::from([
            (hub, ContractKind::Hub),
            (roller, ContractKind::Roller),
            (bridge, ContractKind::Bridge),
            (reserve.address(), ContractKind::Reserve),
            (savings.address(), ContractKind::Savings),
        ]);

        Ok(Self {
            events: EventLog::new(params.max_events),
            params,
            block_height: 0,
            timestamp,
            stablecoin,
            tokens: HashMap::new(),
            reserve,
            leadrate: Leadrate::new(leadrate_ppm, timestamp),
            savings,
            positions: PositionRegistry::new(),
            challenges: ChallengeBook::new(),
            contracts,
            hub,
            roller,
            bridge,
        })
    }

    /// Record an event at the current block
    pub fn emit(&mut self, event: ProtocolEvent) {
        debug!(block = self.block_height, "{:?}", event);
        self.events.push(EventRecord {
            block_height: self.block_height,
            timestamp: self.timestamp,
            event,
        });
    }

    /// What lives at `address`, if anything
    pub fn contract_kind(&self, address: &Address) -> Option<ContractKind> {
        self.contracts.get(address).copied()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COLLATERAL TOKENS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Ledger of a collateral token
    pub fn token(&self, token: &Address) -> Result<&TokenLedger> {
        self.tokens
            .get(token)
            .ok_or_else(|| Error::UnknownToken(token.to_string()))
    }

    fn token_mut(&mut self, token: &Address) -> Result<&mut TokenLedger> {
        self.tokens
            .get_mut(token)
            .ok_or_else(|| Error::UnknownToken(token.to_string()))
    }

    /// Collateral balance held at a position's address
    pub fn collateral_balance(&self, id: PositionId) -> Result<u128> {
        let position = self.positions.get(id)?;
        Ok(self.token(&position.collateral_token)?.balance_of(&position.address))
    }

    /// Move collateral tokens between accounts
    pub(crate) fn move_collateral(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<()> {
        self.token_mut(&token)?.transfer(from, to, amount)
    }

    /// Register a collateral token; returns its address
    pub fn create_token(&mut self, symbol: &str, decimals: u8) -> Result<Address> {
        let address = Address::token(symbol);
        if self.tokens.contains_key(&address) {
            return Err(Error::InvalidParameter {
                name: "symbol".into(),
                reason: format!("token {} already exists", symbol),
            });
        }
        self.tokens
            .insert(address, TokenLedger::with_decimals(symbol, decimals));
        self.contracts.insert(address, ContractKind::Token);
        Ok(address)
    }

    /// Mint collateral tokens to an account
    pub fn mint_collateral(&mut self, token: Address, to: Address, amount: u128) -> Result<()> {
        self.token_mut(&token)?.mint(to, amount)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Transactional engine front end
#[derive(Debug, Clone)]
pub struct Protocol {
    state: ProtocolState,
}

impl Protocol {
    /// Create an engine with the given parameters and initial leading rate
    pub fn new(params: ProtocolParams, leadrate_ppm: u32) -> Result<Self> {
        Ok(Self {
            state: ProtocolState::genesis(params, leadrate_ppm, 0)?,
        })
    }

    /// Wrap an existing state
    pub fn from_state(state: ProtocolState) -> Self {
        Self { state }
    }

    /// Read-only view of the state
    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    /// Run `f` atomically: on error the state is restored to what it was before
    pub fn transact<T, F>(&mut self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut ProtocolState) -> Result<T>,
    {
        let snapshot = self.state.clone();
        match f(&mut self.state) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.state = snapshot;
                warn!(operation, code = e.code(), "Transaction rolled back: {}", e);
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BLOCK PROCESSING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Begin a new block; time never moves backwards
    pub fn begin_block(&mut self, height: u64, timestamp: u64) -> Result<()> {
        if timestamp < self.state.timestamp {
            return Err(Error::InvalidParameter {
                name: "timestamp".into(),
                reason: format!(
                    "{} is before the current time {}",
                    timestamp, self.state.timestamp
                ),
            });
        }
        self.state.block_height = height;
        self.state.timestamp = timestamp;
        Ok(())
    }

    /// Move to the next block `seconds` later
    pub fn advance_time(&mut self, seconds: u64) {
        self.state.block_height += 1;
        self.state.timestamp = self.state.timestamp.saturating_add(seconds);
    }

    /// Current timestamp
    pub fn timestamp(&self) -> u64 {
        self.state.timestamp
    }

    /// Current block height
    pub fn block_height(&self) -> u64 {
        self.state.block_height
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SETUP
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a collateral token
    pub fn create_token(&mut self, symbol: &str) -> Result<Address> {
        self.transact("create_token", |s| s.create_token(symbol, TOKEN_DECIMALS))
    }

    /// Mint collateral tokens
    pub fn mint_collateral(&mut self, token: Address, to: Address, amount: u128) -> Result<()> {
        self.transact("mint_collateral", |s| s.mint_collateral(token, to, amount))
    }

    /// Mint stablecoin through the bridge minter
    pub fn faucet(&mut self, to: Address, amount: u128) -> Result<()> {
        self.transact("faucet", |s| {
            let bridge = s.bridge;
            let now = s.timestamp;
            s.stablecoin.mint(bridge, to, amount, now)
        })
    }

    /// Transfer stablecoin between accounts
    pub fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<()> {
        self.transact("transfer", |s| s.stablecoin.transfer(from, to, amount))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Look up a position
    pub fn position(&self, id: PositionId) -> Result<&Position> {
        self.state.positions.get(id)
    }

    /// Lifecycle state of a position now
    pub fn position_state(&self, id: PositionId) -> Result<PositionState> {
        Ok(self.position(id)?.state(self.state.timestamp))
    }

    /// Collateral held by a position
    pub fn collateral_of(&self, id: PositionId) -> Result<u128> {
        self.state.collateral_balance(id)
    }

    /// Principal plus interest as of now
    pub fn debt_of(&self, id: PositionId) -> Result<u128> {
        let position = self.position(id)?;
        Ok(position.principal + position.interest_at(self.state.timestamp)?)
    }

    /// Look up a challenge
    pub fn challenge(&self, id: u64) -> Result<&Challenge> {
        self.state.challenges.get(id)
    }

    /// Stablecoin balance
    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.state.stablecoin.balance_of(holder)
    }

    /// Collateral token balance
    pub fn token_balance(&self, token: &Address, holder: &Address) -> Result<u128> {
        Ok(self.state.token(token)?.balance_of(holder))
    }

    /// Reserve shares held
    pub fn shares_of(&self, holder: &Address) -> u128 {
        self.state.reserve.shares_of(holder)
    }

    /// Current reserve share price
    pub fn share_price(&self) -> Result<u128> {
        self.state.reserve.price(&self.state.stablecoin)
    }

    /// Reserve equity
    pub fn equity(&self) -> u128 {
        self.state.stablecoin.equity()
    }

    /// Event log
    pub fn events(&self) -> &EventLog {
        &self.state.events
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HUB OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open a new original position
    pub fn open_position(&mut self, owner: Address, params: PositionParams) -> Result<PositionId> {
        self.transact("open_position", |s| s.open_position(owner, &params))
    }

    /// Clone a position, optionally minting right away
    pub fn clone_position(
        &mut self,
        owner: Address,
        parent: PositionId,
        collateral: u128,
        initial_mint: u128,
        expiration: u64,
    ) -> Result<PositionId> {
        self.transact("clone_position", |s| {
            s.clone_position(owner, parent, collateral, initial_mint, expiration)
        })
    }

    /// Veto a position during its initialization period
    pub fn deny_position(&mut self, caller: Address, id: PositionId, helpers: &[Address]) -> Result<()> {
        self.transact("deny_position", |s| s.deny_position(caller, id, helpers))
    }

    /// Start a challenge
    pub fn launch_challenge(
        &mut self,
        challenger: Address,
        id: PositionId,
        size: u128,
        min_price: u128,
    ) -> Result<u64> {
        self.transact("launch_challenge", |s| {
            s.launch_challenge(challenger, id, size, min_price)
        })
    }

    /// Bid on a challenge
    pub fn bid(&mut self, bidder: Address, challenge: u64, size: u128) -> Result<BidOutcome> {
        self.transact("bid", |s| s.bid(bidder, challenge, size))
    }

    /// Settle the remaining size of a matured challenge
    pub fn resolve_challenge(&mut self, bidder: Address, challenge: u64) -> Result<BidOutcome> {
        self.transact("resolve_challenge", |s| s.resolve_challenge(bidder, challenge))
    }

    /// Buy collateral of an expired position
    pub fn buy_expired_collateral(
        &mut self,
        buyer: Address,
        id: PositionId,
        up_to: u128,
    ) -> Result<ForcedSaleOutcome> {
        self.transact("buy_expired_collateral", |s| {
            s.buy_expired_collateral(buyer, id, up_to)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POSITION OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mint against a position
    pub fn mint(
        &mut self,
        caller: Address,
        id: PositionId,
        target: Address,
        amount: u128,
    ) -> Result<MintReceipt> {
        self.transact("mint", |s| s.mint(caller, id, target, amount))
    }

    /// Repay debt, interest first
    pub fn repay(&mut self, payer: Address, id: PositionId, amount: u128) -> Result<Repayment> {
        self.transact("repay", |s| s.repay(payer, id, amount))
    }

    /// Deposit collateral
    pub fn deposit_collateral(&mut self, depositor: Address, id: PositionId, amount: u128) -> Result<u128> {
        self.transact("deposit_collateral", |s| s.deposit_collateral(depositor, id, amount))
    }

    /// Withdraw collateral
    pub fn withdraw_collateral(
        &mut self,
        owner: Address,
        id: PositionId,
        target: Address,
        amount: u128,
    ) -> Result<u128> {
        self.transact("withdraw_collateral", |s| {
            s.withdraw_collateral(owner, id, target, amount)
        })
    }

    /// Change the liquidation price; returns the minting cooldown
    pub fn adjust_price(&mut self, owner: Address, id: PositionId, price: u128) -> Result<u64> {
        self.transact("adjust_price", |s| s.adjust_price(owner, id, price))
    }

    /// Move principal, collateral and price to target values
    pub fn adjust(
        &mut self,
        owner: Address,
        id: PositionId,
        principal: u128,
        collateral: u128,
        price: u128,
    ) -> Result<()> {
        self.transact("adjust", |s| s.adjust(owner, id, principal, collateral, price))
    }

    /// Hand a position to a new owner
    pub fn transfer_ownership(&mut self, owner: Address, id: PositionId, new_owner: Address) -> Result<()> {
        self.transact("transfer_ownership", |s| s.transfer_ownership(owner, id, new_owner))
    }

    /// Bring interest up to date; returns the newly accrued amount
    pub fn accrue_interest(&mut self, id: PositionId) -> Result<u128> {
        self.transact("accrue_interest", |s| s.accrue_interest(id))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ROLLER AND AUTO-INVEST
    // ═══════════════════════════════════════════════════════════════════════════

    /// Roll a position into a fresh clone of `target_parent`
    pub fn roll(
        &mut self,
        owner: Address,
        source: PositionId,
        target_parent: PositionId,
        expiration: u64,
    ) -> Result<RollOutcome> {
        self.transact("roll", |s| s.roll(owner, source, target_parent, expiration))
    }

    /// Redeem shares held by an auto-invest position
    pub fn sell_shares(
        &mut self,
        owner: Address,
        id: PositionId,
        shares: u128,
        min_proceeds: u128,
    ) -> Result<ShareSale> {
        self.transact("sell_shares", |s| s.sell_shares(owner, id, shares, min_proceeds))
    }

    /// Move all shares of an auto-invest position
    pub fn transfer_shares(&mut self, caller: Address, id: PositionId, target: Address) -> Result<u128> {
        self.transact("transfer_shares", |s| s.transfer_position_shares(caller, id, target))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RESERVE, RATE AND SAVINGS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Invest in the reserve; returns the shares received
    pub fn invest(&mut self, investor: Address, amount: u128, min_shares: u128) -> Result<u128> {
        self.transact("invest", |s| s.invest(investor, amount, min_shares))
    }

    /// Redeem reserve shares; returns the proceeds
    pub fn redeem(&mut self, holder: Address, shares: u128, min_proceeds: u128) -> Result<u128> {
        self.transact("redeem", |s| s.redeem(holder, shares, min_proceeds))
    }

    /// Delegate votes
    pub fn delegate(&mut self, holder: Address, delegate: Address) -> Result<()> {
        self.transact("delegate", |s| s.delegate(holder, delegate))
    }

    /// Propose a new leading rate
    pub fn propose_rate(&mut self, proposer: Address, rate_ppm: u32, helpers: &[Address]) -> Result<RateProposal> {
        self.transact("propose_rate", |s| s.propose_rate(proposer, rate_ppm, helpers))
    }

    /// Apply a matured rate proposal
    pub fn apply_rate_change(&mut self) -> Result<u32> {
        self.transact("apply_rate_change", |s| s.apply_rate_change())
    }

    /// Deposit into savings; returns the new balance
    pub fn save(&mut self, owner: Address, amount: u128) -> Result<u128> {
        self.transact("save", |s| s.save(owner, amount))
    }

    /// Withdraw from savings; returns the amount withdrawn
    pub fn withdraw_savings(&mut self, owner: Address, target: Address, amount: u128) -> Result<u128> {
        self.transact("withdraw_savings", |s| s.withdraw_savings(owner, target, amount))
    }

    /// Settle savings interest; returns the interest paid
    pub fn refresh_savings(&mut self, owner: Address) -> Result<u128> {
        self.transact("refresh_savings", |s| s.refresh_savings(owner))
    }

    /// Apply for minting rights
    pub fn suggest_minter(
        &mut self,
        applicant: Address,
        payer: Address,
        period: u64,
        fee: u128,
        message: &str,
    ) -> Result<()> {
        self.transact("suggest_minter", |s| {
            s.suggest_minter(applicant, payer, period, fee, message)
        })
    }

    /// Veto a minter application
    pub fn deny_minter(
        &mut self,
        caller: Address,
        minter: Address,
        helpers: &[Address],
        message: &str,
    ) -> Result<()> {
        self.transact("deny_minter", |s| s.deny_minter(caller, minter, helpers, message))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Execute a protocol operation
    pub fn execute(&mut self, op: ProtocolOperation) -> Result<OperationResult> {
        debug!(operation = op.operation_type(), caller = %op.caller().short(), "Executing");
        let result = match op {
            ProtocolOperation::OpenPosition(op) => {
                OperationResult::Position(self.open_position(op.owner, op.params)?)
            }
            ProtocolOperation::ClonePosition(op) => OperationResult::Position(self.clone_position(
                op.owner,
                op.parent,
                op.collateral,
                op.initial_mint,
                op.expiration,
            )?),
            ProtocolOperation::DenyPosition(op) => {
                self.deny_position(op.caller, op.position, &op.helpers)?;
                OperationResult::Done
            }
            ProtocolOperation::LaunchChallenge(op) => OperationResult::Challenge(
                self.launch_challenge(op.challenger, op.position, op.size, op.min_price)?,
            ),
            ProtocolOperation::Bid(op) => {
                OperationResult::Bid(self.bid(op.bidder, op.challenge, op.size)?)
            }
            ProtocolOperation::ResolveChallenge(op) => {
                OperationResult::Bid(self.resolve_challenge(op.bidder, op.challenge)?)
            }
            ProtocolOperation::BuyExpired(op) => OperationResult::ForcedSale(
                self.buy_expired_collateral(op.buyer, op.position, op.up_to)?,
            ),
            ProtocolOperation::Mint(op) => {
                OperationResult::Minted(self.mint(op.caller, op.position, op.target, op.amount)?)
            }
            ProtocolOperation::Repay(op) => {
                OperationResult::Repaid(self.repay(op.payer, op.position, op.amount)?)
            }
            ProtocolOperation::DepositCollateral(op) => OperationResult::Collateral(
                self.deposit_collateral(op.depositor, op.position, op.amount)?,
            ),
            ProtocolOperation::WithdrawCollateral(op) => OperationResult::Collateral(
                self.withdraw_collateral(op.owner, op.position, op.target, op.amount)?,
            ),
            ProtocolOperation::AdjustPrice(op) => {
                let cooldown = self.adjust_price(op.owner, op.position, op.price)?;
                OperationResult::Price {
                    price: op.price,
                    cooldown,
                }
            }
            ProtocolOperation::Adjust(op) => {
                self.adjust(op.owner, op.position, op.principal, op.collateral, op.price)?;
                OperationResult::Done
            }
            ProtocolOperation::TransferOwnership(op) => {
                self.transfer_ownership(op.owner, op.position, op.new_owner)?;
                OperationResult::Done
            }
            ProtocolOperation::AccrueInterest(op) => {
                OperationResult::Amount(self.accrue_interest(op.position)?)
            }
            ProtocolOperation::Roll(op) => OperationResult::Rolled(self.roll(
                op.owner,
                op.source,
                op.target_parent,
                op.expiration,
            )?),
            ProtocolOperation::SellShares(op) => OperationResult::SharesSold(self.sell_shares(
                op.owner,
                op.position,
                op.shares,
                op.min_proceeds,
            )?),
            ProtocolOperation::TransferShares(op) => {
                OperationResult::Shares(self.transfer_shares(op.caller, op.position, op.target)?)
            }
            ProtocolOperation::Invest(op) => {
                OperationResult::Shares(self.invest(op.investor, op.amount, op.min_shares)?)
            }
            ProtocolOperation::Redeem(op) => {
                OperationResult::Amount(self.redeem(op.holder, op.shares, op.min_proceeds)?)
            }
            ProtocolOperation::Delegate(op) => {
                self.delegate(op.holder, op.delegate)?;
                OperationResult::Done
            }
            ProtocolOperation::ProposeRate(op) => OperationResult::RateProposal(
                self.propose_rate(op.proposer, op.rate_ppm, &op.helpers)?,
            ),
            ProtocolOperation::ApplyRateChange(_) => OperationResult::Rate(self.apply_rate_change()?),
            ProtocolOperation::Save(op) => OperationResult::Amount(self.save(op.owner, op.amount)?),
            ProtocolOperation::WithdrawSavings(op) => {
                OperationResult::Amount(self.withdraw_savings(op.owner, op.target, op.amount)?)
            }
            ProtocolOperation::RefreshSavings(op) => {
                OperationResult::Amount(self.refresh_savings(op.owner)?)
            }
            ProtocolOperation::SuggestMinter(op) => {
                self.suggest_minter(op.applicant, op.payer, op.period, op.fee, &op.message)?;
                OperationResult::Done
            }
            ProtocolOperation::DenyMinter(op) => {
                self.deny_minter(op.caller, op.minter, &op.helpers, &op.message)?;
                OperationResult::Done
            }
        };
        Ok(result)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PERSISTENCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Write every position under `pos:<id>` and the rest under `state:engine`
    ///
    /// The snapshot replaces whatever the store held before.
    pub fn save_to<B: StorageBackend>(&self, store: &TypedStore<B>) -> Result<()> {
        store.clear()?;
        let mut engine = self.state.clone();
        let positions = engine.positions.take_records();
        for position in &positions {
            store.set(&position_key(position.id), position)?;
        }
        store.set(ENGINE_STATE_KEY, &engine)?;
        store.flush()?;
        info!(
            positions = positions.len(),
            block = self.state.block_height,
            "Protocol state saved"
        );
        Ok(())
    }

    /// Restore a protocol written by [`Protocol::save_to`]
    pub fn load_from<B: StorageBackend>(store: &TypedStore<B>) -> Result<Self> {
        let mut state: ProtocolState = store
            .get(ENGINE_STATE_KEY)?
            .ok_or_else(|| Error::Storage("no engine state found".into()))?;
        for key in store.list_prefix(prefixes::POSITION)? {
            let position: Position = store
                .get(&key)?
                .ok_or_else(|| Error::Storage("position entry vanished".into()))?;
            state.positions.insert(position);
        }
        info!(
            positions = state.positions.len(),
            block = state.block_height,
            "Protocol state loaded"
        );
        Ok(Self { state })
    }
}

/// Storage key of a position
pub fn position_key(id: PositionId) -> Vec<u8> {
    make_key(prefixes::POSITION, id.0.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::InMemoryStore;
    use crate::utils::constants::ONE;

    fn protocol() -> Protocol {
        Protocol::new(ProtocolParams::default(), 50_000).unwrap()
    }

    #[test]
    fn test_genesis_minters() {
        let p = protocol();
        let s = p.state();
        assert!(s.stablecoin.is_minter(&s.hub, 0));
        assert!(s.stablecoin.is_minter(&s.roller, 0));
        assert!(s.stablecoin.is_minter(&s.bridge, 0));
        assert_eq!(s.contract_kind(&s.hub), Some(ContractKind::Hub));
        assert_eq!(s.contract_kind(&Address::user("alice")), None);
    }

    #[test]
    fn test_transact_rolls_back_on_error() {
        let mut p = protocol();
        let alice = Address::user("alice");
        let bob = Address::user("bob");
        p.faucet(alice, 100 * ONE).unwrap();

        let result: Result<()> = p.transact("two_transfers", |s| {
            s.stablecoin.transfer(alice, bob, 60 * ONE)?;
            s.emit(ProtocolEvent::Saved {
                account: alice,
                amount: 1,
            });
            s.stablecoin.transfer(alice, bob, 60 * ONE)
        });

        assert!(matches!(result, Err(Error::TransferFailed { .. })));
        assert_eq!(p.balance_of(&alice), 100 * ONE);
        assert_eq!(p.balance_of(&bob), 0);
        assert!(p.events().is_empty());
    }

    #[test]
    fn test_clock_never_moves_backwards() {
        let mut p = protocol();
        p.begin_block(1, 1_000).unwrap();
        assert!(p.begin_block(2, 999).is_err());
        p.advance_time(500);
        assert_eq!(p.timestamp(), 1_500);
        assert_eq!(p.block_height(), 2);
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let mut p = protocol();
        let weth = p.create_token("WETH").unwrap();
        assert_eq!(p.state().contract_kind(&weth), Some(ContractKind::Token));
        assert!(p.create_token("WETH").is_err());
    }

    #[test]
    fn test_save_and_load_empty_engine() {
        let store = TypedStore::new(InMemoryStore::new());
        let mut p = protocol();
        p.faucet(Address::user("alice"), 5 * ONE).unwrap();
        p.save_to(&store).unwrap();

        let restored = Protocol::load_from(&store).unwrap();
        assert_eq!(restored.balance_of(&Address::user("alice")), 5 * ONE);
        assert!(Protocol::load_from(&TypedStore::new(InMemoryStore::new())).is_err());
    }
}
