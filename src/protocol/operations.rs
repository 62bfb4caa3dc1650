//! Protocol operations - atomic state changes.
//!
//! Every public entry point of the engine has an operation struct here so it
//! can be scripted (the `juice simulate` scenarios are lists of
//! [`ProtocolOperation`]s) and dispatched through
//! [`Protocol::execute`](crate::protocol::state_machine::Protocol::execute).
//! Each operation runs as one transaction: it either applies completely or
//! not at all.

use serde::{Deserialize, Serialize};

use crate::core::leadrate::RateProposal;
use crate::position::challenge::ChallengePhase;
use crate::position::kind::{MintReceipt, PositionKind};
use crate::position::position::PositionId;
use crate::utils::address::Address;
use crate::utils::constants::{MIN_INIT_PERIOD, SECONDS_PER_DAY};

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for protocol operations
pub trait Operation {
    /// Get the operation type name
    fn operation_type(&self) -> &'static str;

    /// Account on whose behalf the operation runs
    fn caller(&self) -> Address;
}

macro_rules! operation {
    ($op:ty, $name:literal, $caller:ident) => {
        impl Operation for $op {
            fn operation_type(&self) -> &'static str {
                $name
            }

            fn caller(&self) -> Address {
                self.$caller
            }
        }
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Terms of a new original position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionParams {
    /// Collateral token
    pub collateral_token: Address,
    /// Minimum collateral
    pub min_collateral: u128,
    /// Collateral deposited at opening
    pub initial_collateral: u128,
    /// Family minting limit
    pub limit: u128,
    /// Initialization period in seconds
    pub init_period: u64,
    /// Lifetime after the initialization period
    pub duration: u64,
    /// Length of each challenge phase
    pub challenge_period: u64,
    /// Risk premium over the leading rate
    pub risk_premium_ppm: u32,
    /// Liquidation price, stablecoin per whole collateral unit
    pub price: u128,
    /// Reserve contribution of every mint
    pub reserve_ppm: u32,
    /// Variant
    #[serde(default)]
    pub kind: PositionKind,
}

impl PositionParams {
    /// Standard terms: 3-day init and challenge periods, 180-day life, 1% premium, 15% reserve
    pub fn new(
        collateral_token: Address,
        min_collateral: u128,
        initial_collateral: u128,
        limit: u128,
        price: u128,
    ) -> Self {
        Self {
            collateral_token,
            min_collateral,
            initial_collateral,
            limit,
            init_period: MIN_INIT_PERIOD,
            duration: 180 * SECONDS_PER_DAY,
            challenge_period: 3 * SECONDS_PER_DAY,
            risk_premium_ppm: 10_000,
            price,
            reserve_ppm: 150_000,
            kind: PositionKind::Standard,
        }
    }

    /// Set the variant
    pub fn with_kind(mut self, kind: PositionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the reserve contribution
    pub fn with_reserve_ppm(mut self, reserve_ppm: u32) -> Self {
        self.reserve_ppm = reserve_ppm;
        self
    }

    /// Set the risk premium
    pub fn with_risk_premium(mut self, risk_premium_ppm: u32) -> Self {
        self.risk_premium_ppm = risk_premium_ppm;
        self
    }

    /// Set the lifetime after initialization
    pub fn with_duration(mut self, duration: u64) -> Self {
        self.duration = duration;
        self
    }

    /// Set the challenge period
    pub fn with_challenge_period(mut self, period: u64) -> Self {
        self.challenge_period = period;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HUB OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Open a new original position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPositionOp {
    /// Owner, pays the opening fee and the collateral
    pub owner: Address,
    /// Terms
    pub params: PositionParams,
}
operation!(OpenPositionOp, "OpenPosition", owner);

/// Clone an existing position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClonePositionOp {
    /// Owner of the clone
    pub owner: Address,
    /// Parent position
    pub parent: PositionId,
    /// Collateral deposited into the clone
    pub collateral: u128,
    /// Amount minted right away
    pub initial_mint: u128,
    /// Expiration, at most the original's
    pub expiration: u64,
}
operation!(ClonePositionOp, "ClonePosition", owner);

/// Veto a position during its initialization period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenyPositionOp {
    /// Qualified reserve holder
    pub caller: Address,
    /// Position
    pub position: PositionId,
    /// Holders delegating to the caller
    #[serde(default)]
    pub helpers: Vec<Address>,
}
operation!(DenyPositionOp, "DenyPosition", caller);

/// Challenge part of a position's collateral
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchChallengeOp {
    /// Challenger, escrows the same amount of collateral
    pub challenger: Address,
    /// Position
    pub position: PositionId,
    /// Size in collateral units
    pub size: u128,
    /// Lowest acceptable position price
    #[serde(default)]
    pub min_price: u128,
}
operation!(LaunchChallengeOp, "LaunchChallenge", challenger);

/// Bid on a challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidOp {
    /// Bidder
    pub bidder: Address,
    /// Challenge id
    pub challenge: u64,
    /// Size to buy, capped at the remaining size
    pub size: u128,
}
operation!(BidOp, "Bid", bidder);

/// Settle the whole remaining size of a matured challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveChallengeOp {
    /// Bidder
    pub bidder: Address,
    /// Challenge id
    pub challenge: u64,
}
operation!(ResolveChallengeOp, "ResolveChallenge", bidder);

/// Buy collateral of an expired position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyExpiredOp {
    /// Buyer
    pub buyer: Address,
    /// Position
    pub position: PositionId,
    /// Largest amount to buy
    pub up_to: u128,
}
operation!(BuyExpiredOp, "BuyExpiredCollateral", buyer);

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Mint against a position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintOp {
    /// Owner or roller
    pub caller: Address,
    /// Position
    pub position: PositionId,
    /// Recipient of the usable amount
    pub target: Address,
    /// Amount added to principal
    pub amount: u128,
}
operation!(MintOp, "Mint", caller);

/// Repay debt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepayOp {
    /// Payer
    pub payer: Address,
    /// Position
    pub position: PositionId,
    /// Amount, capped at the debt
    pub amount: u128,
}
operation!(RepayOp, "Repay", payer);

/// Deposit collateral
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCollateralOp {
    /// Depositor
    pub depositor: Address,
    /// Position
    pub position: PositionId,
    /// Amount
    pub amount: u128,
}
operation!(DepositCollateralOp, "DepositCollateral", depositor);

/// Withdraw collateral
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawCollateralOp {
    /// Owner
    pub owner: Address,
    /// Position
    pub position: PositionId,
    /// Recipient
    pub target: Address,
    /// Amount
    pub amount: u128,
}
operation!(WithdrawCollateralOp, "WithdrawCollateral", owner);

/// Change the liquidation price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustPriceOp {
    /// Owner
    pub owner: Address,
    /// Position
    pub position: PositionId,
    /// New price
    pub price: u128,
}
operation!(AdjustPriceOp, "AdjustPrice", owner);

/// Move principal, collateral and price to target values in one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustOp {
    /// Owner
    pub owner: Address,
    /// Position
    pub position: PositionId,
    /// Target principal
    pub principal: u128,
    /// Target collateral balance
    pub collateral: u128,
    /// Target price
    pub price: u128,
}
operation!(AdjustOp, "Adjust", owner);

/// Hand a position to a new owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOwnershipOp {
    /// Current owner
    pub owner: Address,
    /// Position
    pub position: PositionId,
    /// New owner
    pub new_owner: Address,
}
operation!(TransferOwnershipOp, "TransferOwnership", owner);

/// Bring interest up to date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrueInterestOp {
    /// Anyone
    pub caller: Address,
    /// Position
    pub position: PositionId,
}
operation!(AccrueInterestOp, "AccrueInterest", caller);

// ═══════════════════════════════════════════════════════════════════════════════
// ROLLER AND AUTO-INVEST OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Move debt and collateral into a fresh clone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollOp {
    /// Owner of the source
    pub owner: Address,
    /// Expiring position
    pub source: PositionId,
    /// Position to clone
    pub target_parent: PositionId,
    /// Expiration of the new position
    pub expiration: u64,
}
operation!(RollOp, "Roll", owner);

/// Redeem shares held by an auto-invest position to pay down its debt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellSharesOp {
    /// Owner
    pub owner: Address,
    /// Position
    pub position: PositionId,
    /// Shares to redeem
    pub shares: u128,
    /// Lowest acceptable proceeds
    #[serde(default)]
    pub min_proceeds: u128,
}
operation!(SellSharesOp, "SellShares", owner);

/// Move all shares of an auto-invest position to another one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSharesOp {
    /// Owner or roller
    pub caller: Address,
    /// Source position
    pub position: PositionId,
    /// Target address
    pub target: Address,
}
operation!(TransferSharesOp, "TransferShares", caller);

// ═══════════════════════════════════════════════════════════════════════════════
// RESERVE, RATE AND SAVINGS OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Invest stablecoin in the reserve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestOp {
    /// Investor
    pub investor: Address,
    /// Amount
    pub amount: u128,
    /// Lowest acceptable share count
    #[serde(default)]
    pub min_shares: u128,
}
operation!(InvestOp, "Invest", investor);

/// Redeem reserve shares
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemOp {
    /// Holder
    pub holder: Address,
    /// Shares
    pub shares: u128,
    /// Lowest acceptable proceeds
    #[serde(default)]
    pub min_proceeds: u128,
}
operation!(RedeemOp, "Redeem", holder);

/// Delegate votes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateOp {
    /// Holder
    pub holder: Address,
    /// Delegate; zero clears the delegation
    pub delegate: Address,
}
operation!(DelegateOp, "Delegate", holder);

/// Propose a new leading rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeRateOp {
    /// Qualified proposer
    pub proposer: Address,
    /// Rate in ppm per year
    pub rate_ppm: u32,
    /// Holders delegating to the proposer
    #[serde(default)]
    pub helpers: Vec<Address>,
}
operation!(ProposeRateOp, "ProposeRate", proposer);

/// Apply a matured rate proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyRateChangeOp {
    /// Anyone
    pub caller: Address,
}
operation!(ApplyRateChangeOp, "ApplyRateChange", caller);

/// Deposit into savings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveOp {
    /// Saver
    pub owner: Address,
    /// Amount
    pub amount: u128,
}
operation!(SaveOp, "Save", owner);

/// Withdraw from savings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawSavingsOp {
    /// Saver
    pub owner: Address,
    /// Recipient
    pub target: Address,
    /// Amount, capped at the balance
    pub amount: u128,
}
operation!(WithdrawSavingsOp, "WithdrawSavings", owner);

/// Settle savings interest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSavingsOp {
    /// Saver
    pub owner: Address,
}
operation!(RefreshSavingsOp, "RefreshSavings", owner);

/// Apply for minting rights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestMinterOp {
    /// Applicant
    pub applicant: Address,
    /// Pays the application fee
    pub payer: Address,
    /// Application period
    pub period: u64,
    /// Application fee
    pub fee: u128,
    /// Message
    #[serde(default)]
    pub message: String,
}
operation!(SuggestMinterOp, "SuggestMinter", payer);

/// Veto a minter application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenyMinterOp {
    /// Qualified reserve holder
    pub caller: Address,
    /// Applicant
    pub minter: Address,
    /// Holders delegating to the caller
    #[serde(default)]
    pub helpers: Vec<Address>,
    /// Reason
    #[serde(default)]
    pub message: String,
}
operation!(DenyMinterOp, "DenyMinter", caller);

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION ENUM
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProtocolOperation {
    /// Open a position
    OpenPosition(OpenPositionOp),
    /// Clone a position
    ClonePosition(ClonePositionOp),
    /// Veto a position
    DenyPosition(DenyPositionOp),
    /// Start a challenge
    LaunchChallenge(LaunchChallengeOp),
    /// Bid on a challenge
    Bid(BidOp),
    /// Settle a matured challenge
    ResolveChallenge(ResolveChallengeOp),
    /// Buy expired collateral
    BuyExpired(BuyExpiredOp),
    /// Mint
    Mint(MintOp),
    /// Repay
    Repay(RepayOp),
    /// Deposit collateral
    DepositCollateral(DepositCollateralOp),
    /// Withdraw collateral
    WithdrawCollateral(WithdrawCollateralOp),
    /// Change the price
    AdjustPrice(AdjustPriceOp),
    /// Composite adjustment
    Adjust(AdjustOp),
    /// Transfer ownership
    TransferOwnership(TransferOwnershipOp),
    /// Accrue interest
    AccrueInterest(AccrueInterestOp),
    /// Roll a position
    Roll(RollOp),
    /// Sell position shares
    SellShares(SellSharesOp),
    /// Move position shares
    TransferShares(TransferSharesOp),
    /// Invest in the reserve
    Invest(InvestOp),
    /// Redeem reserve shares
    Redeem(RedeemOp),
    /// Delegate votes
    Delegate(DelegateOp),
    /// Propose a rate
    ProposeRate(ProposeRateOp),
    /// Apply a rate
    ApplyRateChange(ApplyRateChangeOp),
    /// Save
    Save(SaveOp),
    /// Withdraw savings
    WithdrawSavings(WithdrawSavingsOp),
    /// Refresh savings
    RefreshSavings(RefreshSavingsOp),
    /// Apply as minter
    SuggestMinter(SuggestMinterOp),
    /// Deny a minter
    DenyMinter(DenyMinterOp),
}

impl ProtocolOperation {
    fn inner(&self) -> &dyn Operation {
        match self {
            Self::OpenPosition(op) => op,
            Self::ClonePosition(op) => op,
            Self::DenyPosition(op) => op,
            Self::LaunchChallenge(op) => op,
            Self::Bid(op) => op,
            Self::ResolveChallenge(op) => op,
            Self::BuyExpired(op) => op,
            Self::Mint(op) => op,
            Self::Repay(op) => op,
            Self::DepositCollateral(op) => op,
            Self::WithdrawCollateral(op) => op,
            Self::AdjustPrice(op) => op,
            Self::Adjust(op) => op,
            Self::TransferOwnership(op) => op,
            Self::AccrueInterest(op) => op,
            Self::Roll(op) => op,
            Self::SellShares(op) => op,
            Self::TransferShares(op) => op,
            Self::Invest(op) => op,
            Self::Redeem(op) => op,
            Self::Delegate(op) => op,
            Self::ProposeRate(op) => op,
            Self::ApplyRateChange(op) => op,
            Self::Save(op) => op,
            Self::WithdrawSavings(op) => op,
            Self::RefreshSavings(op) => op,
            Self::SuggestMinter(op) => op,
            Self::DenyMinter(op) => op,
        }
    }
}

impl Operation for ProtocolOperation {
    fn operation_type(&self) -> &'static str {
        self.inner().operation_type()
    }

    fn caller(&self) -> Address {
        self.inner().caller()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// How a repayment was split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repayment {
    /// Interest paid into the reserve
    pub interest: u128,
    /// Principal burned
    pub principal: u128,
    /// Reserve returned to the payer
    pub reserve_returned: u128,
}

impl Repayment {
    /// Stablecoin actually spent by the payer
    pub fn net_cost(&self) -> u128 {
        self.interest + self.principal.saturating_sub(self.reserve_returned)
    }
}

/// Outcome of a challenge bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidOutcome {
    /// Challenge id
    pub challenge: u64,
    /// Phase the bid landed in
    pub phase: ChallengePhase,
    /// Collateral acquired by the bidder
    pub size: u128,
    /// Price per unit
    pub price: u128,
    /// Stablecoin paid by the bidder
    pub paid: u128,
    /// Reward paid to the challenger
    pub reward: u128,
}

/// Outcome of a forced sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedSaleOutcome {
    /// Collateral sold
    pub amount: u128,
    /// Price per unit
    pub price: u128,
    /// Paid by the buyer
    pub proceeds: u128,
    /// Debt repaid from the proceeds
    pub repayment: Repayment,
    /// Paid to the owner after the debt
    pub surplus: u128,
    /// Principal written off against the reserve
    pub loss: u128,
}

/// Outcome of a roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    /// New position
    pub target: PositionId,
    /// Collateral moved
    pub collateral: u128,
    /// Debt repaid on the source
    pub repaid: u128,
    /// Principal minted on the target
    pub minted: u128,
    /// Shares moved along
    pub shares: u128,
}

/// Outcome of selling position shares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSale {
    /// Shares redeemed
    pub shares: u128,
    /// Proceeds of the redemption
    pub proceeds: u128,
    /// Debt repaid
    pub repayment: Repayment,
    /// Paid to the owner
    pub surplus: u128,
}

/// Result of executing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    /// A position was created
    Position(PositionId),
    /// A challenge was started
    Challenge(u64),
    /// Mint result
    Minted(MintReceipt),
    /// Repayment result
    Repaid(Repayment),
    /// Collateral balance after a deposit or withdrawal
    Collateral(u128),
    /// Price and cooldown after a price change
    Price {
        /// New price
        price: u128,
        /// Minting blocked until
        cooldown: u64,
    },
    /// Bid result
    Bid(BidOutcome),
    /// Forced sale result
    ForcedSale(ForcedSaleOutcome),
    /// Roll result
    Rolled(RollOutcome),
    /// Share sale result
    SharesSold(ShareSale),
    /// Share count
    Shares(u128),
    /// Stablecoin amount
    Amount(u128),
    /// Rate proposal
    RateProposal(RateProposal),
    /// Rate in effect
    Rate(u32),
    /// Nothing to report
    Done,
}
