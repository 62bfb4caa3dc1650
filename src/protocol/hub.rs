//! Minting hub: position factory, challenges and forced sales.
//!
//! The hub registers every position it creates with the stablecoin so the
//! position can mint. It also escrows challenger collateral and routes
//! auction and forced-sale proceeds: debt is repaid first, a surplus goes
//! to the position owner and a deficit is covered by the reserve.

use tracing::info;

use crate::error::{Error, Result};
use crate::position::challenge::ChallengePhase;
use crate::position::position::{Position, PositionId};
use crate::protocol::events::ProtocolEvent;
use crate::protocol::operations::{BidOutcome, ForcedSaleOutcome, PositionParams};
use crate::protocol::state_machine::{ContractKind, ProtocolState};
use crate::utils::address::Address;
use crate::utils::math::{
    collateral_value, linear_decay, mul_div, ppm_of, pro_rata, safe_add, safe_mul, validate_ppm,
};

impl ProtocolState {
    // ═══════════════════════════════════════════════════════════════════════════
    // POSITION FACTORY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open an original position; the opening fee goes to the reserve
    pub fn open_position(&mut self, owner: Address, params: &PositionParams) -> Result<PositionId> {
        let now = self.timestamp;
        if params.init_period < self.params.min_init_period {
            return Err(invalid(
                "init_period",
                format!("must be at least {} seconds", self.params.min_init_period),
            ));
        }
        validate_ppm("reserve_ppm", params.reserve_ppm)?;
        validate_ppm("risk_premium_ppm", params.risk_premium_ppm)?;
        if params.min_collateral == 0 {
            return Err(invalid("min_collateral", "must be positive"));
        }
        if params.duration == 0 {
            return Err(invalid("duration", "must be positive"));
        }
        if params.challenge_period == 0 {
            return Err(invalid("challenge_period", "must be positive"));
        }
        let min_value = collateral_value(params.min_collateral, params.price)?;
        if min_value < self.params.min_position_value {
            return Err(invalid(
                "min_collateral",
                format!(
                    "worth {} at the liquidation price, minimum is {}",
                    min_value, self.params.min_position_value
                ),
            ));
        }
        if params.initial_collateral < params.min_collateral {
            return Err(invalid("initial_collateral", "below the minimum collateral"));
        }
        self.token(&params.collateral_token)?;

        let fee = self.params.opening_fee;
        if fee > 0 {
            self.stablecoin.collect_profits(owner, fee)?;
            self.emit(ProtocolEvent::Profit {
                source: owner,
                amount: fee,
            });
        }

        let (id, address) = self.positions.allocate();
        let strategy = params.kind.strategy();
        let risk_premium_ppm = (strategy.effective_risk_premium)(params.risk_premium_ppm);
        let rate = (strategy.fix_annual_rate)(self.leadrate.current_rate_ppm(), risk_premium_ppm);
        let start = now.saturating_add(params.init_period);

        let mut position = Position {
            id,
            address,
            kind: params.kind,
            owner,
            hub: self.hub,
            original: id,
            collateral_token: params.collateral_token,
            min_collateral: params.min_collateral,
            limit: params.limit,
            minted_total: 0,
            principal: 0,
            interest: 0,
            last_accrual: now,
            price: 0,
            risk_premium_ppm,
            reserve_ppm: params.reserve_ppm,
            fixed_annual_rate_ppm: rate,
            start,
            expiration: start.saturating_add(params.duration),
            cooldown: start,
            challenge_period: params.challenge_period,
            challenged_amount: 0,
            closed: false,
            denied: false,
            liquidated: false,
            initialized: true,
        };
        position.set_price(params.price, params.limit)?;

        self.stablecoin.register_position(self.hub, address, now)?;
        self.contracts.insert(address, ContractKind::Position(id));
        self.positions.insert(position);
        self.move_collateral(params.collateral_token, owner, address, params.initial_collateral)?;

        self.emit(ProtocolEvent::PositionOpened {
            position: id,
            address,
            owner,
            collateral_token: params.collateral_token,
            collateral: params.initial_collateral,
            price: params.price,
        });
        info!(position = %id, owner = %owner.short(), kind = %params.kind, "Position opened");
        Ok(id)
    }

    /// Clone `parent` for `owner`, funding the collateral from `funder`
    pub(crate) fn create_clone(
        &mut self,
        owner: Address,
        funder: Address,
        parent: PositionId,
        collateral: u128,
        expiration: u64,
    ) -> Result<PositionId> {
        let now = self.timestamp;
        let parent = self.positions.get(parent)?.clone();
        parent.ensure_open()?;
        parent.ensure_started(now)?;
        parent.ensure_alive(now)?;
        parent.ensure_not_challenged()?;
        parent.ensure_no_cooldown(now)?;
        if collateral < parent.min_collateral {
            return Err(invalid("collateral", "below the minimum collateral"));
        }
        let max_expiration = self.positions.get(parent.original)?.expiration;

        let (id, address) = self.positions.allocate();
        let mut position = Position::clone_from_template(&parent, id, address, owner, now);
        let rate = (parent.kind.strategy().fix_annual_rate)(
            self.leadrate.current_rate_ppm(),
            position.risk_premium_ppm,
        );
        position.initialize_clone(parent.price, expiration, max_expiration, rate, now)?;

        self.stablecoin.register_position(self.hub, address, now)?;
        self.contracts.insert(address, ContractKind::Position(id));
        self.positions.insert(position);
        self.move_collateral(parent.collateral_token, funder, address, collateral)?;

        self.emit(ProtocolEvent::PositionCloned {
            position: id,
            parent: parent.id,
            owner,
            collateral,
            expiration,
        });
        info!(position = %id, parent = %parent.id, "Position cloned");
        Ok(id)
    }

    /// Clone `parent` with the owner's collateral, optionally minting right away
    pub fn clone_position(
        &mut self,
        owner: Address,
        parent: PositionId,
        collateral: u128,
        initial_mint: u128,
        expiration: u64,
    ) -> Result<PositionId> {
        let id = self.create_clone(owner, owner, parent, collateral, expiration)?;
        if initial_mint > 0 {
            self.mint(owner, id, owner, initial_mint)?;
        }
        Ok(id)
    }

    /// Qualified veto during the initialization period; collateral goes back to the owner
    pub fn deny_position(&mut self, caller: Address, id: PositionId, helpers: &[Address]) -> Result<()> {
        let now = self.timestamp;
        let position = self.positions.get(id)?;
        position.ensure_open()?;
        if now >= position.start {
            return Err(Error::Unauthorized(format!(
                "position {} is past its initialization period",
                id
            )));
        }
        self.reserve.check_qualified(&caller, helpers, now)?;

        let (token, address, owner) = (position.collateral_token, position.address, position.owner);
        let balance = self.collateral_balance(id)?;
        self.move_collateral(token, address, owner, balance)?;
        self.positions.get_mut(id)?.denied = true;

        self.emit(ProtocolEvent::PositionDenied {
            position: id,
            denier: caller,
        });
        info!(position = %id, denier = %caller.short(), "Position denied");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CHALLENGES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Escrow `size` of the challenger's collateral against a position
    pub fn launch_challenge(
        &mut self,
        challenger: Address,
        id: PositionId,
        size: u128,
        min_price: u128,
    ) -> Result<u64> {
        let now = self.timestamp;
        let position = self.positions.get(id)?;
        position.ensure_open()?;
        position.ensure_alive(now)?;
        if position.price < min_price {
            return Err(Error::SlippageExceeded {
                expected: min_price,
                actual: position.price,
            });
        }
        if size == 0 {
            return Err(Error::ZeroAmount);
        }
        let balance = self.collateral_balance(id)?;
        if size < position.min_collateral && size < balance {
            return Err(Error::ChallengeTooSmall {
                size,
                minimum: position.min_collateral,
            });
        }
        if size > balance {
            return Err(invalid(
                "size",
                format!("exceeds the position's collateral of {}", balance),
            ));
        }
        let (token, period, price) = (
            position.collateral_token,
            position.challenge_period,
            position.price,
        );

        self.move_collateral(token, challenger, self.hub, size)?;
        let challenge = self.challenges.open(challenger, id, size, now, period, price);
        let position = self.positions.get_mut(id)?;
        position.challenged_amount = safe_add(position.challenged_amount, size)?;

        self.emit(ProtocolEvent::ChallengeStarted {
            challenge,
            position: id,
            challenger,
            size,
            liq_price: price,
        });
        info!(challenge, position = %id, size, "Challenge started");
        Ok(challenge)
    }

    /// Bid on up to `size` of a pending challenge
    ///
    /// In the averting phase the bidder buys the challenger's escrow at the
    /// liquidation price. In the auction phase the bidder buys the position's
    /// collateral at the declining price and the challenger gets the escrow
    /// back plus a reward.
    pub fn bid(&mut self, bidder: Address, challenge_id: u64, size: u128) -> Result<BidOutcome> {
        let now = self.timestamp;
        let challenge = self.challenges.get(challenge_id)?.clone();
        if !challenge.is_pending() {
            return Err(Error::ChallengeSettled(challenge_id));
        }
        let size = size.min(challenge.size);
        if size == 0 {
            return Err(Error::ZeroAmount);
        }
        let position = self.positions.get(challenge.position)?.clone();

        match challenge.phase(now) {
            ChallengePhase::Averting => {
                let price = challenge.liq_price;
                let paid = collateral_value(size, price)?;
                self.stablecoin.transfer(bidder, challenge.challenger, paid)?;
                self.move_collateral(position.collateral_token, self.hub, bidder, size)?;

                self.challenges
                    .get_mut(challenge_id)?
                    .settle(size, ChallengePhase::Averting);
                let cooldown = self.params.averted_challenge_cooldown;
                let target = self.positions.get_mut(position.id)?;
                target.challenged_amount = target.challenged_amount.saturating_sub(size);
                target.restrict_minting(now, cooldown);

                self.emit(ProtocolEvent::ChallengeAverted {
                    challenge: challenge_id,
                    position: position.id,
                    bidder,
                    size,
                });
                info!(challenge = challenge_id, size, "Challenge averted");
                Ok(BidOutcome {
                    challenge: challenge_id,
                    phase: ChallengePhase::Averting,
                    size,
                    price,
                    paid,
                    reward: 0,
                })
            }
            ChallengePhase::Auction => {
                self.challenges.ensure_next_in_line(challenge_id)?;
                self.settle_auction(bidder, challenge_id, size, &position)
            }
        }
    }

    fn settle_auction(
        &mut self,
        bidder: Address,
        challenge_id: u64,
        size: u128,
        position: &Position,
    ) -> Result<BidOutcome> {
        let now = self.timestamp;
        let hub = self.hub;
        let challenge = self.challenges.get(challenge_id)?.clone();
        let price = challenge.current_price(now)?;
        let (id, token) = (position.id, position.collateral_token);

        // The escrow is not sold; it goes back to the challenger
        self.move_collateral(token, hub, challenge.challenger, size)?;

        let balance = self.collateral_balance(id)?;
        let sold = size.min(balance);
        let target = self.positions.get_mut(id)?;
        target.accrue(now)?;
        let (principal, interest) = if balance == 0 {
            (0, 0)
        } else {
            (
                pro_rata(target.principal, sold, balance)?,
                pro_rata(target.interest, sold, balance)?,
            )
        };

        let offer = collateral_value(sold, price)?;
        self.stablecoin.transfer(bidder, hub, offer)?;
        let reward = ppm_of(
            collateral_value(sold, challenge.liq_price)?,
            self.params.challenger_reward_ppm,
        )?;

        let assigned = self
            .stablecoin
            .unwind_reserve(hub, principal, position.reserve_ppm)?;
        let available = safe_add(offer, assigned)?;
        let needed = safe_add(safe_add(principal, interest)?, reward)?;
        if available >= needed {
            self.stablecoin
                .transfer(hub, position.owner, available - needed)?;
        } else {
            let coverage = self.stablecoin.cover_loss(hub, needed - available)?;
            self.emit(ProtocolEvent::Loss {
                target: hub,
                from_reserve: coverage.from_reserve,
                unbacked: coverage.unbacked,
            });
        }
        self.stablecoin.burn(hub, principal)?;
        if interest > 0 {
            self.stablecoin.collect_profits(hub, interest)?;
            self.emit(ProtocolEvent::Profit {
                source: position.address,
                amount: interest,
            });
        }
        self.stablecoin.transfer(hub, challenge.challenger, reward)?;
        self.move_collateral(token, position.address, bidder, sold)?;

        self.positions.notify_repaid(id, principal)?;
        let cooldown = self.params.liquidation_cooldown;
        let target = self.positions.get_mut(id)?;
        target.principal -= principal;
        target.interest -= interest;
        target.challenged_amount = target.challenged_amount.saturating_sub(size);
        target.restrict_minting(now, cooldown);
        if balance == sold {
            target.liquidated = true;
        }

        self.challenges
            .get_mut(challenge_id)?
            .settle(size, ChallengePhase::Auction);
        self.emit(ProtocolEvent::ChallengeSucceeded {
            challenge: challenge_id,
            position: id,
            bidder,
            bid: offer,
            size: sold,
            repaid: principal + interest,
            reward,
        });
        info!(challenge = challenge_id, position = %id, sold, offer, "Challenge succeeded");
        Ok(BidOutcome {
            challenge: challenge_id,
            phase: ChallengePhase::Auction,
            size: sold,
            price,
            paid: offer,
            reward,
        })
    }

    /// Settle the whole remaining size of a challenge past its averting phase
    pub fn resolve_challenge(&mut self, bidder: Address, challenge_id: u64) -> Result<BidOutcome> {
        let challenge = self.challenges.get(challenge_id)?;
        if !challenge.is_pending() {
            return Err(Error::ChallengeSettled(challenge_id));
        }
        if challenge.phase(self.timestamp) == ChallengePhase::Averting {
            return Err(Error::ChallengeNotMatured {
                matures_at: challenge.averting_ends(),
            });
        }
        let size = challenge.size;
        self.bid(bidder, challenge_id, size)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPIRED POSITIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Price of expired collateral: from `factor x` the liquidation price down to
    /// `1x` over one challenge period, then linearly to zero over the next
    pub fn expired_price(&self, id: PositionId) -> Result<u128> {
        let position = self.positions.get(id)?;
        let elapsed = self.timestamp.saturating_sub(position.expiration);
        let period = position.challenge_period;
        let liq = position.price;
        if elapsed < period {
            let start = safe_mul(liq, self.params.expired_price_factor)?;
            let drop = mul_div(start - liq, elapsed as u128, period as u128)?;
            Ok(start - drop)
        } else {
            linear_decay(liq, elapsed - period, period)
        }
    }

    /// Buy up to `up_to` collateral of an expired position
    ///
    /// Proceeds repay the debt and any surplus goes to the owner. Once the
    /// last collateral is gone, the remaining principal is written off
    /// against the reserve and interest is forgiven.
    pub fn buy_expired_collateral(
        &mut self,
        buyer: Address,
        id: PositionId,
        up_to: u128,
    ) -> Result<ForcedSaleOutcome> {
        let now = self.timestamp;
        let hub = self.hub;
        let position = self.positions.get(id)?.clone();
        position.ensure_expired(now)?;
        position.ensure_not_challenged()?;
        if up_to == 0 {
            return Err(Error::ZeroAmount);
        }
        let balance = self.collateral_balance(id)?;
        if balance == 0 {
            return Err(invalid("position", "has no collateral left"));
        }
        let mut amount = up_to.min(balance);
        if balance - amount < position.min_collateral {
            amount = balance;
        }

        let price = self.expired_price(id)?;
        let proceeds = collateral_value(amount, price)?;
        self.stablecoin.transfer(buyer, hub, proceeds)?;
        self.move_collateral(position.collateral_token, position.address, buyer, amount)?;

        self.positions.get_mut(id)?.accrue(now)?;
        let repayment = self.repay_from_funds(id, hub, proceeds)?;
        let leftover = proceeds - repayment.net_cost();

        let mut surplus = 0;
        if self.positions.get(id)?.debt() == 0 {
            surplus = leftover;
            self.stablecoin.transfer(hub, position.owner, surplus)?;
        } else if leftover > 0 {
            // rounding residue of a partial repayment stays with the reserve
            self.stablecoin.collect_profits(hub, leftover)?;
        }

        let mut loss = 0;
        if amount == balance {
            loss = self.write_off(id)?;
            self.positions.get_mut(id)?.liquidated = true;
            self.emit(ProtocolEvent::PositionClosed { position: id });
        }

        self.emit(ProtocolEvent::ForcedSale {
            position: id,
            buyer,
            amount,
            price,
            proceeds,
        });
        info!(position = %id, amount, price, proceeds, "Expired collateral sold");
        Ok(ForcedSaleOutcome {
            amount,
            price,
            proceeds,
            repayment,
            surplus,
            loss,
        })
    }

    /// Cover the remaining principal from the reserve and forgive the interest
    fn write_off(&mut self, id: PositionId) -> Result<u128> {
        let hub = self.hub;
        let position = self.positions.get(id)?;
        let (principal, reserve_ppm) = (position.principal, position.reserve_ppm);
        if principal == 0 && position.interest == 0 {
            return Ok(0);
        }
        let assigned = self.stablecoin.unwind_reserve(hub, principal, reserve_ppm)?;
        let shortfall = principal.saturating_sub(assigned);
        if shortfall > 0 {
            let coverage = self.stablecoin.cover_loss(hub, shortfall)?;
            self.emit(ProtocolEvent::Loss {
                target: hub,
                from_reserve: coverage.from_reserve,
                unbacked: coverage.unbacked,
            });
        }
        self.stablecoin.burn(hub, principal)?;
        self.positions.notify_repaid(id, principal)?;
        let position = self.positions.get_mut(id)?;
        position.principal = 0;
        position.interest = 0;
        Ok(principal)
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidParameter {
        name: name.into(),
        reason: reason.into(),
    }
}
