//! Position lifecycle: minting, repayment, collateral and price management.
//!
//! Every entry point accrues interest before it touches a balance, and every
//! entry point that can lower the collateral ratio re-checks it afterwards.

use tracing::info;

use crate::error::{Error, Result};
use crate::position::kind::MintReceipt;
use crate::position::position::PositionId;
use crate::protocol::events::ProtocolEvent;
use crate::protocol::operations::Repayment;
use crate::protocol::state_machine::ProtocolState;
use crate::utils::address::Address;
use crate::utils::math::{mul_div, safe_add};

impl ProtocolState {
    // ═══════════════════════════════════════════════════════════════════════════
    // MINT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mint `amount` of principal; the usable part goes where the position kind sends it
    pub fn mint(
        &mut self,
        caller: Address,
        id: PositionId,
        target: Address,
        amount: u128,
    ) -> Result<MintReceipt> {
        let now = self.timestamp;
        let roller = self.roller;
        let position = self.positions.get(id)?;
        if caller != position.owner && caller != roller {
            return Err(Error::Unauthorized(format!(
                "{} may not mint from position {}",
                caller.short(),
                id
            )));
        }
        position.ensure_open()?;
        position.ensure_started(now)?;
        position.ensure_alive(now)?;
        position.ensure_not_challenged()?;
        position.ensure_no_cooldown(now)?;
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let address = position.address;
        let reserve_ppm = position.reserve_ppm;
        let strategy = position.kind.strategy();

        self.positions.get_mut(id)?.accrue(now)?;
        self.positions.notify_mint(id, amount)?;

        let balance = self.collateral_balance(id)?;
        let buffer = self.params.collateral_buffer_ppm;
        let position = self.positions.get_mut(id)?;
        position.principal = safe_add(position.principal, amount)?;
        position.check_collateral(balance, position.price, buffer)?;
        let (price, principal) = (position.price, position.principal);

        let recipient = (strategy.mint_recipient)(address, target, caller, roller);
        let usable = self
            .stablecoin
            .mint_with_reserve(address, recipient, amount, reserve_ppm, now)?;

        let receipt = MintReceipt {
            position: id,
            position_address: address,
            caller,
            recipient,
            amount,
            usable,
        };
        (strategy.after_mint)(self, &receipt)?;

        self.emit(ProtocolEvent::MintingUpdate {
            position: id,
            collateral: balance,
            price,
            principal,
        });
        info!(position = %id, amount, usable, "Minted");
        Ok(receipt)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REPAY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Repay up to `amount` of debt, interest first; anyone may repay
    pub fn repay(&mut self, payer: Address, id: PositionId, amount: u128) -> Result<Repayment> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let now = self.timestamp;
        let position = self.positions.get_mut(id)?;
        position.accrue(now)?;
        let (address, reserve_ppm) = (position.address, position.reserve_ppm);
        let pay = amount.min(position.debt());
        let interest = pay.min(position.interest);
        let principal = pay - interest;

        if interest > 0 {
            self.stablecoin.collect_profits(payer, interest)?;
            self.emit(ProtocolEvent::Profit {
                source: address,
                amount: interest,
            });
        }
        let reserve_returned = self
            .stablecoin
            .burn_from_with_reserve(payer, principal, reserve_ppm)?;
        self.positions.notify_repaid(id, principal)?;

        let position = self.positions.get_mut(id)?;
        position.interest -= interest;
        position.principal -= principal;

        let repayment = Repayment {
            interest,
            principal,
            reserve_returned,
        };
        self.emit_repaid(id, payer, repayment);
        Ok(repayment)
    }

    /// Apply `funds` already held by `payer` to the debt, interest first
    ///
    /// The principal part is the largest amount the funds can free once the
    /// assigned reserve is returned. Interest must be accrued by the caller.
    pub(crate) fn repay_from_funds(
        &mut self,
        id: PositionId,
        payer: Address,
        funds: u128,
    ) -> Result<Repayment> {
        let position = self.positions.get(id)?;
        let (address, reserve_ppm) = (position.address, position.reserve_ppm);
        let interest = funds.min(position.interest);
        let remaining = funds - interest;

        let mut principal = self
            .stablecoin
            .calculate_freed_amount(remaining, reserve_ppm)?
            .min(position.principal);
        loop {
            let covered = safe_add(
                remaining,
                self.stablecoin
                    .calculate_assigned_reserve(principal, reserve_ppm)?,
            )?;
            if principal <= covered {
                break;
            }
            principal = covered;
        }

        if interest > 0 {
            self.stablecoin.collect_profits(payer, interest)?;
            self.emit(ProtocolEvent::Profit {
                source: address,
                amount: interest,
            });
        }
        let reserve_returned = self
            .stablecoin
            .burn_from_with_reserve(payer, principal, reserve_ppm)?;
        self.positions.notify_repaid(id, principal)?;

        let position = self.positions.get_mut(id)?;
        position.interest -= interest;
        position.principal -= principal;

        let repayment = Repayment {
            interest,
            principal,
            reserve_returned,
        };
        self.emit_repaid(id, payer, repayment);
        Ok(repayment)
    }

    fn emit_repaid(&mut self, id: PositionId, payer: Address, repayment: Repayment) {
        if repayment.interest == 0 && repayment.principal == 0 {
            return;
        }
        self.emit(ProtocolEvent::Repaid {
            position: id,
            payer,
            interest: repayment.interest,
            principal: repayment.principal,
            reserve_returned: repayment.reserve_returned,
        });
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COLLATERAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Add collateral from `depositor`; returns the new balance
    pub fn deposit_collateral(&mut self, depositor: Address, id: PositionId, amount: u128) -> Result<u128> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let position = self.positions.get(id)?;
        position.ensure_open()?;
        let (token, address) = (position.collateral_token, position.address);
        self.move_collateral(token, depositor, address, amount)?;

        let balance = self.collateral_balance(id)?;
        self.emit(ProtocolEvent::CollateralDeposited {
            position: id,
            amount,
            balance,
        });
        Ok(balance)
    }

    /// Withdraw collateral to `target`; returns the new balance
    ///
    /// A debt-free position whose balance drops under the minimum closes.
    /// Leftover collateral of a closed position can still be withdrawn.
    pub fn withdraw_collateral(
        &mut self,
        owner: Address,
        id: PositionId,
        target: Address,
        amount: u128,
    ) -> Result<u128> {
        let now = self.timestamp;
        let position = self.positions.get(id)?;
        position.ensure_owner(&owner)?;
        position.ensure_not_challenged()?;
        position.ensure_no_cooldown(now)?;
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        if target.is_zero() {
            return Err(Error::ZeroAddress);
        }
        let (token, address) = (position.collateral_token, position.address);

        self.positions.get_mut(id)?.accrue(now)?;
        self.move_collateral(token, address, target, amount)?;

        let balance = self.collateral_balance(id)?;
        let buffer = self.params.collateral_buffer_ppm;
        let position = self.positions.get_mut(id)?;
        position.check_collateral(balance, position.price, buffer)?;
        let closes = !position.is_closed() && balance < position.min_collateral;
        if closes {
            position.closed = true;
        }

        self.emit(ProtocolEvent::CollateralWithdrawn {
            position: id,
            target,
            amount,
            balance,
        });
        if closes {
            self.emit(ProtocolEvent::PositionClosed { position: id });
            info!(position = %id, "Position closed");
        }
        Ok(balance)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRICE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Change the liquidation price; returns the cooldown end
    ///
    /// Decreases take effect immediately as long as the collateral still
    /// covers the debt. Increases block minting for a period proportional to
    /// the relative increase.
    pub fn adjust_price(&mut self, owner: Address, id: PositionId, new_price: u128) -> Result<u64> {
        let now = self.timestamp;
        let available = self.positions.available_for_minting(id)?;
        let balance = self.collateral_balance(id)?;
        let buffer = self.params.collateral_buffer_ppm;
        let min_cooldown = self.params.min_price_cooldown;
        let full_cooldown = self.params.price_increase_cooldown;

        let position = self.positions.get_mut(id)?;
        position.ensure_owner(&owner)?;
        position.ensure_open()?;
        position.ensure_not_challenged()?;
        if new_price == 0 {
            return Err(Error::InvalidParameter {
                name: "price".into(),
                reason: "must be positive".into(),
            });
        }
        position.accrue(now)?;
        let old_price = position.price;

        if new_price > old_price {
            position.ensure_no_cooldown(now)?;
            position.ensure_alive(now)?;
            let proportional = if old_price == 0 {
                full_cooldown as u128
            } else {
                mul_div(full_cooldown as u128, new_price - old_price, old_price)?
            };
            let period = (proportional.min(u64::MAX as u128) as u64).max(min_cooldown);
            position.set_price(new_price, available)?;
            position.restrict_minting(now, period);
        } else {
            position.set_price(new_price, available)?;
            position.check_collateral(balance, new_price, buffer)?;
        }
        let cooldown = position.cooldown;

        self.emit(ProtocolEvent::PriceAdjusted {
            position: id,
            old_price,
            new_price,
            cooldown,
        });
        Ok(cooldown)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COMPOSITE ADJUST
    // ═══════════════════════════════════════════════════════════════════════════

    /// Move principal, collateral and price to the given targets in one step
    ///
    /// Order: deposit, repay, price, mint, withdraw. Each step is skipped
    /// when its target already matches.
    pub fn adjust(
        &mut self,
        owner: Address,
        id: PositionId,
        new_principal: u128,
        new_collateral: u128,
        new_price: u128,
    ) -> Result<()> {
        let now = self.timestamp;
        self.positions.get(id)?.ensure_owner(&owner)?;

        let balance = self.collateral_balance(id)?;
        if new_collateral > balance {
            self.deposit_collateral(owner, id, new_collateral - balance)?;
        }

        let position = self.positions.get_mut(id)?;
        position.accrue(now)?;
        if new_principal < position.principal {
            let amount = position.interest + (position.principal - new_principal);
            self.repay(owner, id, amount)?;
        }

        if new_price != self.positions.get(id)?.price {
            self.adjust_price(owner, id, new_price)?;
        }

        let principal = self.positions.get(id)?.principal;
        if new_principal > principal {
            self.mint(owner, id, owner, new_principal - principal)?;
        }

        if new_collateral < balance {
            self.withdraw_collateral(owner, id, owner, balance - new_collateral)?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OWNERSHIP AND ACCRUAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Hand the position to `new_owner`
    pub fn transfer_ownership(&mut self, owner: Address, id: PositionId, new_owner: Address) -> Result<()> {
        if new_owner.is_zero() {
            return Err(Error::ZeroAddress);
        }
        let position = self.positions.get_mut(id)?;
        position.ensure_owner(&owner)?;
        position.owner = new_owner;
        self.emit(ProtocolEvent::OwnershipTransferred {
            position: id,
            from: owner,
            to: new_owner,
        });
        Ok(())
    }

    /// Accrue interest up to now; returns the newly added interest
    pub fn accrue_interest(&mut self, id: PositionId) -> Result<u128> {
        let now = self.timestamp;
        self.positions.get_mut(id)?.accrue(now)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::protocol::fixtures::*;
    use crate::utils::constants::{ONE, SECONDS_PER_DAY, SECONDS_PER_YEAR};

    #[test]
    fn test_mint_splits_reserve() {
        let mut f = Fixture::active();
        let reserve_before = f.protocol.state().stablecoin.reserve_balance();

        let receipt = f.mint(10_000 * ONE).unwrap();

        assert_eq!(receipt.usable, 8_500 * ONE);
        assert_eq!(f.protocol.balance_of(&f.alice), f.alice_start + 8_500 * ONE);
        assert_eq!(
            f.protocol.state().stablecoin.reserve_balance() - reserve_before,
            1_500 * ONE
        );
        assert_eq!(f.protocol.position(f.position).unwrap().principal, 10_000 * ONE);
    }

    #[test]
    fn test_mint_requires_owner_or_roller() {
        let mut f = Fixture::active();
        let result = f.protocol.mint(f.bob, f.position, f.bob, ONE);
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[test]
    fn test_mint_rejected_during_initialization() {
        let mut f = Fixture::opened();
        let result = f.mint(ONE);
        assert!(matches!(result, Err(Error::PositionInitializing { .. })));
    }

    #[test]
    fn test_mint_beyond_collateral_fails() {
        let mut f = Fixture::active();
        // 10 units at 2,000 back 20,000
        let result = f.mint(20_001 * ONE);
        assert!(matches!(result, Err(Error::InsufficientCollateral { .. })));
        assert_eq!(f.protocol.position(f.position).unwrap().principal, 0);
    }

    #[test]
    fn test_repay_pays_interest_first() {
        let mut f = Fixture::active();
        f.mint(10_000 * ONE).unwrap();
        f.protocol.advance_time(SECONDS_PER_YEAR);

        // 5% leading rate + 1% premium
        let debt = f.protocol.debt_of(f.position).unwrap();
        assert_eq!(debt, 10_600 * ONE);

        let repayment = f.protocol.repay(f.alice, f.position, 1_000 * ONE).unwrap();
        assert_eq!(repayment.interest, 600 * ONE);
        assert_eq!(repayment.principal, 400 * ONE);
        assert_eq!(repayment.reserve_returned, 60 * ONE);

        let position = f.protocol.position(f.position).unwrap();
        assert_eq!(position.interest, 0);
        assert_eq!(position.principal, 9_600 * ONE);
    }

    #[test]
    fn test_repay_caps_at_debt() {
        let mut f = Fixture::active();
        f.mint(1_000 * ONE).unwrap();
        let repayment = f.protocol.repay(f.alice, f.position, 5_000 * ONE).unwrap();
        assert_eq!(repayment.principal, 1_000 * ONE);
        assert_eq!(f.protocol.position(f.position).unwrap().principal, 0);
    }

    #[test]
    fn test_small_repayments_leave_truncated_reserve_as_equity() {
        let mut f = Fixture::active();
        f.mint(10_000 * ONE).unwrap();
        let reserve_before = f.protocol.state().stablecoin.reserve_balance();
        let equity_before = f.protocol.equity();

        // 15% of 6 wei truncates to zero on every repayment
        let mut returned = 0;
        for _ in 0..1_000 {
            let repayment = f.protocol.repay(f.alice, f.position, 6).unwrap();
            assert_eq!(repayment.principal, 6);
            returned += repayment.reserve_returned;
        }
        assert_eq!(returned, 0);
        assert_eq!(f.protocol.state().stablecoin.reserve_balance(), reserve_before);
        assert_eq!(f.protocol.equity(), equity_before + 900);

        // The same principal in one repayment gets its full share back
        let repayment = f.protocol.repay(f.alice, f.position, 6_000).unwrap();
        assert_eq!(repayment.reserve_returned, 900);
        assert_eq!(f.protocol.equity(), equity_before + 900);
        assert_eq!(
            f.protocol.position(f.position).unwrap().principal,
            10_000 * ONE - 12_000
        );
    }

    #[test]
    fn test_mint_repay_round_trip_is_neutral() {
        let mut f = Fixture::active();
        let alice_before = f.protocol.balance_of(&f.alice);
        let reserve_before = f.protocol.state().stablecoin.reserve_balance();

        f.mint(5_000 * ONE).unwrap();
        f.protocol.repay(f.alice, f.position, 5_000 * ONE).unwrap();

        assert_eq!(f.protocol.balance_of(&f.alice), alice_before);
        assert_eq!(f.protocol.state().stablecoin.reserve_balance(), reserve_before);
        assert_eq!(f.protocol.state().stablecoin.minter_reserve(), 0);
    }

    #[test]
    fn test_withdraw_keeps_collateral_invariant() {
        let mut f = Fixture::active();
        f.mint(10_000 * ONE).unwrap();
        let result = f
            .protocol
            .withdraw_collateral(f.alice, f.position, f.alice, 6 * ONE);
        assert!(matches!(result, Err(Error::InsufficientCollateral { .. })));

        let balance = f
            .protocol
            .withdraw_collateral(f.alice, f.position, f.alice, 5 * ONE)
            .unwrap();
        assert_eq!(balance, 5 * ONE);
    }

    #[test]
    fn test_withdraw_everything_closes_debt_free_position() {
        let mut f = Fixture::active();
        f.protocol
            .withdraw_collateral(f.alice, f.position, f.alice, 10 * ONE)
            .unwrap();
        assert!(f.protocol.position(f.position).unwrap().closed);
        assert_eq!(f.protocol.events().filter_by_type("PositionClosed").len(), 1);
    }

    #[test]
    fn test_price_increase_sets_proportional_cooldown() {
        let mut f = Fixture::active();
        let now = f.protocol.timestamp();

        // +50% of the price: half of the full 3 day cooldown, above the 1 day floor
        let cooldown = f
            .protocol
            .adjust_price(f.alice, f.position, 3_000 * ONE)
            .unwrap();
        assert_eq!(cooldown, now + 3 * SECONDS_PER_DAY / 2);
        assert!(matches!(f.mint(ONE), Err(Error::MintingCooldown { .. })));
    }

    #[test]
    fn test_price_decrease_checks_collateral() {
        let mut f = Fixture::active();
        f.mint(10_000 * ONE).unwrap();
        let result = f.protocol.adjust_price(f.alice, f.position, 999 * ONE);
        assert!(matches!(result, Err(Error::InsufficientCollateral { .. })));
        f.protocol.adjust_price(f.alice, f.position, 1_000 * ONE).unwrap();
        assert_eq!(f.protocol.position(f.position).unwrap().price, 1_000 * ONE);
    }

    #[test]
    fn test_adjust_moves_to_targets() {
        let mut f = Fixture::active();
        f.protocol
            .adjust(f.alice, f.position, 4_000 * ONE, 12 * ONE, 2_000 * ONE)
            .unwrap();
        assert_eq!(f.protocol.position(f.position).unwrap().principal, 4_000 * ONE);
        assert_eq!(f.protocol.collateral_of(f.position).unwrap(), 12 * ONE);

        f.protocol
            .adjust(f.alice, f.position, 1_000 * ONE, 3 * ONE, 2_000 * ONE)
            .unwrap();
        assert_eq!(f.protocol.position(f.position).unwrap().principal, 1_000 * ONE);
        assert_eq!(f.protocol.collateral_of(f.position).unwrap(), 3 * ONE);
    }

    #[test]
    fn test_transfer_ownership() {
        let mut f = Fixture::active();
        f.protocol
            .transfer_ownership(f.alice, f.position, f.bob)
            .unwrap();
        assert_eq!(f.protocol.position(f.position).unwrap().owner, f.bob);
        assert!(f.protocol.mint(f.alice, f.position, f.alice, ONE).is_err());
    }

    #[test]
    fn test_accrue_twice_is_idempotent() {
        let mut f = Fixture::active();
        f.mint(10_000 * ONE).unwrap();
        f.protocol.advance_time(SECONDS_PER_DAY);
        let first = f.protocol.accrue_interest(f.position).unwrap();
        let snapshot = f.protocol.position(f.position).unwrap().clone();
        assert!(first > 0);
        assert_eq!(f.protocol.accrue_interest(f.position).unwrap(), 0);
        assert_eq!(f.protocol.position(f.position).unwrap(), &snapshot);
    }
}
