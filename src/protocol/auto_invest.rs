//! Share handling of auto-invest positions.
//!
//! Shares bought with minted funds stay at the position address. They leave
//! it only through a sale that repays the position's debt, or wholesale to
//! another interest-free position.

use tracing::info;

use crate::error::{Error, Result};
use crate::position::position::PositionId;
use crate::protocol::events::ProtocolEvent;
use crate::protocol::operations::ShareSale;
use crate::protocol::state_machine::{ContractKind, ProtocolState};
use crate::utils::address::Address;

impl ProtocolState {
    /// Redeem `shares` held by the position and repay debt with the proceeds
    ///
    /// Interest is paid first, then principal. Whatever is left once the
    /// debt is gone goes to the owner.
    pub fn sell_shares(
        &mut self,
        owner: Address,
        id: PositionId,
        shares: u128,
        min_proceeds: u128,
    ) -> Result<ShareSale> {
        let now = self.timestamp;
        let position = self.positions.get(id)?;
        position.ensure_owner(&owner)?;
        let address = position.address;
        let held = self.reserve.shares_of(&address);
        if shares > held {
            return Err(Error::InsufficientShareBalance {
                requested: shares,
                available: held,
            });
        }

        self.positions.get_mut(id)?.accrue(now)?;
        let proceeds = self
            .reserve
            .redeem(address, address, shares, min_proceeds, &mut self.stablecoin, now)?;
        let repayment = self.repay_from_funds(id, address, proceeds)?;
        let leftover = proceeds - repayment.net_cost();

        let mut surplus = 0;
        if self.positions.get(id)?.debt() == 0 {
            surplus = leftover;
            self.stablecoin.transfer(address, owner, surplus)?;
        } else if leftover > 0 {
            self.stablecoin.collect_profits(address, leftover)?;
        }

        self.emit(ProtocolEvent::SharesSold {
            position: id,
            shares,
            proceeds,
            surplus,
        });
        info!(position = %id, shares, proceeds, surplus, "Position shares sold");
        Ok(ShareSale {
            shares,
            proceeds,
            repayment,
            surplus,
        })
    }

    /// Move every share of the position to another interest-free position
    pub fn transfer_position_shares(
        &mut self,
        caller: Address,
        id: PositionId,
        target: Address,
    ) -> Result<u128> {
        let now = self.timestamp;
        let position = self.positions.get(id)?;
        if caller != position.owner && caller != self.roller {
            return Err(Error::Unauthorized(format!(
                "{} may not move the shares of position {}",
                caller.short(),
                id
            )));
        }
        if !position.kind.is_interest_free() {
            return Err(Error::TargetTypeMismatch(format!("source position {}", id)));
        }
        if target.is_zero() {
            return Err(Error::ZeroAddress);
        }
        let target_id = match self.contract_kind(&target) {
            None => return Err(Error::NotAContract(target.to_string())),
            Some(ContractKind::Position(target_id))
                if self.positions.get(target_id)?.kind.is_interest_free() =>
            {
                target_id
            }
            Some(kind) => {
                return Err(Error::TargetTypeMismatch(format!(
                    "{} ({:?}) does not accept locked shares",
                    target.short(),
                    kind
                )))
            }
        };

        let address = position.address;
        let shares = self.reserve.shares_of(&address);
        self.reserve.transfer_shares(address, target, shares, now)?;
        self.emit(ProtocolEvent::SharesTransferred {
            from: id,
            to: target_id,
            shares,
        });
        Ok(shares)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::position::kind::PositionKind;
    use crate::position::position::PositionId;
    use crate::protocol::fixtures::*;
    use crate::utils::address::Address;
    use crate::utils::constants::{ONE, SECONDS_PER_DAY};

    fn auto_invest(f: &mut Fixture) -> PositionId {
        let params = position_params(f.weth).with_kind(PositionKind::AutoInvest);
        let id = f.protocol.open_position(f.alice, params).unwrap();
        f.protocol.advance_time(3 * SECONDS_PER_DAY);
        id
    }

    #[test]
    fn test_mint_invests_usable_amount() {
        let mut f = Fixture::opened();
        let id = auto_invest(&mut f);
        let alice_before = f.protocol.balance_of(&f.alice);

        let receipt = f.protocol.mint(f.alice, id, f.alice, 10_000 * ONE).unwrap();

        let address = f.protocol.position(id).unwrap().address;
        assert_eq!(receipt.recipient, address);
        assert_eq!(f.protocol.balance_of(&f.alice), alice_before);
        assert_eq!(f.protocol.balance_of(&address), 0);
        assert!(f.protocol.shares_of(&address) > 0);
        assert_eq!(f.protocol.events().filter_by_type("SharesInvested").len(), 1);
    }

    #[test]
    fn test_sell_shares_repays_debt() {
        let mut f = Fixture::opened();
        let id = auto_invest(&mut f);
        f.protocol.mint(f.alice, id, f.alice, 10_000 * ONE).unwrap();
        let address = f.protocol.position(id).unwrap().address;
        let shares = f.protocol.shares_of(&address);

        assert!(matches!(
            f.protocol.sell_shares(f.alice, id, shares, 0),
            Err(Error::MinimumHoldingPeriodNotElapsed { .. })
        ));
        assert!(matches!(
            f.protocol.sell_shares(f.alice, id, shares + 1, 0),
            Err(Error::InsufficientShareBalance { .. })
        ));

        f.protocol.advance_time(90 * SECONDS_PER_DAY);
        let sale = f.protocol.sell_shares(f.alice, id, shares / 2, 0).unwrap();
        assert!(sale.proceeds > 0);
        assert_eq!(sale.repayment.interest, 0);
        assert!(f.protocol.position(id).unwrap().principal < 10_000 * ONE);
    }

    #[test]
    fn test_sell_shares_is_owner_only() {
        let mut f = Fixture::opened();
        let id = auto_invest(&mut f);
        assert!(matches!(
            f.protocol.sell_shares(f.bob, id, 1, 0),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_transfer_shares_target_checks() {
        let mut f = Fixture::opened();
        let id = auto_invest(&mut f);
        f.protocol.mint(f.alice, id, f.alice, 1_000 * ONE).unwrap();

        assert_eq!(
            f.protocol.transfer_shares(f.alice, id, Address::ZERO),
            Err(Error::ZeroAddress)
        );
        assert!(matches!(
            f.protocol.transfer_shares(f.alice, id, f.bob),
            Err(Error::NotAContract(_))
        ));
        let standard = f.protocol.position(f.position).unwrap().address;
        assert!(matches!(
            f.protocol.transfer_shares(f.alice, id, standard),
            Err(Error::TargetTypeMismatch(_))
        ));
        let hub = f.protocol.state().hub;
        assert!(matches!(
            f.protocol.transfer_shares(f.alice, id, hub),
            Err(Error::TargetTypeMismatch(_))
        ));
        assert!(matches!(
            f.protocol.transfer_shares(f.bob, id, standard),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_transfer_shares_requires_interest_free_source() {
        let mut f = Fixture::opened();
        let id = auto_invest(&mut f);
        f.protocol.mint(f.alice, id, f.alice, 1_000 * ONE).unwrap();
        let target = f.protocol.position(id).unwrap().address;
        let shares = f.protocol.shares_of(&target);

        assert!(matches!(
            f.protocol.transfer_shares(f.alice, f.position, target),
            Err(Error::TargetTypeMismatch(_))
        ));
        assert_eq!(f.protocol.shares_of(&target), shares);
        assert_eq!(f.protocol.events().filter_by_type("SharesTransferred").len(), 0);
    }

    #[test]
    fn test_transfer_shares_between_auto_invest_positions() {
        let mut f = Fixture::opened();
        let first = auto_invest(&mut f);
        let second = auto_invest(&mut f);
        f.protocol.mint(f.alice, first, f.alice, 1_000 * ONE).unwrap();
        let from = f.protocol.position(first).unwrap().address;
        let to = f.protocol.position(second).unwrap().address;
        let shares = f.protocol.shares_of(&from);

        let moved = f.protocol.transfer_shares(f.alice, first, to).unwrap();
        assert_eq!(moved, shares);
        assert_eq!(f.protocol.shares_of(&from), 0);
        assert_eq!(f.protocol.shares_of(&to), shares);
    }
}
