//! Position roller.
//!
//! Moves the debt and collateral of a position into a fresh clone in one
//! step. The roller flash-mints what it needs to repay the source, clones
//! the target with the freed collateral, mints the same debt there and
//! burns the flash amount again. The owner receives any surplus and covers
//! any shortfall.

use tracing::info;

use crate::error::{Error, Result};
use crate::position::position::PositionId;
use crate::protocol::events::ProtocolEvent;
use crate::protocol::operations::RollOutcome;
use crate::protocol::state_machine::ProtocolState;
use crate::utils::address::Address;

impl ProtocolState {
    /// Roll `source` into a new clone of `target_parent` expiring at `expiration`
    pub fn roll(
        &mut self,
        owner: Address,
        source: PositionId,
        target_parent: PositionId,
        expiration: u64,
    ) -> Result<RollOutcome> {
        let now = self.timestamp;
        let roller = self.roller;
        let src = self.positions.get(source)?;
        src.ensure_owner(&owner)?;
        src.ensure_open()?;
        src.ensure_not_challenged()?;
        let parent = self.positions.get(target_parent)?;
        if parent.hub != src.hub || parent.collateral_token != src.collateral_token {
            return Err(Error::RollerMismatch(format!(
                "position {} and position {} use different hubs or collateral",
                source, target_parent
            )));
        }
        if src.kind.is_interest_free() && !parent.kind.is_interest_free() {
            return Err(Error::TargetTypeMismatch(format!(
                "position {} is {} but {} is {}",
                source, src.kind, target_parent, parent.kind
            )));
        }
        let (src_address, src_kind, token) = (src.address, src.kind, src.collateral_token);

        // Flash-mint what the repayment costs after the reserve comes back
        let src = self.positions.get_mut(source)?;
        src.accrue(now)?;
        let (debt, principal, reserve_ppm) = (src.debt(), src.principal, src.reserve_ppm);
        let assigned = self
            .stablecoin
            .calculate_assigned_reserve(principal, reserve_ppm)?;
        let flash = debt.saturating_sub(assigned);
        self.stablecoin.mint(roller, roller, flash, now)?;
        if debt > 0 {
            self.repay(roller, source, debt)?;
        }

        let collateral = self.collateral_balance(source)?;
        self.move_collateral(token, src_address, roller, collateral)?;
        let target = self.create_clone(owner, roller, target_parent, collateral, expiration)?;

        self.positions.get_mut(source)?.closed = true;
        self.emit(ProtocolEvent::PositionClosed { position: source });

        // Same debt on the target; its usable part pays back the flash mint
        let usable = if debt > 0 {
            self.mint(roller, target, roller, debt)?.usable
        } else {
            0
        };
        if usable >= flash {
            self.stablecoin.transfer(roller, owner, usable - flash)?;
        } else {
            self.stablecoin.transfer(owner, roller, flash - usable)?;
        }
        self.stablecoin.burn(roller, flash)?;

        let mut shares = 0;
        if src_kind.is_interest_free() {
            let target_address = self.positions.get(target)?.address;
            shares = self.reserve.shares_of(&src_address);
            self.reserve
                .transfer_shares(src_address, target_address, shares, now)?;
            self.emit(ProtocolEvent::SharesTransferred {
                from: source,
                to: target,
                shares,
            });
        }

        self.emit(ProtocolEvent::Rolled {
            source,
            target,
            collateral,
            repaid: debt,
            minted: debt,
        });
        info!(source = %source, target = %target, debt, collateral, "Position rolled");
        Ok(RollOutcome {
            target,
            collateral,
            repaid: debt,
            minted: debt,
            shares,
        })
    }
}
