//! Position variants and their behavior table.
//!
//! A position is either [`PositionKind::Standard`] or
//! [`PositionKind::AutoInvest`]. Behavior that differs between the two is
//! looked up in a static [`PositionStrategy`] table instead of being spread
//! over `match` arms in the lifecycle code.
//!
//! Auto-invest positions borrow interest-free: their rate and risk premium
//! are pinned to zero for their whole life, clones included. Minted funds do
//! not go to the owner; they are invested in the reserve pool and the shares
//! stay with the position.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::Result;
use crate::position::position::PositionId;
use crate::protocol::events::ProtocolEvent;
use crate::protocol::state_machine::ProtocolState;
use crate::utils::address::Address;

/// Position variant selected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PositionKind {
    /// Plain borrowing position
    #[default]
    Standard,
    /// Interest-free position that invests its mints in the reserve
    AutoInvest,
}

impl PositionKind {
    /// Behavior table of this variant
    pub fn strategy(&self) -> &'static PositionStrategy {
        match self {
            PositionKind::Standard => &STANDARD,
            PositionKind::AutoInvest => &AUTO_INVEST,
        }
    }

    /// Marker checked before share transfers
    pub fn is_interest_free(&self) -> bool {
        self.strategy().interest_free
    }
}

impl fmt::Display for PositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.strategy().name)
    }
}

/// What a mint produced, passed to the post-mint hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    /// Minting position
    pub position: PositionId,
    /// Address of the minting position
    pub position_address: Address,
    /// Caller of the mint (owner or roller)
    pub caller: Address,
    /// Recipient of the usable amount
    pub recipient: Address,
    /// Gross amount added to principal
    pub amount: u128,
    /// Amount after the reserve contribution
    pub usable: u128,
}

/// Variant-specific behavior
pub struct PositionStrategy {
    /// Display name
    pub name: &'static str,
    /// Whether positions of this kind accept locked reserve shares
    pub interest_free: bool,
    /// Risk premium actually applied for a requested premium
    pub effective_risk_premium: fn(requested_ppm: u32) -> u32,
    /// Annual rate fixed at creation from the leading rate and premium
    pub fix_annual_rate: fn(leadrate_ppm: u32, risk_premium_ppm: u32) -> u32,
    /// Where the usable part of a mint goes
    pub mint_recipient: fn(position: Address, requested: Address, caller: Address, roller: Address) -> Address,
    /// Hook run after principal and collateral checks pass
    pub after_mint: fn(&mut ProtocolState, &MintReceipt) -> Result<()>,
}

impl fmt::Debug for PositionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionStrategy")
            .field("name", &self.name)
            .field("interest_free", &self.interest_free)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STANDARD
// ═══════════════════════════════════════════════════════════════════════════════

static STANDARD: PositionStrategy = PositionStrategy {
    name: "standard",
    interest_free: false,
    effective_risk_premium: requested_premium,
    fix_annual_rate: leadrate_plus_premium,
    mint_recipient: requested_recipient,
    after_mint: no_hook,
};

fn requested_premium(requested_ppm: u32) -> u32 {
    requested_ppm
}

fn leadrate_plus_premium(leadrate_ppm: u32, risk_premium_ppm: u32) -> u32 {
    leadrate_ppm.saturating_add(risk_premium_ppm)
}

fn requested_recipient(_: Address, requested: Address, _: Address, _: Address) -> Address {
    requested
}

fn no_hook(_: &mut ProtocolState, _: &MintReceipt) -> Result<()> {
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTO-INVEST
// ═══════════════════════════════════════════════════════════════════════════════

static AUTO_INVEST: PositionStrategy = PositionStrategy {
    name: "auto-invest",
    interest_free: true,
    effective_risk_premium: zero_premium,
    fix_annual_rate: zero_rate,
    mint_recipient: auto_invest_recipient,
    after_mint: auto_invest_after_mint,
};

fn zero_premium(_: u32) -> u32 {
    0
}

fn zero_rate(_: u32, _: u32) -> u32 {
    0
}

/// The roller needs the funds to settle its flash mint; everyone else funds the position itself
fn auto_invest_recipient(position: Address, requested: Address, caller: Address, roller: Address) -> Address {
    if caller == roller {
        requested
    } else {
        position
    }
}

fn auto_invest_after_mint(state: &mut ProtocolState, receipt: &MintReceipt) -> Result<()> {
    if receipt.caller == state.roller || receipt.usable == 0 {
        debug!("Skipping auto-invest for roller mint on {}", receipt.position);
        return Ok(());
    }
    let now = state.timestamp;
    let investment = state.reserve.invest(
        receipt.position_address,
        receipt.usable,
        0,
        &mut state.stablecoin,
        now,
    )?;
    state.emit(ProtocolEvent::SharesInvested {
        position: receipt.position,
        amount: investment.amount,
        shares: investment.shares,
    });
    Ok(())
}
