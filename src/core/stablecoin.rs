//! The stablecoin: a token ledger with minter authorization and reserve
//! bookkeeping.
//!
//! Every mint made by a position sets aside a reserve contribution that is
//! minted to the reserve pool and tracked as the *minter reserve*. The part
//! of the pool balance above the minter reserve is the protocol's equity.
//! When the pool holds less than the minter reserve, every reserve return is
//! scaled down by the same ratio so losses are shared by all positions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::core::token::TokenLedger;
use crate::error::{Error, Result};
use crate::utils::address::Address;
use crate::utils::constants::PPM_DIVISOR;
use crate::utils::math::{amount_less_ppm, mul_div, safe_add};

// ═══════════════════════════════════════════════════════════════════════════════
// MINTER GRANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// A minter authorization, effective once the application period has passed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinterGrant {
    /// Timestamp from which the grant is effective
    pub valid_after: u64,
    /// Fee paid with the application
    pub fee_paid: u128,
    /// Free-form application message
    pub message: String,
}

/// Result of covering a loss out of the reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LossCoverage {
    /// Part paid from the reserve balance
    pub from_reserve: u128,
    /// Part minted without backing because the reserve ran dry
    pub unbacked: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABLECOIN
// ═══════════════════════════════════════════════════════════════════════════════

/// Stablecoin ledger with minters, registered positions and the minter reserve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stablecoin {
    /// Underlying balances
    pub ledger: TokenLedger,
    /// Address of the reserve pool holding the stablecoin reserve
    reserve: Address,
    /// Sum of reserve contributions, scaled by 10^6
    minter_reserve_e6: u128,
    /// Minter authorization table
    minters: HashMap<Address, MinterGrant>,
    /// Registered positions and the minter that registered them
    positions: HashMap<Address, Address>,
}

impl Stablecoin {
    /// Create a new stablecoin whose reserve is held at `reserve`
    pub fn new(symbol: &str, reserve: Address) -> Self {
        Self {
            ledger: TokenLedger::new(symbol),
            reserve,
            minter_reserve_e6: 0,
            minters: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    /// Address of the reserve pool
    pub fn reserve_address(&self) -> Address {
        self.reserve
    }

    /// Balance of an address
    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.ledger.balance_of(holder)
    }

    /// Total supply
    pub fn total_supply(&self) -> u128 {
        self.ledger.total_supply()
    }

    /// Stablecoin held by the reserve pool
    pub fn reserve_balance(&self) -> u128 {
        self.ledger.balance_of(&self.reserve)
    }

    /// Reserve set aside for outstanding mints
    pub fn minter_reserve(&self) -> u128 {
        self.minter_reserve_e6 / PPM_DIVISOR
    }

    /// Reserve balance above the minter reserve
    pub fn equity(&self) -> u128 {
        self.reserve_balance().saturating_sub(self.minter_reserve())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MINTER AUTHORIZATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Grant minting rights without an application period; only before any supply exists
    pub fn initialize_minter(&mut self, minter: Address, message: &str) -> Result<()> {
        if self.ledger.total_supply() > 0 {
            return Err(Error::ApplicationRejected(
                "minters can only be initialized before any supply exists".into(),
            ));
        }
        if minter.is_zero() {
            return Err(Error::ZeroAddress);
        }
        self.minters.insert(
            minter,
            MinterGrant {
                valid_after: 0,
                fee_paid: 0,
                message: message.to_string(),
            },
        );
        Ok(())
    }

    /// Apply for minting rights; the fee is paid into the reserve immediately
    #[allow(clippy::too_many_arguments)]
    pub fn suggest_minter(
        &mut self,
        applicant: Address,
        payer: Address,
        period: u64,
        fee: u128,
        min_period: u64,
        min_fee: u128,
        message: &str,
        now: u64,
    ) -> Result<()> {
        if applicant.is_zero() {
            return Err(Error::ZeroAddress);
        }
        if period < min_period {
            return Err(Error::ApplicationRejected(format!(
                "period {} below minimum {}",
                period, min_period
            )));
        }
        if fee < min_fee {
            return Err(Error::ApplicationRejected(format!(
                "fee {} below minimum {}",
                fee, min_fee
            )));
        }
        if self.minters.contains_key(&applicant) {
            return Err(Error::ApplicationRejected(format!(
                "{} already applied",
                applicant.short()
            )));
        }
        self.collect_profits(payer, fee)?;
        self.minters.insert(
            applicant,
            MinterGrant {
                valid_after: now.saturating_add(period),
                fee_paid: fee,
                message: message.to_string(),
            },
        );
        Ok(())
    }

    /// Remove a minter application that has not become effective yet
    pub fn deny_minter(&mut self, minter: &Address, now: u64) -> Result<MinterGrant> {
        let grant = self
            .minters
            .get(minter)
            .ok_or_else(|| Error::NotMinter(minter.to_string()))?;
        if now > grant.valid_after {
            return Err(Error::ApplicationRejected(format!(
                "application of {} is already effective",
                minter.short()
            )));
        }
        self.minters
            .remove(minter)
            .ok_or_else(|| Error::NotMinter(minter.to_string()))
    }

    /// Check whether `addr` is an effective minter
    pub fn is_minter(&self, addr: &Address, now: u64) -> bool {
        self.minters
            .get(addr)
            .map(|g| now >= g.valid_after)
            .unwrap_or(false)
    }

    /// Minter that registered a position, if any
    pub fn position_minter(&self, position: &Address) -> Option<Address> {
        self.positions.get(position).copied()
    }

    /// Register a position created by `minter`
    pub fn register_position(&mut self, minter: Address, position: Address, now: u64) -> Result<()> {
        if !self.is_minter(&minter, now) {
            return Err(Error::NotMinter(minter.to_string()));
        }
        self.positions.insert(position, minter);
        Ok(())
    }

    /// Minters, positions of minters, and nothing else may mint
    pub fn ensure_can_mint(&self, caller: &Address, now: u64) -> Result<()> {
        if self.is_minter(caller, now) {
            return Ok(());
        }
        match self.positions.get(caller) {
            Some(minter) if self.is_minter(minter, now) => Ok(()),
            _ => Err(Error::NotMinter(caller.to_string())),
        }
    }

    /// Transfer on behalf of `owner`; minters and positions hold an implicit unlimited allowance
    pub fn transfer_from(
        &mut self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: u128,
        now: u64,
    ) -> Result<()> {
        if self.ensure_can_mint(&spender, now).is_ok() {
            return self.ledger.transfer(owner, to, amount);
        }
        self.ledger.transfer_from(spender, owner, to, amount)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MINTING AND BURNING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Plain mint by a minter (flash liquidity for the roller, bridges)
    pub fn mint(&mut self, caller: Address, to: Address, amount: u128, now: u64) -> Result<()> {
        self.ensure_can_mint(&caller, now)?;
        self.ledger.mint(to, amount)
    }

    /// Mint `amount`, diverting `reserve_ppm` of it to the reserve pool
    ///
    /// Returns the usable amount credited to `target`.
    pub fn mint_with_reserve(
        &mut self,
        caller: Address,
        target: Address,
        amount: u128,
        reserve_ppm: u32,
        now: u64,
    ) -> Result<u128> {
        self.ensure_can_mint(&caller, now)?;
        let usable = amount_less_ppm(amount, reserve_ppm)?;
        let contribution = amount - usable;
        let reserve_e6 = amount
            .checked_mul(reserve_ppm as u128)
            .ok_or_else(|| Error::Overflow {
                operation: "minter reserve".into(),
            })?;

        self.ledger.mint(target, usable)?;
        self.ledger.mint(self.reserve, contribution)?;
        self.minter_reserve_e6 = safe_add(self.minter_reserve_e6, reserve_e6)?;
        Ok(usable)
    }

    /// Reserve returned when `minted` with `reserve_ppm` is repaid, rounded down
    ///
    /// Scaled by `reserve_balance / minter_reserve` while the pool is underwater.
    pub fn calculate_assigned_reserve(&self, minted: u128, reserve_ppm: u32) -> Result<u128> {
        let theoretical = mul_div(minted, reserve_ppm as u128, PPM_DIVISOR)?;
        let current = self.reserve_balance();
        let minter_reserve = self.minter_reserve();
        if current < minter_reserve {
            mul_div(theoretical, current, minter_reserve)
        } else {
            Ok(theoretical)
        }
    }

    /// Principal repayable with `net` funds when the reserve share is returned first
    pub fn calculate_freed_amount(&self, net: u128, reserve_ppm: u32) -> Result<u128> {
        let current = self.reserve_balance();
        let minter_reserve = self.minter_reserve();
        let adjusted_ppm = if current < minter_reserve {
            mul_div(reserve_ppm as u128, current, minter_reserve)?
        } else {
            reserve_ppm as u128
        };
        if adjusted_ppm >= PPM_DIVISOR {
            return Ok(net);
        }
        mul_div(net, PPM_DIVISOR, PPM_DIVISOR - adjusted_ppm)
    }

    /// Release the reserve of `principal` to `to`; returns the amount sent
    pub fn unwind_reserve(&mut self, to: Address, principal: u128, reserve_ppm: u32) -> Result<u128> {
        let assigned = self.calculate_assigned_reserve(principal, reserve_ppm)?;
        let released_e6 = principal
            .checked_mul(reserve_ppm as u128)
            .ok_or_else(|| Error::Overflow {
                operation: "minter reserve".into(),
            })?;
        self.ledger.transfer(self.reserve, to, assigned)?;
        self.minter_reserve_e6 = self.minter_reserve_e6.saturating_sub(released_e6);
        Ok(assigned)
    }

    /// Repay `amount` of principal: the assigned reserve goes to `payer`, then `amount` is burned
    pub fn burn_from_with_reserve(&mut self, payer: Address, amount: u128, reserve_ppm: u32) -> Result<u128> {
        let assigned = self.unwind_reserve(payer, amount, reserve_ppm)?;
        self.ledger.burn(payer, amount)?;
        Ok(assigned)
    }

    /// Burn tokens held by `from`
    pub fn burn(&mut self, from: Address, amount: u128) -> Result<()> {
        self.ledger.burn(from, amount)
    }

    /// Transfer tokens between accounts
    pub fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<()> {
        self.ledger.transfer(from, to, amount)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PROFIT AND LOSS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Move `amount` from `source` into the reserve as profit
    pub fn collect_profits(&mut self, source: Address, amount: u128) -> Result<()> {
        self.ledger.transfer(source, self.reserve, amount)
    }

    /// Pay a loss to `target` out of the reserve, minting what the reserve cannot cover
    pub fn cover_loss(&mut self, target: Address, amount: u128) -> Result<LossCoverage> {
        let available = self.reserve_balance();
        let from_reserve = available.min(amount);
        let unbacked = amount - from_reserve;

        self.ledger.transfer(self.reserve, target, from_reserve)?;
        if unbacked > 0 {
            warn!(
                "Reserve depleted, minting {} unbacked to cover loss for {}",
                unbacked,
                target.short()
            );
            self.ledger.mint(target, unbacked)?;
        }
        Ok(LossCoverage {
            from_reserve,
            unbacked,
        })
    }

    /// Pay `amount` of equity to `recipient` (savings interest)
    pub fn distribute_profits(&mut self, recipient: Address, amount: u128) -> Result<()> {
        self.ledger.transfer(self.reserve, recipient, amount)
    }
}
