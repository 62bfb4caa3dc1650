//! A single collateralized minting position.
//!
//! The position record holds the debt side (principal, accrued interest),
//! the terms fixed at creation and the lifecycle timestamps. The collateral
//! balance is not stored here: it is read from the collateral token ledger at
//! the position's address, so every check takes it as an argument.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::position::interest::accrued_interest;
use crate::position::kind::PositionKind;
use crate::utils::address::Address;
use crate::utils::constants::ONE;
use crate::utils::math::{amount_plus_ppm_up, collateral_value, mul_div, safe_add};

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque handle of a position in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle state of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    /// Within the initialization period; may still be denied
    Initializing,
    /// Open for minting
    Active,
    /// At least one challenge is pending
    Challenged,
    /// Past expiration; collateral can be force-sold
    Expired,
    /// Fully repaid and collateral withdrawn, or rolled
    Closed,
    /// Collateral seized through challenges or forced sales
    Liquidated,
    /// Vetoed during the initialization period
    Denied,
}

impl PositionState {
    /// Check if the position can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionState::Closed | PositionState::Liquidated | PositionState::Denied
        )
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionState::Initializing => "initializing",
            PositionState::Active => "active",
            PositionState::Challenged => "challenged",
            PositionState::Expired => "expired",
            PositionState::Closed => "closed",
            PositionState::Liquidated => "liquidated",
            PositionState::Denied => "denied",
        };
        write!(f, "{}", s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// A collateralized borrowing account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Registry handle
    pub id: PositionId,
    /// Address holding the collateral and, for auto-invest, the shares
    pub address: Address,
    /// Behavior variant
    pub kind: PositionKind,
    /// Current controller
    pub owner: Address,
    /// Hub that created the position
    pub hub: Address,
    /// Original position of the clone family (itself for originals)
    pub original: PositionId,
    /// Collateral token
    pub collateral_token: Address,
    /// Minimum collateral; smaller balances count as zero
    pub min_collateral: u128,
    /// Family minting limit (meaningful on the original)
    pub limit: u128,
    /// Outstanding family principal (tracked on the original)
    pub minted_total: u128,
    /// Outstanding debt excluding interest
    pub principal: u128,
    /// Unpaid accrued interest
    pub interest: u128,
    /// Timestamp of the last accrual
    pub last_accrual: u64,
    /// Liquidation price: stablecoin per whole collateral unit, 18 decimals
    pub price: u128,
    /// Risk premium over the leading rate
    pub risk_premium_ppm: u32,
    /// Reserve contribution of every mint
    pub reserve_ppm: u32,
    /// Annual interest rate fixed at creation
    pub fixed_annual_rate_ppm: u32,
    /// End of the initialization period
    pub start: u64,
    /// Expiration timestamp
    pub expiration: u64,
    /// Minting is blocked until this time
    pub cooldown: u64,
    /// Duration of each challenge phase
    pub challenge_period: u64,
    /// Collateral under pending challenges
    pub challenged_amount: u128,
    /// Closed after full repayment or roll
    pub closed: bool,
    /// Vetoed during initialization
    pub denied: bool,
    /// All collateral seized
    pub liquidated: bool,
    /// Clone initialization completed
    pub initialized: bool,
}

impl Position {
    // ═══════════════════════════════════════════════════════════════════════════
    // CLONING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Copy the terms of `parent` into a fresh, uninitialized record
    pub fn clone_from_template(
        parent: &Position,
        id: PositionId,
        address: Address,
        owner: Address,
        now: u64,
    ) -> Self {
        Self {
            id,
            address,
            kind: parent.kind,
            owner,
            hub: parent.hub,
            original: parent.original,
            collateral_token: parent.collateral_token,
            min_collateral: parent.min_collateral,
            limit: 0,
            minted_total: 0,
            principal: 0,
            interest: 0,
            last_accrual: now,
            price: 0,
            risk_premium_ppm: parent.risk_premium_ppm,
            reserve_ppm: parent.reserve_ppm,
            fixed_annual_rate_ppm: 0,
            start: parent.start,
            expiration: 0,
            cooldown: now,
            challenge_period: parent.challenge_period,
            challenged_amount: 0,
            closed: false,
            denied: false,
            liquidated: false,
            initialized: false,
        }
    }

    /// Finish a clone: expiration within `(now, max_expiration]`, price from the parent
    pub fn initialize_clone(
        &mut self,
        parent_price: u128,
        expiration: u64,
        max_expiration: u64,
        rate_ppm: u32,
        now: u64,
    ) -> Result<()> {
        if self.initialized {
            return Err(Error::AlreadyInitialized);
        }
        if expiration <= now || expiration > max_expiration {
            return Err(Error::InvalidExpiration {
                requested: expiration,
                now,
                max: max_expiration,
            });
        }
        self.expiration = expiration;
        self.price = parent_price;
        self.fixed_annual_rate_ppm = rate_ppm;
        self.initialized = true;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEBT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Bring interest up to `now`; a second call at the same time changes nothing
    pub fn accrue(&mut self, now: u64) -> Result<u128> {
        if now <= self.last_accrual {
            return Ok(0);
        }
        let delta = accrued_interest(
            self.principal,
            self.fixed_annual_rate_ppm,
            now - self.last_accrual,
        )?;
        self.interest = safe_add(self.interest, delta)?;
        self.last_accrual = now;
        Ok(delta)
    }

    /// Interest as it would be at `now`, without mutating
    pub fn interest_at(&self, now: u64) -> Result<u128> {
        let elapsed = now.saturating_sub(self.last_accrual);
        safe_add(
            self.interest,
            accrued_interest(self.principal, self.fixed_annual_rate_ppm, elapsed)?,
        )
    }

    /// Principal plus accrued interest
    pub fn debt(&self) -> u128 {
        self.principal.saturating_add(self.interest)
    }

    /// Collateral value required to back the current debt
    pub fn collateral_requirement(&self, buffer_ppm: u32) -> Result<u128> {
        amount_plus_ppm_up(self.debt(), buffer_ppm)
    }

    /// Check `balance` at `price` covers the debt; balances under the minimum count as zero
    pub fn check_collateral(&self, balance: u128, price: u128, buffer_ppm: u32) -> Result<()> {
        let relevant = if balance < self.min_collateral { 0 } else { balance };
        let available = collateral_value(relevant, price)?;
        let required = self.collateral_requirement(buffer_ppm)?;
        if available < required {
            return Err(Error::InsufficientCollateral {
                required,
                available,
            });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRICE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Highest price allowed given the family's remaining minting headroom
    pub fn max_price(&self, available_for_minting: u128) -> Result<u128> {
        if self.min_collateral == 0 {
            return Ok(u128::MAX);
        }
        let bound = safe_add(self.principal, available_for_minting)?;
        mul_div(bound, ONE, self.min_collateral)
    }

    /// Set the price, bounded so the minimum collateral cannot back more than the headroom
    pub fn set_price(&mut self, new_price: u128, available_for_minting: u128) -> Result<()> {
        let max = self.max_price(available_for_minting)?;
        if new_price > max {
            return Err(Error::PriceTooHigh {
                price: new_price,
                max,
            });
        }
        self.price = new_price;
        Ok(())
    }

    /// Block minting until at least `now + period`
    pub fn restrict_minting(&mut self, now: u64, period: u64) {
        self.cooldown = self.cooldown.max(now.saturating_add(period));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Closed, denied or liquidated
    pub fn is_closed(&self) -> bool {
        self.closed || self.denied || self.liquidated
    }

    /// Current lifecycle state
    pub fn state(&self, now: u64) -> PositionState {
        if self.denied {
            PositionState::Denied
        } else if self.liquidated {
            PositionState::Liquidated
        } else if self.closed {
            PositionState::Closed
        } else if self.challenged_amount > 0 {
            PositionState::Challenged
        } else if now < self.start {
            PositionState::Initializing
        } else if now >= self.expiration {
            PositionState::Expired
        } else {
            PositionState::Active
        }
    }

    /// Require `caller` to be the owner
    pub fn ensure_owner(&self, caller: &Address) -> Result<()> {
        if *caller != self.owner {
            return Err(Error::Unauthorized(format!(
                "{} is not the owner of position {}",
                caller.short(),
                self.id
            )));
        }
        Ok(())
    }

    /// Require the initialization period to be over
    pub fn ensure_started(&self, now: u64) -> Result<()> {
        if now < self.start {
            return Err(Error::PositionInitializing { start: self.start });
        }
        Ok(())
    }

    /// Require the position not to be expired
    pub fn ensure_alive(&self, now: u64) -> Result<()> {
        if now >= self.expiration {
            return Err(Error::PositionExpired {
                expiration: self.expiration,
            });
        }
        Ok(())
    }

    /// Require the position to be expired
    pub fn ensure_expired(&self, now: u64) -> Result<()> {
        if now < self.expiration {
            return Err(Error::PositionNotExpired {
                expiration: self.expiration,
            });
        }
        Ok(())
    }

    /// Require no pending challenge
    pub fn ensure_not_challenged(&self) -> Result<()> {
        if self.challenged_amount > 0 {
            return Err(Error::PositionChallenged(self.id.to_string()));
        }
        Ok(())
    }

    /// Require no minting cooldown
    pub fn ensure_no_cooldown(&self, now: u64) -> Result<()> {
        if now < self.cooldown {
            return Err(Error::MintingCooldown {
                until: self.cooldown,
            });
        }
        Ok(())
    }

    /// Require the position to be open
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::PositionClosed(self.id.to_string()));
        }
        Ok(())
    }
}
