//! Fungible token ledger.
//!
//! This module implements the generic ledger behind the stablecoin, the
//! collateral tokens and the reserve share accounting:
//! - Balance tracking
//! - Minting and burning
//! - Transfers and allowances
//!
//! Every failure maps to [`Error::TransferFailed`] so callers see one kind
//! regardless of which token refused the movement.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::address::{Address, Hash};
use crate::utils::constants::TOKEN_DECIMALS;

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Balances, allowances and supply of one fungible token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLedger {
    /// Token symbol
    pub symbol: String,
    /// Decimal places
    pub decimals: u8,
    /// Total supply in raw units
    total_supply: u128,
    /// Balances by holder
    balances: HashMap<Address, u128>,
    /// Allowances by owner, then spender
    allowances: HashMap<Address, HashMap<Address, u128>>,
}

impl TokenLedger {
    /// Create an empty ledger with 18 decimals
    pub fn new(symbol: &str) -> Self {
        Self::with_decimals(symbol, TOKEN_DECIMALS)
    }

    /// Create an empty ledger with custom decimals
    pub fn with_decimals(symbol: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    fn fail(&self, reason: impl Into<String>) -> Error {
        Error::TransferFailed {
            token: self.symbol.clone(),
            reason: reason.into(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get total supply
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Get balance of an address
    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    /// Get the allowance `owner` granted to `spender`
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Number of addresses with a nonzero balance
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Verify that the supply equals the sum of all balances
    pub fn verify_supply_invariant(&self) -> bool {
        let sum = self
            .balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b));
        sum == Some(self.total_supply)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SUPPLY MANAGEMENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mint new tokens to `to`
    pub fn mint(&mut self, to: Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        if to.is_zero() {
            return Err(self.fail("mint to the zero address"));
        }
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| self.fail("supply overflow"))?;
        let new_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or_else(|| self.fail("balance overflow"))?;

        self.balances.insert(to, new_balance);
        self.total_supply = new_supply;
        Ok(())
    }

    /// Burn tokens held by `from`
    pub fn burn(&mut self, from: Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.balance_of(&from);
        if balance < amount {
            return Err(self.fail(format!(
                "burn of {} exceeds balance {} of {}",
                amount,
                balance,
                from.short()
            )));
        }
        self.set_balance(from, balance - amount);
        self.total_supply -= amount;
        Ok(())
    }

    /// Transfer tokens between accounts
    pub fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        if to.is_zero() {
            return Err(self.fail("transfer to the zero address"));
        }
        let from_balance = self.balance_of(&from);
        if from_balance < amount {
            return Err(self.fail(format!(
                "transfer of {} exceeds balance {} of {}",
                amount,
                from_balance,
                from.short()
            )));
        }
        let to_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or_else(|| self.fail("balance overflow"))?;

        self.set_balance(from, from_balance - amount);
        self.balances.insert(to, to_balance);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ALLOWANCES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Set the allowance of `spender` over the tokens of `owner`
    pub fn approve(&mut self, owner: Address, spender: Address, amount: u128) {
        let entry = self.allowances.entry(owner).or_default();
        if amount == 0 {
            entry.remove(&spender);
        } else {
            entry.insert(spender, amount);
        }
        if entry.is_empty() {
            self.allowances.remove(&owner);
        }
    }

    /// Transfer on behalf of `owner`, consuming allowance (`u128::MAX` is unlimited)
    pub fn transfer_from(
        &mut self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: u128,
    ) -> Result<()> {
        let allowed = self.allowance(&owner, &spender);
        if allowed < amount {
            return Err(self.fail(format!(
                "allowance {} of {} insufficient for {}",
                allowed,
                spender.short(),
                amount
            )));
        }
        self.transfer(owner, to, amount)?;
        if allowed != u128::MAX {
            self.approve(owner, spender, allowed - amount);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL
    // ═══════════════════════════════════════════════════════════════════════════

    fn set_balance(&mut self, holder: Address, balance: u128) {
        if balance == 0 {
            self.balances.remove(&holder);
        } else {
            self.balances.insert(holder, balance);
        }
    }

    /// Compute a deterministic hash of supply and balances
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(self.symbol.as_bytes());
        data.extend_from_slice(&self.total_supply.to_be_bytes());

        let mut sorted: Vec<_> = self.balances.iter().collect();
        sorted.sort_by_key(|(k, _)| **k);
        for (holder, balance) in sorted {
            data.extend_from_slice(holder.as_bytes());
            data.extend_from_slice(&balance.to_be_bytes());
        }

        Hash::sha256(&data)
    }
}
