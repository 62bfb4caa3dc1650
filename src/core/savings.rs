//! Savings accounts earning the leading rate.
//!
//! Deposits are held at the savings address. Interest is settled lazily on
//! every touch of an account from the tick delta since its last refresh and
//! is paid out of the reserve's equity, never beyond it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::leadrate::Leadrate;
use crate::core::stablecoin::Stablecoin;
use crate::error::{Error, Result};
use crate::utils::address::Address;
use crate::utils::constants::{PPM_DIVISOR, SECONDS_PER_YEAR};
use crate::utils::math::{mul_div, safe_add};

/// A single saver's balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SavingsAccount {
    /// Saved amount including settled interest
    pub saved: u128,
    /// Tick counter at the last refresh
    pub ticks: u128,
}

/// Savings module state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Savings {
    address: Address,
    accounts: HashMap<Address, SavingsAccount>,
}

impl Savings {
    /// Create a savings module holding deposits at `address`
    pub fn new(address: Address) -> Self {
        Self {
            address,
            accounts: HashMap::new(),
        }
    }

    /// Address holding the deposits
    pub fn address(&self) -> Address {
        self.address
    }

    /// Account of `owner` as of its last refresh
    pub fn account(&self, owner: &Address) -> SavingsAccount {
        self.accounts.get(owner).copied().unwrap_or_default()
    }

    /// Total saved across all accounts
    pub fn total_saved(&self) -> u128 {
        self.accounts.values().map(|a| a.saved).sum()
    }

    /// Interest earned since the last refresh, capped by current equity
    pub fn accrued_interest(
        &self,
        owner: &Address,
        coin: &Stablecoin,
        leadrate: &Leadrate,
        now: u64,
    ) -> Result<u128> {
        let account = self.account(owner);
        let ticks = leadrate.current_ticks(now)?;
        if account.ticks >= ticks || account.saved == 0 {
            return Ok(0);
        }
        let earned = mul_div(
            account.saved,
            ticks - account.ticks,
            PPM_DIVISOR * SECONDS_PER_YEAR as u128,
        )?;
        Ok(earned.min(coin.equity()))
    }

    /// Settle interest into the account; returns the interest paid
    pub fn refresh(
        &mut self,
        owner: Address,
        coin: &mut Stablecoin,
        leadrate: &Leadrate,
        now: u64,
    ) -> Result<u128> {
        let earned = self.accrued_interest(&owner, coin, leadrate, now)?;
        let ticks = leadrate.current_ticks(now)?;
        if earned > 0 {
            coin.distribute_profits(self.address, earned)?;
        }
        let account = self.accounts.entry(owner).or_default();
        account.saved = safe_add(account.saved, earned)?;
        account.ticks = ticks;
        if account.saved == 0 {
            self.accounts.remove(&owner);
        }
        Ok(earned)
    }

    /// Deposit `amount` from `owner`
    pub fn save(
        &mut self,
        owner: Address,
        amount: u128,
        coin: &mut Stablecoin,
        leadrate: &Leadrate,
        now: u64,
    ) -> Result<u128> {
        if leadrate.is_dormant() {
            return Err(Error::ModuleDisabled);
        }
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        self.refresh(owner, coin, leadrate, now)?;
        coin.transfer(owner, self.address, amount)?;
        let ticks = leadrate.current_ticks(now)?;
        let account = self.accounts.entry(owner).or_default();
        account.saved = safe_add(account.saved, amount)?;
        account.ticks = ticks;
        Ok(account.saved)
    }

    /// Withdraw up to `amount` to `target`; returns the amount withdrawn
    pub fn withdraw(
        &mut self,
        owner: Address,
        target: Address,
        amount: u128,
        coin: &mut Stablecoin,
        leadrate: &Leadrate,
        now: u64,
    ) -> Result<u128> {
        self.refresh(owner, coin, leadrate, now)?;
        let account = self.account(&owner);
        let withdrawn = amount.min(account.saved);
        coin.transfer(self.address, target, withdrawn)?;

        let remaining = account.saved - withdrawn;
        if remaining == 0 {
            self.accounts.remove(&owner);
        } else if let Some(acc) = self.accounts.get_mut(&owner) {
            acc.saved = remaining;
        }
        Ok(withdrawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::ONE;

    fn setup(rate_ppm: u32) -> (Savings, Stablecoin, Leadrate, Address) {
        let reserve = Address::derive("reserve", 0);
        let mut coin = Stablecoin::new("JUSD", reserve);
        let minter = Address::derive("bridge", 0);
        coin.initialize_minter(minter, "bridge").unwrap();
        let alice = Address::user("alice");
        coin.mint(minter, alice, 1_000 * ONE, 0).unwrap();
        coin.mint(minter, reserve, 10_000 * ONE, 0).unwrap();
        (
            Savings::new(Address::derive("savings", 0)),
            coin,
            Leadrate::new(rate_ppm, 0),
            alice,
        )
    }

    #[test]
    fn test_interest_over_one_year() {
        let (mut savings, mut coin, rate, alice) = setup(50_000);
        savings.save(alice, 1_000 * ONE, &mut coin, &rate, 0).unwrap();

        let earned = savings
            .refresh(alice, &mut coin, &rate, SECONDS_PER_YEAR)
            .unwrap();

        assert_eq!(earned, 50 * ONE);
        assert_eq!(savings.account(&alice).saved, 1_050 * ONE);
        assert_eq!(coin.balance_of(&savings.address()), 1_050 * ONE);
    }

    #[test]
    fn test_interest_capped_by_equity() {
        let (mut savings, mut coin, rate, alice) = setup(1_000_000);
        let reserve = coin.reserve_address();
        coin.burn(reserve, 9_990 * ONE).unwrap();
        savings.save(alice, 1_000 * ONE, &mut coin, &rate, 0).unwrap();

        let earned = savings
            .refresh(alice, &mut coin, &rate, SECONDS_PER_YEAR)
            .unwrap();
        assert_eq!(earned, 10 * ONE);
    }

    #[test]
    fn test_disabled_when_rate_zero() {
        let (mut savings, mut coin, mut rate, alice) = setup(0);
        assert_eq!(
            savings.save(alice, ONE, &mut coin, &rate, 0),
            Err(Error::ModuleDisabled)
        );

        rate.propose_change(10_000, 100, 0);
        assert!(savings.save(alice, ONE, &mut coin, &rate, 0).is_ok());
    }

    #[test]
    fn test_withdraw_caps_at_balance() {
        let (mut savings, mut coin, rate, alice) = setup(1);
        savings.save(alice, 400 * ONE, &mut coin, &rate, 0).unwrap();

        let bob = Address::user("bob");
        let withdrawn = savings
            .withdraw(alice, bob, 1_000 * ONE, &mut coin, &rate, 0)
            .unwrap();

        assert_eq!(withdrawn, 400 * ONE);
        assert_eq!(coin.balance_of(&bob), 400 * ONE);
        assert_eq!(savings.account(&alice).saved, 0);
        assert_eq!(savings.total_saved(), 0);
    }
}
