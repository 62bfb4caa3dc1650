//! Reserve pool share accounting.
//!
//! The pool owns the stablecoin reserve (held at the pool address in the
//! stablecoin ledger) and issues shares against its equity. Shares are priced
//! at net asset value: `equity / total_shares`. Investment and redemption
//! fees stay in the pool and every rounding step favors it, so the share
//! price never falls through an invest or a redeem.
//!
//! Each holder carries a single anchor timestamp. Incoming shares move the
//! anchor forward by their weight (freshly minted shares count as acquired
//! now, transferred shares keep the sender's age). The anchor gates
//! redemptions through the minimum holding period and doubles as the basis
//! for governance votes: `votes = shares * (now - anchor)`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::core::config::ProtocolParams;
use crate::core::stablecoin::Stablecoin;
use crate::core::token::TokenLedger;
use crate::error::{Error, Result};
use crate::utils::address::Address;
use crate::utils::constants::{BPS_DIVISOR, GENESIS_LOCKED_SHARES, GENESIS_SHARE_PRICE, ONE};
use crate::utils::math::{amount_less_ppm, mul_div, mul_div_up, safe_add, safe_mul};

// ═══════════════════════════════════════════════════════════════════════════════
// SHARE HOLDING
// ═══════════════════════════════════════════════════════════════════════════════

/// A holder's shares and their holding anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareHolding {
    /// Shares held
    pub shares: u128,
    /// Weighted acquisition time
    pub anchor: u64,
}

/// Result of an investment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Investment {
    /// Stablecoin paid in
    pub amount: u128,
    /// Shares credited to the investor
    pub shares: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESERVE POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Equity pool and its share ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservePool {
    address: Address,
    shares: TokenLedger,
    anchors: HashMap<Address, u64>,
    delegates: HashMap<Address, Address>,
    invest_fee_ppm: u32,
    redeem_fee_ppm: u32,
    min_holding_period: u64,
    quorum_bps: u32,
}

impl ReservePool {
    /// Create an empty pool at `address`
    pub fn new(address: Address, params: &ProtocolParams) -> Self {
        Self {
            address,
            shares: TokenLedger::new("JUICE"),
            anchors: HashMap::new(),
            delegates: HashMap::new(),
            invest_fee_ppm: params.invest_fee_ppm,
            redeem_fee_ppm: params.redeem_fee_ppm,
            min_holding_period: params.min_holding_period,
            quorum_bps: params.quorum_bps,
        }
    }

    /// Address of the pool
    pub fn address(&self) -> Address {
        self.address
    }

    /// Total shares outstanding
    pub fn total_shares(&self) -> u128 {
        self.shares.total_supply()
    }

    /// Shares held by `holder`
    pub fn shares_of(&self, holder: &Address) -> u128 {
        self.shares.balance_of(holder)
    }

    /// Holding of `holder`, if any
    pub fn holding(&self, holder: &Address) -> Option<ShareHolding> {
        let shares = self.shares_of(holder);
        if shares == 0 {
            return None;
        }
        Some(ShareHolding {
            shares,
            anchor: self.anchors.get(holder).copied().unwrap_or(0),
        })
    }

    /// Time at which `holder` may redeem
    pub fn redeemable_at(&self, holder: &Address) -> u64 {
        self.anchors
            .get(holder)
            .copied()
            .unwrap_or(0)
            .saturating_add(self.min_holding_period)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRICING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current share price, 18 decimals
    pub fn price(&self, coin: &Stablecoin) -> Result<u128> {
        let total = self.total_shares();
        if total == 0 {
            return Ok(GENESIS_SHARE_PRICE);
        }
        mul_div(coin.equity(), ONE, total)
    }

    /// Shares minted for `amount` given the equity before the deposit
    ///
    /// The genesis price only applies to an empty pool. Outstanding shares
    /// backed by no equity have no price to buy in at.
    fn shares_for(&self, equity_before: u128, amount: u128) -> Result<u128> {
        let net = amount_less_ppm(amount, self.invest_fee_ppm)?;
        let total = self.total_shares();
        if total == 0 {
            return mul_div(net, ONE, GENESIS_SHARE_PRICE);
        }
        if equity_before == 0 {
            return Err(Error::EquityExhausted { shares: total });
        }
        mul_div(net, total, equity_before)
    }

    /// Shares an investment of `amount` would credit to the investor
    pub fn calculate_shares(&self, coin: &Stablecoin, amount: u128) -> Result<u128> {
        let minted = self.shares_for(coin.equity(), amount)?;
        if self.total_shares() == 0 {
            return Ok(minted.saturating_sub(GENESIS_LOCKED_SHARES));
        }
        Ok(minted)
    }

    /// Stablecoin paid out for redeeming `shares` now, net of the redemption fee
    pub fn calculate_proceeds(&self, coin: &Stablecoin, shares: u128) -> Result<u128> {
        let total = self.total_shares();
        if total == 0 {
            return Ok(0);
        }
        if shares > total {
            return Err(Error::InsufficientShareBalance {
                requested: shares,
                available: total,
            });
        }
        let gross = mul_div(shares, coin.equity(), total)?;
        amount_less_ppm(gross, self.redeem_fee_ppm)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INVEST / REDEEM
    // ═══════════════════════════════════════════════════════════════════════════

    /// Invest `amount` of `investor`'s stablecoin for at least `min_shares`
    pub fn invest(
        &mut self,
        investor: Address,
        amount: u128,
        min_shares: u128,
        coin: &mut Stablecoin,
        now: u64,
    ) -> Result<Investment> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let genesis = self.total_shares() == 0;
        let minted = self.shares_for(coin.equity(), amount)?;
        let locked = if genesis { GENESIS_LOCKED_SHARES } else { 0 };
        if minted <= locked {
            return Err(Error::InvalidParameter {
                name: "amount".into(),
                reason: format!("investment of {} buys no shares", amount),
            });
        }
        let received = minted - locked;
        if received < min_shares {
            return Err(Error::SlippageExceeded {
                expected: min_shares,
                actual: received,
            });
        }

        coin.collect_profits(investor, amount)?;
        if locked > 0 {
            self.credit(self.address, locked, now, now)?;
        }
        self.credit(investor, received, now, now)?;

        Ok(Investment {
            amount,
            shares: received,
        })
    }

    /// Redeem `shares` of `holder`, paying the proceeds to `recipient`
    #[allow(clippy::too_many_arguments)]
    pub fn redeem(
        &mut self,
        holder: Address,
        recipient: Address,
        shares: u128,
        min_proceeds: u128,
        coin: &mut Stablecoin,
        now: u64,
    ) -> Result<u128> {
        if shares == 0 {
            return Err(Error::ZeroAmount);
        }
        let available = self.shares_of(&holder);
        if shares > available {
            return Err(Error::InsufficientShareBalance {
                requested: shares,
                available,
            });
        }
        let redeemable_at = self.redeemable_at(&holder);
        if now < redeemable_at {
            return Err(Error::MinimumHoldingPeriodNotElapsed {
                remaining: redeemable_at - now,
            });
        }
        if self.total_shares() - shares < GENESIS_LOCKED_SHARES {
            return Err(Error::TooManySharesRedeemed {
                requested: shares,
                minimum: GENESIS_LOCKED_SHARES,
            });
        }
        let proceeds = self.calculate_proceeds(coin, shares)?;
        if proceeds < min_proceeds {
            return Err(Error::SlippageExceeded {
                expected: min_proceeds,
                actual: proceeds,
            });
        }

        self.shares.burn(holder, shares)?;
        if self.shares_of(&holder) == 0 {
            self.anchors.remove(&holder);
        }
        coin.transfer(self.address, recipient, proceeds)?;
        Ok(proceeds)
    }

    /// Move shares, carrying the sender's holding age to the recipient
    pub fn transfer_shares(&mut self, from: Address, to: Address, amount: u128, now: u64) -> Result<()> {
        if to.is_zero() {
            return Err(Error::ZeroAddress);
        }
        let available = self.shares_of(&from);
        if amount > available {
            return Err(Error::InsufficientShareBalance {
                requested: amount,
                available,
            });
        }
        if amount == 0 || from == to {
            return Ok(());
        }
        let sender_anchor = self.anchors.get(&from).copied().unwrap_or(now);
        self.shares.burn(from, amount)?;
        if self.shares_of(&from) == 0 {
            self.anchors.remove(&from);
        }
        self.credit(to, amount, sender_anchor, now)
    }

    /// Mint `amount` to `holder`, blending the incoming anchor into theirs
    fn credit(&mut self, holder: Address, amount: u128, incoming_anchor: u64, now: u64) -> Result<()> {
        let balance = self.shares_of(&holder);
        let current = self.anchors.get(&holder).copied().unwrap_or(now);
        let total = safe_add(balance, amount)?;
        let anchor = if incoming_anchor >= current {
            let shift = mul_div_up((incoming_anchor - current) as u128, amount, total)?;
            current.saturating_add(shift as u64)
        } else {
            let shift = mul_div((current - incoming_anchor) as u128, amount, total)?;
            current.saturating_sub(shift as u64)
        };
        self.shares.mint(holder, amount)?;
        self.anchors.insert(holder, anchor);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // GOVERNANCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Votes of `holder`: shares times holding duration
    pub fn votes(&self, holder: &Address, now: u64) -> Result<u128> {
        match self.holding(holder) {
            Some(h) => safe_mul(h.shares, now.saturating_sub(h.anchor) as u128),
            None => Ok(0),
        }
    }

    /// Sum of all votes
    pub fn total_votes(&self, now: u64) -> Result<u128> {
        self.anchors
            .keys()
            .try_fold(0u128, |acc, holder| safe_add(acc, self.votes(holder, now)?))
    }

    /// Delegate the votes of `holder` to `delegate`
    pub fn delegate_vote_to(&mut self, holder: Address, delegate: Address) {
        if delegate.is_zero() || delegate == holder {
            self.delegates.remove(&holder);
        } else {
            self.delegates.insert(holder, delegate);
        }
    }

    /// Whether `delegate` may vote for `holder` through a chain of delegations
    pub fn can_vote_for(&self, delegate: &Address, holder: &Address) -> bool {
        let mut current = *holder;
        let mut seen = HashSet::new();
        loop {
            if current == *delegate {
                return true;
            }
            if !seen.insert(current) {
                return false;
            }
            match self.delegates.get(&current) {
                Some(next) => current = *next,
                None => return false,
            }
        }
    }

    /// Votes of `sender` plus the helpers that delegate to it
    pub fn votes_delegated(&self, sender: &Address, helpers: &[Address], now: u64) -> Result<u128> {
        let mut votes = self.votes(sender, now)?;
        let mut seen = HashSet::new();
        for helper in helpers {
            if helper == sender || !seen.insert(*helper) {
                return Err(Error::InvalidParameter {
                    name: "helpers".into(),
                    reason: format!("duplicate helper {}", helper.short()),
                });
            }
            if !self.can_vote_for(sender, helper) {
                return Err(Error::Unauthorized(format!(
                    "{} does not delegate to {}",
                    helper.short(),
                    sender.short()
                )));
            }
            votes = safe_add(votes, self.votes(helper, now)?)?;
        }
        Ok(votes)
    }

    /// Require `sender` (with helpers) to hold the quorum of all votes
    pub fn check_qualified(&self, sender: &Address, helpers: &[Address], now: u64) -> Result<()> {
        let votes = self.votes_delegated(sender, helpers, now)?;
        let total = self.total_votes(now)?;
        let needed = mul_div(total, self.quorum_bps as u128, BPS_DIVISOR)?;
        if total == 0 || votes < needed {
            return Err(Error::Unauthorized(format!(
                "{} holds {} of {} votes, quorum is {} bps",
                sender.short(),
                votes,
                total,
                self.quorum_bps
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::SECONDS_PER_DAY;

    const DAY: u64 = SECONDS_PER_DAY;

    fn setup() -> (ReservePool, Stablecoin, Address) {
        let params = ProtocolParams::default().with_share_fees(0, 0);
        let pool = ReservePool::new(Address::derive("reserve", 0), &params);
        let mut coin = Stablecoin::new("JUSD", pool.address());
        let bridge = Address::derive("bridge", 0);
        coin.initialize_minter(bridge, "bridge").unwrap();
        for name in ["alice", "bob", "carol"] {
            coin.mint(bridge, Address::user(name), 100_000 * ONE, 0).unwrap();
        }
        (pool, coin, bridge)
    }

    #[test]
    fn test_genesis_investment_locks_shares() {
        let (mut pool, mut coin, _) = setup();
        let alice = Address::user("alice");

        let inv = pool.invest(alice, 1_000 * ONE, 0, &mut coin, 0).unwrap();

        assert_eq!(pool.total_shares(), 1_000 * ONE);
        assert_eq!(inv.shares, 1_000 * ONE - GENESIS_LOCKED_SHARES);
        assert_eq!(pool.shares_of(&pool.address()), GENESIS_LOCKED_SHARES);
        assert_eq!(pool.price(&coin).unwrap(), ONE);
    }

    #[test]
    fn test_redeem_respects_holding_period() {
        let (mut pool, mut coin, _) = setup();
        let alice = Address::user("alice");
        let inv = pool.invest(alice, 1_000 * ONE, 0, &mut coin, 0).unwrap();

        let early = pool.redeem(alice, alice, inv.shares, 0, &mut coin, 89 * DAY);
        assert_eq!(
            early,
            Err(Error::MinimumHoldingPeriodNotElapsed { remaining: DAY })
        );

        let proceeds = pool
            .redeem(alice, alice, inv.shares, 0, &mut coin, 90 * DAY)
            .unwrap();
        assert_eq!(proceeds, 1_000 * ONE - GENESIS_LOCKED_SHARES);
    }

    #[test]
    fn test_profit_raises_price() {
        let (mut pool, mut coin, _) = setup();
        let alice = Address::user("alice");
        let bob = Address::user("bob");
        pool.invest(alice, 1_000 * ONE, 0, &mut coin, 0).unwrap();

        coin.collect_profits(bob, 1_000 * ONE).unwrap();
        assert_eq!(pool.price(&coin).unwrap(), 2 * ONE);

        let inv = pool.invest(bob, 1_000 * ONE, 0, &mut coin, 0).unwrap();
        assert_eq!(inv.shares, 500 * ONE);
        assert_eq!(pool.price(&coin).unwrap(), 2 * ONE);
    }

    #[test]
    fn test_wiped_equity_blocks_investment_until_profits_return() {
        let (mut pool, mut coin, _) = setup();
        let alice = Address::user("alice");
        let bob = Address::user("bob");
        pool.invest(alice, 1_000 * ONE, 0, &mut coin, 0).unwrap();

        coin.cover_loss(bob, 1_000 * ONE).unwrap();
        assert_eq!(coin.equity(), 0);
        assert_eq!(pool.price(&coin).unwrap(), 0);

        let expected = Err(Error::EquityExhausted { shares: 1_000 * ONE });
        assert_eq!(pool.calculate_shares(&coin, 100 * ONE), expected);
        assert_eq!(pool.invest(bob, 100 * ONE, 0, &mut coin, 0).map(|i| i.shares), expected);
        assert_eq!(pool.shares_of(&bob), 0);
        assert_eq!(pool.total_shares(), 1_000 * ONE);

        // Fresh profits price the old shares again; newcomers buy in at that price
        coin.collect_profits(bob, 10 * ONE).unwrap();
        let price = pool.price(&coin).unwrap();
        assert_eq!(price, ONE / 100);
        let inv = pool.invest(bob, 100 * ONE, 0, &mut coin, 0).unwrap();
        assert_eq!(inv.shares, 10_000 * ONE);
        assert_eq!(pool.price(&coin).unwrap(), price);
        assert_eq!(pool.calculate_proceeds(&coin, inv.shares).unwrap(), 100 * ONE);
    }

    #[test]
    fn test_slippage_and_balance_checks() {
        let (mut pool, mut coin, _) = setup();
        let alice = Address::user("alice");

        let result = pool.invest(alice, 1_000 * ONE, 1_000 * ONE, &mut coin, 0);
        assert!(matches!(result, Err(Error::SlippageExceeded { .. })));

        pool.invest(alice, 1_000 * ONE, 0, &mut coin, 0).unwrap();
        let result = pool.redeem(alice, alice, 2_000 * ONE, 0, &mut coin, 100 * DAY);
        assert!(matches!(result, Err(Error::InsufficientShareBalance { .. })));

        let result = pool.redeem(alice, alice, ONE, 2 * ONE, &mut coin, 100 * DAY);
        assert!(matches!(result, Err(Error::SlippageExceeded { .. })));
    }

    #[test]
    fn test_fees_stay_in_pool() {
        let params = ProtocolParams::default();
        let mut pool = ReservePool::new(Address::derive("reserve", 0), &params);
        let mut coin = Stablecoin::new("JUSD", pool.address());
        let bridge = Address::derive("bridge", 0);
        coin.initialize_minter(bridge, "bridge").unwrap();
        let alice = Address::user("alice");
        coin.mint(bridge, alice, 10_000 * ONE, 0).unwrap();

        pool.invest(alice, 1_000 * ONE, 0, &mut coin, 0).unwrap();
        let price = pool.price(&coin).unwrap();
        assert!(price > ONE);

        let shares = pool.shares_of(&alice) / 2;
        pool.redeem(alice, alice, shares, 0, &mut coin, 90 * DAY).unwrap();
        assert!(pool.price(&coin).unwrap() >= price);
    }

    #[test]
    fn test_transfer_carries_anchor() {
        let (mut pool, mut coin, _) = setup();
        let alice = Address::user("alice");
        let bob = Address::user("bob");
        let inv = pool.invest(alice, 1_000 * ONE, 0, &mut coin, 0).unwrap();

        pool.transfer_shares(alice, bob, inv.shares, 60 * DAY).unwrap();

        assert_eq!(pool.holding(&bob).map(|h| h.anchor), Some(0));
        assert!(pool.holding(&alice).is_none());
        assert!(pool.redeem(bob, bob, inv.shares, 0, &mut coin, 90 * DAY).is_ok());
    }

    #[test]
    fn test_fresh_shares_move_anchor_forward() {
        let (mut pool, mut coin, _) = setup();
        let alice = Address::user("alice");
        pool.invest(alice, 1_000 * ONE, 0, &mut coin, 0).unwrap();
        let before = pool.shares_of(&alice);
        pool.invest(alice, 1_000 * ONE, 0, &mut coin, 100 * DAY).unwrap();

        let anchor = pool.holding(&alice).map(|h| h.anchor).unwrap_or(0);
        assert!(anchor > 0 && anchor <= 100 * DAY);
        assert_eq!(pool.shares_of(&alice), before * 2 + GENESIS_LOCKED_SHARES);
    }

    #[test]
    fn test_qualification_with_delegation() {
        let (mut pool, mut coin, _) = setup();
        let alice = Address::user("alice");
        let bob = Address::user("bob");
        let carol = Address::user("carol");
        pool.invest(alice, 100 * ONE, 0, &mut coin, 0).unwrap();
        pool.invest(bob, 10_000 * ONE, 0, &mut coin, 0).unwrap();
        pool.invest(carol, 10_000 * ONE, 0, &mut coin, 0).unwrap();

        let now = 10 * DAY;
        assert!(pool.check_qualified(&alice, &[], now).is_err());
        assert!(pool.check_qualified(&bob, &[], now).is_ok());

        assert!(pool.check_qualified(&alice, &[bob], now).is_err());
        pool.delegate_vote_to(bob, alice);
        assert!(pool.check_qualified(&alice, &[bob], now).is_ok());
        assert!(pool.check_qualified(&alice, &[bob, bob], now).is_err());
    }
}
