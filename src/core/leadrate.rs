//! The leading interest rate.
//!
//! Governance proposes a new rate which can be applied once the change delay
//! has passed. A new proposal overwrites the pending one. The rate is also
//! integrated over time into *ticks* (ppm-seconds), which the savings module
//! uses to compute interest without iterating over rate history.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::math::{safe_add, safe_mul};

/// A pending rate change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateProposal {
    /// Proposed rate in ppm per year
    pub rate_ppm: u32,
    /// Earliest time the change can be applied
    pub ready_at: u64,
}

/// Governance-set base rate and its tick accumulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leadrate {
    current_rate_ppm: u32,
    pending: Option<RateProposal>,
    anchor_time: u64,
    ticks_anchor: u128,
}

impl Leadrate {
    /// Create with an initial rate effective from `now`
    pub fn new(initial_rate_ppm: u32, now: u64) -> Self {
        Self {
            current_rate_ppm: initial_rate_ppm,
            pending: None,
            anchor_time: now,
            ticks_anchor: 0,
        }
    }

    /// Rate currently in effect
    pub fn current_rate_ppm(&self) -> u32 {
        self.current_rate_ppm
    }

    /// Pending proposal, if any
    pub fn pending(&self) -> Option<RateProposal> {
        self.pending
    }

    /// Whether the rate is zero and no nonzero rate is scheduled
    pub fn is_dormant(&self) -> bool {
        self.current_rate_ppm == 0 && !matches!(self.pending, Some(p) if p.rate_ppm > 0)
    }

    /// Accumulated ticks at `now`
    pub fn current_ticks(&self, now: u64) -> Result<u128> {
        let elapsed = now.saturating_sub(self.anchor_time) as u128;
        safe_add(
            self.ticks_anchor,
            safe_mul(elapsed, self.current_rate_ppm as u128)?,
        )
    }

    /// Propose a new rate; replaces any pending proposal
    pub fn propose_change(&mut self, rate_ppm: u32, delay: u64, now: u64) -> RateProposal {
        let proposal = RateProposal {
            rate_ppm,
            ready_at: now.saturating_add(delay),
        };
        self.pending = Some(proposal);
        proposal
    }

    /// Apply the pending proposal once it has matured
    pub fn apply_change(&mut self, now: u64) -> Result<u32> {
        let proposal = self.pending.ok_or(Error::NoPendingChange)?;
        if now < proposal.ready_at {
            return Err(Error::ChangeNotReady {
                ready_at: proposal.ready_at,
            });
        }
        self.ticks_anchor = self.current_ticks(now)?;
        self.anchor_time = now;
        self.current_rate_ppm = proposal.rate_ppm;
        self.pending = None;
        Ok(proposal.rate_ppm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 86_400;

    #[test]
    fn test_ticks_accumulate() {
        let rate = Leadrate::new(50_000, 1_000);
        assert_eq!(rate.current_ticks(1_000).unwrap(), 0);
        assert_eq!(rate.current_ticks(1_010).unwrap(), 500_000);
    }

    #[test]
    fn test_apply_requires_matured_proposal() {
        let mut rate = Leadrate::new(10_000, 0);
        assert_eq!(rate.apply_change(0), Err(Error::NoPendingChange));

        rate.propose_change(20_000, 7 * DAY, 0);
        assert_eq!(
            rate.apply_change(7 * DAY - 1),
            Err(Error::ChangeNotReady { ready_at: 7 * DAY })
        );

        assert_eq!(rate.apply_change(7 * DAY).unwrap(), 20_000);
        assert_eq!(rate.current_rate_ppm(), 20_000);
        assert!(rate.pending().is_none());
    }

    #[test]
    fn test_new_proposal_overwrites() {
        let mut rate = Leadrate::new(10_000, 0);
        rate.propose_change(20_000, 7 * DAY, 0);
        rate.propose_change(30_000, 7 * DAY, 3 * DAY);

        assert!(rate.apply_change(8 * DAY).is_err());
        assert_eq!(rate.apply_change(10 * DAY).unwrap(), 30_000);
    }

    #[test]
    fn test_ticks_continuous_across_change() {
        let mut rate = Leadrate::new(10, 0);
        rate.propose_change(30, 100, 0);
        rate.apply_change(100).unwrap();

        // 100s at 10 then 50s at 30
        assert_eq!(rate.current_ticks(150).unwrap(), 1_000 + 1_500);
    }

    #[test]
    fn test_dormant() {
        let mut rate = Leadrate::new(0, 0);
        assert!(rate.is_dormant());
        rate.propose_change(0, DAY, 0);
        assert!(rate.is_dormant());
        rate.propose_change(5_000, DAY, 0);
        assert!(!rate.is_dormant());
    }
}
