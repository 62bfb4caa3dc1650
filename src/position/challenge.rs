//! Challenges: timed auctions against a position's collateral.
//!
//! A challenger escrows collateral of the same kind and starts a challenge at
//! the position's liquidation price. During the first challenge period
//! (averting phase) anyone can buy the escrow at the liquidation price, which
//! ends that part of the challenge. Afterwards (auction phase) the price
//! declines linearly to zero over one more period and bids liquidate the
//! position's collateral instead.
//!
//! Several challenges may be pending on the same position. They settle in
//! the order they were started.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::position::position::PositionId;
use crate::utils::address::Address;
use crate::utils::math::linear_decay;

/// Settlement state of a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeStatus {
    /// Size remaining
    Pending,
    /// Fully averted during the first phase
    Averted,
    /// Fully settled, at least partly through the auction
    Succeeded,
}

/// Phase of a pending challenge at a given time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengePhase {
    /// Bids buy the challenger's escrow at the liquidation price
    Averting,
    /// Bids buy the position's collateral at a declining price
    Auction,
}

/// A challenge record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Identifier, increasing with start order
    pub id: u64,
    /// Challenger whose collateral is escrowed
    pub challenger: Address,
    /// Challenged position
    pub position: PositionId,
    /// Remaining size in collateral units
    pub size: u128,
    /// Size at launch
    pub initial_size: u128,
    /// Start timestamp
    pub start: u64,
    /// Length of each phase
    pub period: u64,
    /// Liquidation price at launch
    pub liq_price: u128,
    /// Settlement state
    pub status: ChallengeStatus,
    /// Size bought during the auction phase
    pub auctioned: u128,
}

impl Challenge {
    /// End of the averting phase
    pub fn averting_ends(&self) -> u64 {
        self.start.saturating_add(self.period)
    }

    /// End of the auction phase, when the price has reached zero
    pub fn auction_ends(&self) -> u64 {
        self.averting_ends().saturating_add(self.period)
    }

    /// Phase at `now`
    pub fn phase(&self, now: u64) -> ChallengePhase {
        if now < self.averting_ends() {
            ChallengePhase::Averting
        } else {
            ChallengePhase::Auction
        }
    }

    /// Price per whole collateral unit at `now`
    pub fn current_price(&self, now: u64) -> Result<u128> {
        match self.phase(now) {
            ChallengePhase::Averting => Ok(self.liq_price),
            ChallengePhase::Auction => linear_decay(
                self.liq_price,
                now - self.averting_ends(),
                self.period,
            ),
        }
    }

    /// Reduce the remaining size after a bid
    pub fn settle(&mut self, size: u128, phase: ChallengePhase) {
        self.size = self.size.saturating_sub(size);
        if phase == ChallengePhase::Auction {
            self.auctioned = self.auctioned.saturating_add(size);
        }
        if self.size == 0 {
            self.status = if self.auctioned > 0 {
                ChallengeStatus::Succeeded
            } else {
                ChallengeStatus::Averted
            };
        }
    }

    /// Check if the challenge still has size remaining
    pub fn is_pending(&self) -> bool {
        self.status == ChallengeStatus::Pending
    }
}

/// All challenges, keyed by id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeBook {
    challenges: BTreeMap<u64, Challenge>,
    next_id: u64,
}

impl ChallengeBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new challenge and return its id
    pub fn open(
        &mut self,
        challenger: Address,
        position: PositionId,
        size: u128,
        start: u64,
        period: u64,
        liq_price: u128,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.challenges.insert(
            id,
            Challenge {
                id,
                challenger,
                position,
                size,
                initial_size: size,
                start,
                period,
                liq_price,
                status: ChallengeStatus::Pending,
                auctioned: 0,
            },
        );
        id
    }

    /// Look up a challenge
    pub fn get(&self, id: u64) -> Result<&Challenge> {
        self.challenges.get(&id).ok_or(Error::ChallengeNotFound(id))
    }

    /// Look up a challenge mutably
    pub fn get_mut(&mut self, id: u64) -> Result<&mut Challenge> {
        self.challenges.get_mut(&id).ok_or(Error::ChallengeNotFound(id))
    }

    /// Require `id` to be pending with no older pending challenge on the same position
    pub fn ensure_next_in_line(&self, id: u64) -> Result<()> {
        let challenge = self.get(id)?;
        if !challenge.is_pending() {
            return Err(Error::ChallengeSettled(id));
        }
        let older = self
            .challenges
            .range(..id)
            .find(|(_, c)| c.position == challenge.position && c.is_pending());
        match older {
            Some((pending, _)) => Err(Error::ChallengeOutOfOrder { pending: *pending }),
            None => Ok(()),
        }
    }

    /// Pending challenges on a position, oldest first
    pub fn pending_for(&self, position: PositionId) -> Vec<&Challenge> {
        self.challenges
            .values()
            .filter(|c| c.position == position && c.is_pending())
            .collect()
    }

    /// All challenges, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Challenge> {
        self.challenges.values()
    }

    /// Number of challenges ever opened
    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    /// Check if no challenge was ever opened
    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}
