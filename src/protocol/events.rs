//! Protocol events for state change notifications.
//!
//! Events are emitted for every significant state change so observers can
//! follow positions, challenges and the reserve without reading state.
//! Emission is fire-and-forget; a rolled back transaction takes its events
//! with it.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::position::position::PositionId;
use crate::utils::address::{Address, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    // Position Events
    /// A new original position was opened
    PositionOpened {
        /// Position
        position: PositionId,
        /// Position address
        address: Address,
        /// Owner
        owner: Address,
        /// Collateral token
        collateral_token: Address,
        /// Initial collateral
        collateral: u128,
        /// Liquidation price
        price: u128,
    },
    /// A position was cloned from a parent
    PositionCloned {
        /// New position
        position: PositionId,
        /// Parent position
        parent: PositionId,
        /// Owner of the clone
        owner: Address,
        /// Initial collateral
        collateral: u128,
        /// Expiration of the clone
        expiration: u64,
    },
    /// Principal, collateral or price changed after a mint
    MintingUpdate {
        /// Position
        position: PositionId,
        /// Collateral balance
        collateral: u128,
        /// Liquidation price
        price: u128,
        /// Outstanding principal
        principal: u128,
    },
    /// Debt was repaid
    Repaid {
        /// Position
        position: PositionId,
        /// Payer
        payer: Address,
        /// Interest paid
        interest: u128,
        /// Principal paid
        principal: u128,
        /// Reserve returned to the payer
        reserve_returned: u128,
    },
    /// Collateral was deposited
    CollateralDeposited {
        /// Position
        position: PositionId,
        /// Amount deposited
        amount: u128,
        /// New balance
        balance: u128,
    },
    /// Collateral was withdrawn
    CollateralWithdrawn {
        /// Position
        position: PositionId,
        /// Recipient
        target: Address,
        /// Amount withdrawn
        amount: u128,
        /// New balance
        balance: u128,
    },
    /// Liquidation price changed
    PriceAdjusted {
        /// Position
        position: PositionId,
        /// Previous price
        old_price: u128,
        /// New price
        new_price: u128,
        /// Minting blocked until
        cooldown: u64,
    },
    /// Ownership changed hands
    OwnershipTransferred {
        /// Position
        position: PositionId,
        /// Previous owner
        from: Address,
        /// New owner
        to: Address,
    },
    /// Position was vetoed during initialization
    PositionDenied {
        /// Position
        position: PositionId,
        /// Qualified vetoer
        denier: Address,
    },
    /// Position was closed
    PositionClosed {
        /// Position
        position: PositionId,
    },

    // Challenge Events
    /// A challenge was started
    ChallengeStarted {
        /// Challenge id
        challenge: u64,
        /// Position
        position: PositionId,
        /// Challenger
        challenger: Address,
        /// Size in collateral units
        size: u128,
        /// Liquidation price at launch
        liq_price: u128,
    },
    /// Part of a challenge was averted
    ChallengeAverted {
        /// Challenge id
        challenge: u64,
        /// Position
        position: PositionId,
        /// Bidder
        bidder: Address,
        /// Size averted
        size: u128,
    },
    /// Collateral was sold in a challenge auction
    ChallengeSucceeded {
        /// Challenge id
        challenge: u64,
        /// Position
        position: PositionId,
        /// Bidder
        bidder: Address,
        /// Bid paid
        bid: u128,
        /// Collateral acquired
        size: u128,
        /// Principal and interest repaid
        repaid: u128,
        /// Challenger reward
        reward: u128,
    },
    /// Expired collateral was force-sold
    ForcedSale {
        /// Position
        position: PositionId,
        /// Buyer
        buyer: Address,
        /// Collateral sold
        amount: u128,
        /// Price per unit
        price: u128,
        /// Proceeds paid by the buyer
        proceeds: u128,
    },

    // Reserve Events
    /// Stablecoin invested in the reserve on behalf of a position
    SharesInvested {
        /// Position
        position: PositionId,
        /// Amount invested
        amount: u128,
        /// Shares received
        shares: u128,
    },
    /// Position shares sold to repay debt
    SharesSold {
        /// Position
        position: PositionId,
        /// Shares redeemed
        shares: u128,
        /// Proceeds
        proceeds: u128,
        /// Paid out to the owner after debt
        surplus: u128,
    },
    /// Shares moved between positions
    SharesTransferred {
        /// Source position
        from: PositionId,
        /// Target position
        to: PositionId,
        /// Shares moved
        shares: u128,
    },
    /// Profit collected into the reserve
    Profit {
        /// Source of the profit
        source: Address,
        /// Amount
        amount: u128,
    },
    /// Loss covered by the reserve
    Loss {
        /// Recipient of the coverage
        target: Address,
        /// Paid from the reserve
        from_reserve: u128,
        /// Minted without backing
        unbacked: u128,
    },

    // Rate and Savings Events
    /// A leading rate change was proposed
    RateProposed {
        /// Proposer
        proposer: Address,
        /// Proposed rate
        rate_ppm: u32,
        /// Earliest application time
        ready_at: u64,
    },
    /// The leading rate changed
    RateChanged {
        /// New rate
        rate_ppm: u32,
    },
    /// Savings deposit
    Saved {
        /// Account
        account: Address,
        /// Amount deposited
        amount: u128,
    },
    /// Savings interest settled into an account
    InterestCollected {
        /// Account
        account: Address,
        /// Interest paid
        interest: u128,
    },
    /// Savings withdrawal
    SavingsWithdrawn {
        /// Account
        account: Address,
        /// Amount withdrawn
        amount: u128,
    },

    // Roller and Minter Events
    /// Debt and collateral moved to a new position
    Rolled {
        /// Source position
        source: PositionId,
        /// Target position
        target: PositionId,
        /// Collateral moved
        collateral: u128,
        /// Debt repaid on the source
        repaid: u128,
        /// Principal minted on the target
        minted: u128,
    },
    /// A minter application was filed
    MinterApplied {
        /// Applicant
        minter: Address,
        /// Application period
        period: u64,
        /// Fee paid
        fee: u128,
        /// Message
        message: String,
    },
    /// A minter application was denied
    MinterDenied {
        /// Applicant
        minter: Address,
        /// Reason
        message: String,
    },
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PositionOpened { .. } => "PositionOpened",
            Self::PositionCloned { .. } => "PositionCloned",
            Self::MintingUpdate { .. } => "MintingUpdate",
            Self::Repaid { .. } => "Repaid",
            Self::CollateralDeposited { .. } => "CollateralDeposited",
            Self::CollateralWithdrawn { .. } => "CollateralWithdrawn",
            Self::PriceAdjusted { .. } => "PriceAdjusted",
            Self::OwnershipTransferred { .. } => "OwnershipTransferred",
            Self::PositionDenied { .. } => "PositionDenied",
            Self::PositionClosed { .. } => "PositionClosed",
            Self::ChallengeStarted { .. } => "ChallengeStarted",
            Self::ChallengeAverted { .. } => "ChallengeAverted",
            Self::ChallengeSucceeded { .. } => "ChallengeSucceeded",
            Self::ForcedSale { .. } => "ForcedSale",
            Self::SharesInvested { .. } => "SharesInvested",
            Self::SharesSold { .. } => "SharesSold",
            Self::SharesTransferred { .. } => "SharesTransferred",
            Self::Profit { .. } => "Profit",
            Self::Loss { .. } => "Loss",
            Self::RateProposed { .. } => "RateProposed",
            Self::RateChanged { .. } => "RateChanged",
            Self::Saved { .. } => "Saved",
            Self::InterestCollected { .. } => "InterestCollected",
            Self::SavingsWithdrawn { .. } => "SavingsWithdrawn",
            Self::Rolled { .. } => "Rolled",
            Self::MinterApplied { .. } => "MinterApplied",
            Self::MinterDenied { .. } => "MinterDenied",
        }
    }

    /// Position the event refers to, if any
    pub fn position(&self) -> Option<PositionId> {
        match self {
            Self::PositionOpened { position, .. }
            | Self::PositionCloned { position, .. }
            | Self::MintingUpdate { position, .. }
            | Self::Repaid { position, .. }
            | Self::CollateralDeposited { position, .. }
            | Self::CollateralWithdrawn { position, .. }
            | Self::PriceAdjusted { position, .. }
            | Self::OwnershipTransferred { position, .. }
            | Self::PositionDenied { position, .. }
            | Self::PositionClosed { position }
            | Self::ChallengeStarted { position, .. }
            | Self::ChallengeAverted { position, .. }
            | Self::ChallengeSucceeded { position, .. }
            | Self::ForcedSale { position, .. }
            | Self::SharesInvested { position, .. }
            | Self::SharesSold { position, .. } => Some(*position),
            Self::SharesTransferred { from, .. } => Some(*from),
            Self::Rolled { source, .. } => Some(*source),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// An event stamped with the block it was emitted in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Block height at emission
    pub block_height: u64,
    /// Timestamp at emission
    pub timestamp: u64,
    /// The event
    pub event: ProtocolEvent,
}

impl EventRecord {
    /// Compute event hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

/// Bounded in-memory event log; the oldest events are dropped first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: VecDeque<EventRecord>,
    capacity: usize,
    dropped: u64,
}

impl EventLog {
    /// Create an empty log keeping at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Add an event to the log
    pub fn push(&mut self, record: EventRecord) {
        if self.records.len() >= self.capacity.max(1) {
            self.records.pop_front();
            self.dropped += 1;
        }
        self.records.push_back(record);
    }

    /// All retained events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    /// Most recent event
    pub fn last(&self) -> Option<&EventRecord> {
        self.records.back()
    }

    /// The last `n` events, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &EventRecord> {
        self.records.iter().skip(self.records.len().saturating_sub(n))
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&EventRecord> {
        self.records
            .iter()
            .filter(|r| r.event.event_type() == event_type)
            .collect()
    }

    /// Get events concerning a position
    pub fn for_position(&self, position: PositionId) -> Vec<&EventRecord> {
        self.records
            .iter()
            .filter(|r| r.event.position() == Some(position))
            .collect()
    }

    /// Number of events dropped because of the capacity bound
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Get the number of retained events
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: ProtocolEvent) -> EventRecord {
        EventRecord {
            block_height: 1,
            timestamp: 1_000,
            event,
        }
    }

    #[test]
    fn test_event_types() {
        let event = ProtocolEvent::SharesInvested {
            position: PositionId(3),
            amount: 10,
            shares: 9,
        };
        assert_eq!(event.event_type(), "SharesInvested");
        assert_eq!(event.position(), Some(PositionId(3)));

        let event = ProtocolEvent::RateChanged { rate_ppm: 40_000 };
        assert_eq!(event.position(), None);
    }

    #[test]
    fn test_event_log_filter() {
        let mut log = EventLog::new(10);
        log.push(record(ProtocolEvent::PositionClosed {
            position: PositionId(1),
        }));
        log.push(record(ProtocolEvent::RateChanged { rate_ppm: 1 }));
        log.push(record(ProtocolEvent::PositionClosed {
            position: PositionId(2),
        }));

        assert_eq!(log.len(), 3);
        assert_eq!(log.filter_by_type("PositionClosed").len(), 2);
        assert_eq!(log.for_position(PositionId(2)).len(), 1);
    }

    #[test]
    fn test_event_log_bounded() {
        let mut log = EventLog::new(2);
        for rate in 0..5 {
            log.push(record(ProtocolEvent::RateChanged { rate_ppm: rate }));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped(), 3);
        assert_eq!(log.recent(1).count(), 1);
        assert_eq!(log.recent(10).count(), 2);
        assert_eq!(
            log.last().map(|r| r.event.clone()),
            Some(ProtocolEvent::RateChanged { rate_ppm: 4 })
        );
    }

    #[test]
    fn test_event_serialization() {
        let rec = record(ProtocolEvent::Saved {
            account: Address::user("alice"),
            amount: 5,
        });
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"Saved\""));
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
        assert_eq!(back.hash(), rec.hash());
    }
}
