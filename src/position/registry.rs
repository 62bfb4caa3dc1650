//! Arena of position records.
//!
//! Positions are stored by [`PositionId`] and indexed by address. Clones are
//! ordinary entries whose `original` points at the family's first position;
//! the family minting limit and outstanding principal live on that entry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::position::position::{Position, PositionId};
use crate::utils::address::Address;

/// Position arena
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionRegistry {
    positions: BTreeMap<PositionId, Position>,
    by_address: HashMap<Address, PositionId>,
    next_id: u64,
}

impl PositionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            positions: BTreeMap::new(),
            by_address: HashMap::new(),
            next_id: 1,
        }
    }

    /// Reserve the next id and derive its address
    pub fn allocate(&mut self) -> (PositionId, Address) {
        let id = PositionId(self.next_id);
        self.next_id += 1;
        (id, Address::derive("position", id.0))
    }

    /// Insert a position record
    pub fn insert(&mut self, position: Position) {
        self.by_address.insert(position.address, position.id);
        self.next_id = self.next_id.max(position.id.0 + 1);
        self.positions.insert(position.id, position);
    }

    /// Look up by id
    pub fn get(&self, id: PositionId) -> Result<&Position> {
        self.positions
            .get(&id)
            .ok_or_else(|| Error::PositionNotFound(id.to_string()))
    }

    /// Look up by id, mutably
    pub fn get_mut(&mut self, id: PositionId) -> Result<&mut Position> {
        self.positions
            .get_mut(&id)
            .ok_or_else(|| Error::PositionNotFound(id.to_string()))
    }

    /// Resolve an address to a position id
    pub fn id_of(&self, address: &Address) -> Option<PositionId> {
        self.by_address.get(address).copied()
    }

    /// Look up by address
    pub fn by_address(&self, address: &Address) -> Result<&Position> {
        let id = self
            .id_of(address)
            .ok_or_else(|| Error::PositionNotFound(address.to_string()))?;
        self.get(id)
    }

    /// Remaining minting headroom of the family of `id`
    pub fn available_for_minting(&self, id: PositionId) -> Result<u128> {
        let original = self.get(self.get(id)?.original)?;
        Ok(original.limit.saturating_sub(original.minted_total))
    }

    /// Record a mint against the family limit
    pub fn notify_mint(&mut self, id: PositionId, amount: u128) -> Result<()> {
        let available = self.available_for_minting(id)?;
        if amount > available {
            return Err(Error::LimitExceeded {
                requested: amount,
                available,
            });
        }
        let original_id = self.get(id)?.original;
        let original = self.get_mut(original_id)?;
        original.minted_total += amount;
        Ok(())
    }

    /// Release repaid principal from the family total
    pub fn notify_repaid(&mut self, id: PositionId, amount: u128) -> Result<()> {
        let original_id = self.get(id)?.original;
        let original = self.get_mut(original_id)?;
        original.minted_total = original.minted_total.saturating_sub(amount);
        Ok(())
    }

    /// Remove and return all records, keeping id allocation intact
    pub fn take_records(&mut self) -> Vec<Position> {
        self.by_address.clear();
        std::mem::take(&mut self.positions).into_values().collect()
    }

    /// All positions in id order
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Number of positions
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
