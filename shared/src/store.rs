//! Archetype storage: entities grouped into bags by exact component signature
//!
//! An entity has no identity of its own. It is the `(bag, slot)` pair where
//! its component data lives, and that pair changes whenever a removal
//! swaps another entity into its slot. Code that must find one entity again
//! across frames gives it a [`Lookup`] component; the store keeps the handle
//! registry current on every swap so a live handle always resolves to its
//! own entity and a removed entity's handle resolves to nothing.

use crate::components::{Bag, ComponentKind, Signature};
use crate::query::Query;
use std::collections::HashMap;

/// Stable handle to an entity carrying a Lookup component.
///
/// Handles are never reused: a freed registry entry gets a new generation,
/// so an old handle to it reports "not alive" forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lookup {
    index: u32,
    generation: u32,
}

impl Lookup {
    /// A handle that never resolves.
    pub const DETACHED: Lookup = Lookup {
        index: u32::MAX,
        generation: 0,
    };
}

impl Default for Lookup {
    fn default() -> Self {
        Lookup::DETACHED
    }
}

#[derive(Debug)]
struct LookupEntry {
    generation: u32,
    /// Current `(bag, slot)`; `None` once the entity has been removed.
    location: Option<(usize, usize)>,
}

/// Owns every entity and its component data.
#[derive(Debug, Default)]
pub struct Store {
    bags: Vec<Bag>,
    bags_by_signature: HashMap<Signature, usize>,
    lookups: Vec<LookupEntry>,
    free_lookups: Vec<u32>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a cursor over this store with an empty requirement mask.
    pub fn query(&mut self) -> Query<'_> {
        Query::new(self)
    }

    /// Returns the bag with exactly this signature, creating it on first use.
    pub fn create_bag(&mut self, signature: Signature) -> usize {
        if let Some(&index) = self.bags_by_signature.get(&signature) {
            return index;
        }

        let index = self.bags.len();
        self.bags.push(Bag::new(signature));
        self.bags_by_signature.insert(signature, index);
        index
    }

    pub fn find_bag(&self, signature: Signature) -> Option<usize> {
        self.bags_by_signature.get(&signature).copied()
    }

    /// Appends a default-valued entity to `bag` and returns its slot.
    ///
    /// Entities in a bag with a Lookup column get a fresh handle.
    pub fn insert(&mut self, bag: usize) -> usize {
        let slot = self.bags[bag].push_default();

        if self.bags[bag].signature().contains(ComponentKind::Lookup) {
            let handle = self.allocate_lookup(bag, slot);
            if let Some(column) = self.bags[bag].lookup_component.as_mut() {
                column[slot] = handle;
            }
        }

        slot
    }

    /// Swap-removes the entity at `(bag, slot)`.
    ///
    /// The last entity of the bag takes over `slot`; its handle is repointed
    /// and the removed entity's handle is retired.
    pub fn remove_at(&mut self, bag: usize, slot: usize) {
        let last = self.bags[bag].len().saturating_sub(1);
        let removed = self.bags[bag].lookup_component.as_ref().map(|column| column[slot]);

        self.bags[bag].swap_remove(slot);

        if let Some(handle) = removed {
            self.retire_lookup(handle);
        }

        if slot != last {
            let moved = self.bags[bag].lookup_component.as_ref().map(|column| column[slot]);
            if let Some(handle) = moved {
                self.relocate_lookup(handle, bag, slot);
            }
        }
    }

    /// Current `(bag, slot)` of a live handle.
    pub fn locate(&self, handle: Lookup) -> Option<(usize, usize)> {
        self.lookups
            .get(handle.index as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.location)
    }

    pub fn is_alive(&self, handle: Lookup) -> bool {
        self.locate(handle).is_some()
    }

    pub fn bag(&self, index: usize) -> &Bag {
        &self.bags[index]
    }

    pub(crate) fn bag_mut(&mut self, index: usize) -> &mut Bag {
        &mut self.bags[index]
    }

    pub fn bag_count(&self) -> usize {
        self.bags.len()
    }

    /// Number of live entities across all bags.
    pub fn entity_count(&self) -> usize {
        self.bags.iter().map(Bag::len).sum()
    }

    /// Number of live entities whose signature includes every bit of `requirement`.
    pub fn count_matching(&self, requirement: Signature) -> usize {
        self.bags
            .iter()
            .filter(|bag| bag.signature().is_superset_of(requirement))
            .map(Bag::len)
            .sum()
    }

    fn allocate_lookup(&mut self, bag: usize, slot: usize) -> Lookup {
        if let Some(index) = self.free_lookups.pop() {
            let entry = &mut self.lookups[index as usize];
            entry.location = Some((bag, slot));
            return Lookup {
                index,
                generation: entry.generation,
            };
        }

        let index = self.lookups.len() as u32;
        self.lookups.push(LookupEntry {
            generation: 0,
            location: Some((bag, slot)),
        });
        Lookup {
            index,
            generation: 0,
        }
    }

    fn retire_lookup(&mut self, handle: Lookup) {
        if let Some(entry) = self.lookups.get_mut(handle.index as usize) {
            if entry.generation == handle.generation {
                entry.location = None;
                entry.generation = entry.generation.wrapping_add(1);
                self.free_lookups.push(handle.index);
            }
        }
    }

    fn relocate_lookup(&mut self, handle: Lookup, bag: usize, slot: usize) {
        match self.lookups.get_mut(handle.index as usize) {
            Some(entry) if entry.generation == handle.generation => {
                entry.location = Some((bag, slot));
            }
            _ => panic!("entity in bag {} slot {} holds a stale lookup handle", bag, slot),
        }
    }
}
