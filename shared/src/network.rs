//! Network delta model: one tick's worth of spawn, destroy and track events
//!
//! A [`NetworkUpdate`] is a pure value. Pending updates collapse into one
//! with [`NetworkUpdate::and_then`], which is what lets a mailbox hold at
//! most one update without ever losing an event.
//!
//! Within a single update destroys logically happen before spawns. An id can
//! therefore appear in both maps only as "the old entity went away and a new
//! one with the same id appeared"; a spawn followed by a destroy cancels out.

use crate::components::ShipControl;
use crate::math::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Application-level identity of a replicated entity, independent of where
/// the entity happens to live in any peer's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NetworkId(pub u64);

/// Kind of entity a spawn event asks the receiver to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnType {
    Ship,
}

/// Latest replicated field snapshot for one entity. Only fields the sender
/// transmits are filled in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Track {
    pub pos: Option<Vec2>,
    pub momentum: Option<Vec2>,
    pub rot: Option<f32>,
    pub spin: Option<f32>,
    pub ship_control: Option<ShipControl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NetworkUpdate {
    pub spawn_events: HashMap<NetworkId, SpawnType>,
    pub destroy_events: HashSet<NetworkId>,
    pub tracks: HashMap<NetworkId, Track>,
}

impl NetworkUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.spawn_events.is_empty() && self.destroy_events.is_empty() && self.tracks.is_empty()
    }

    pub fn spawn(&mut self, id: NetworkId, kind: SpawnType) {
        self.spawn_events.insert(id, kind);
    }

    /// Records a destroy. A spawn still pending in this update is cancelled
    /// instead, since nobody has observed it yet.
    pub fn destroy(&mut self, id: NetworkId) {
        self.tracks.remove(&id);
        if self.spawn_events.remove(&id).is_none() {
            self.destroy_events.insert(id);
        }
    }

    pub fn track(&mut self, id: NetworkId, track: Track) {
        self.tracks.insert(id, track);
    }

    /// Folds `next`, which happened after `self`, into `self`.
    pub fn and_then(&mut self, next: NetworkUpdate) {
        let NetworkUpdate {
            spawn_events,
            destroy_events,
            tracks,
        } = next;

        for id in destroy_events {
            self.destroy(id);
        }
        self.spawn_events.extend(spawn_events);
        self.tracks.extend(tracks);
    }

    /// Consuming form of [`NetworkUpdate::and_then`].
    pub fn merged(mut self, next: NetworkUpdate) -> Self {
        self.and_then(next);
        self
    }
}

/// Issues network ids that do not collide across peers spawning independently.
///
/// The high half is a random per-session prefix, the low half a counter.
#[derive(Debug)]
pub struct NetworkIdAllocator {
    prefix: u64,
    next: u32,
}

impl NetworkIdAllocator {
    pub fn new() -> Self {
        Self::with_prefix(rand::random::<u32>())
    }

    pub fn with_prefix(prefix: u32) -> Self {
        Self {
            prefix: (prefix as u64) << 32,
            next: 0,
        }
    }

    pub fn allocate(&mut self) -> NetworkId {
        let id = NetworkId(self.prefix | self.next as u64);
        self.next = self.next.wrapping_add(1);
        id
    }
}

impl Default for NetworkIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
