//! # Shared Simulation and Replication Core
//!
//! Everything the server and the client have in common: the entity storage
//! the simulation runs on, the step function itself, and the pieces that
//! move deltas of that simulation between peers.
//!
//! ## Entity Storage
//!
//! ### Archetype Store (`store`, `components`)
//! Entities are grouped into bags by the exact set of components they carry.
//! Each bag stores one dense column per data component, so iterating all
//! entities with a given set of components is a walk over contiguous arrays.
//! Removal is swap-with-last; entities that must be found again across frames
//! carry a `Lookup` handle which the store keeps current on every swap.
//!
//! ### Query Cursor (`query`)
//! The only way to read, create and remove entities. A query collects a
//! requirement mask, then visits every entity whose bag satisfies it.
//!
//! ## Replication
//!
//! ### Network Deltas (`network`)
//! Spawn, destroy and track events keyed by `NetworkId`, with a merge that
//! lets any number of pending deltas collapse into one.
//!
//! ### Mailbox and Router (`mailbox`, `router`)
//! Each connection has a single-slot outbound and inbound mailbox. Senders
//! never wait; a pending delta absorbs the next one. The router fans the
//! simulation's output out to connections by recipient filter and primes late
//! joiners with every entity still alive.
//!
//! ### Framing and Sessions (`frame`, `session`)
//! Deltas travel as `varint(len) || bincode(delta)` frames over any async
//! byte stream. A session pumps frames between one stream and one registered
//! connection.
//!
//! ## Simulation (`game`)
//! The step function both peers run every tick, parameterized by `Role`.

pub mod components;
pub mod frame;
pub mod game;
pub mod mailbox;
pub mod math;
pub mod network;
pub mod query;
pub mod router;
pub mod session;
pub mod store;

pub use frame::FrameError;
pub use game::{Game, Input, Keystate, Role};
pub use network::{NetworkId, NetworkUpdate, SpawnType, Track};
pub use router::{Connection, ConnectionId, Memo, MemoRouter, Recipient};

/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 2156;
