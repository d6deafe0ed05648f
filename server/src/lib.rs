//! # Dedicated Game Server Library
//!
//! Hosts one game instance and relays replication deltas between the clients
//! playing in it. The server runs the same step function as every client, in
//! the `Server` role: it owns no ships of its own, applies what each
//! connection sends about the entities it spawned, and forwards the accepted
//! part to everyone else.
//!
//! ## Core Responsibilities
//!
//! ### Admission
//! New TCP connections are admitted up to a capacity limit and given a
//! connection id that is never reused. Clients that stop sending frames for
//! longer than the idle timeout are disconnected.
//!
//! ### Relay
//! Every tick drains each connection's inbound mailbox, steps the game, and
//! publishes the resulting memos through the router. A late joiner is primed
//! with every ship still alive before its first regular update.
//!
//! ### Cleanup
//! When a connection ends, for whatever reason, the ships it spawned are
//! destroyed and the destroy is sent to everyone who remains.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Capacity enforcement, id issuing and liveness tracking.
//!
//! ### Network Module (`network`)
//! The accept loop, per-connection sessions, the timeout checker and the
//! fixed-rate tick loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     // 60Hz, at most 32 clients, drop clients silent for 5 seconds
//!     let mut server = Server::new(
//!         "127.0.0.1:2156",
//!         Duration::from_millis(16),
//!         32,
//!         Duration::from_secs(5),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod network;
