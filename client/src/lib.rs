//! # Headless Game Client Library
//!
//! Connects to a dedicated server, announces one ship, and keeps the local
//! simulation in step with everyone else's. The client runs the shared step
//! function in the `Client` role: its own ship carries transmit tags and is
//! reported to the server every tick, remote ships carry receive tags and
//! follow the tracks the server relays.
//!
//! Rendering and keyboard capture are outside this crate. A rendered client
//! only differs in simulating scenery; input comes from a scripted
//! [`input::Autopilot`].
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The TCP session to the server and the local tick loop. Long frames are
//! split into steps of at most 1/20 s before they reach the simulation.
//!
//! ### Input Module (`input`)
//! Repeating thrust, steer and fire patterns producing the same key edges a
//! keyboard would.

pub mod input;
pub mod network;
