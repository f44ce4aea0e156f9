//! # Master Server Library
//!
//! A UDP directory service: game servers register themselves, the master
//! verifies each registration by probing the claimed address, and game
//! clients fetch the list of verified servers.
//!
//! ## Trust Model
//! A REGISTER datagram is only a claim. The master answers it by sending a
//! probe from a second, dedicated query socket to the address being claimed.
//! The server is stored as online only when that exact endpoint answers the
//! probe on the query socket. Probes are retried a bounded number of times
//! and then silently dropped.
//!
//! ## Frame Clock
//! Time is counted in frames of the server loop rather than wall-clock time.
//! Probe retries, probe expiry and server list staleness are all expressed
//! in frames, which keeps the protocol deterministic and lets tests drive
//! the clock directly.
//!
//! ## Module Organization
//!
//! ### Engine (`engine`)
//! The protocol state machine. Decodes datagrams, routes them by socket and
//! packet type, and returns the datagrams to send. Owns the pending probes,
//! the list cache and the session key generator.
//!
//! ### Queries (`query`)
//! Pending liveness probes keyed by the probed endpoint, with retry and
//! expiry decisions per frame.
//!
//! ### Cache (`cache`)
//! One serialized server list per category, rebuilt lazily when it is
//! invalidated or too old.
//!
//! ### Store (`store`)
//! The persistence contract and an in-memory implementation.
//!
//! ### Network (`network`)
//! Binds the master and query sockets and runs the single loop that owns
//! the engine.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::Config;
//! use server::network::Server;
//! use server::store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "0.0.0.0:3978",
//!         "0.0.0.0:3979",
//!         Config::default(),
//!         Arc::new(MemoryStore::new()),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod network;
pub mod query;
pub mod session;
pub mod store;
