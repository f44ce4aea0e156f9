//! # Master Server Client Library
//!
//! Client side of the master server protocol, used both by game servers
//! that want to be listed and by game clients looking for servers.
//!
//! - [`MasterClient::register`] announces a game server and answers the
//!   master's liveness probe from the same socket until the master
//!   acknowledges the registration.
//! - [`MasterClient::unregister`] asks to be removed from the list.
//! - [`MasterClient::get_server_list`] fetches the verified servers.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::MasterClient;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MasterClient::new("127.0.0.1:3978", "0.0.0.0:3979", Duration::from_secs(5)).await?;
//!     client.register(3979).await?;
//!
//!     for server in client.get_server_list(None).await?.servers {
//!         println!("{}", server);
//!     }
//!     Ok(())
//! }
//! ```

pub mod network;

pub use network::{ClientError, MasterClient};
