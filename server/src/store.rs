//! Persistence boundary for the set of online game servers
//!
//! The registration engine only ever talks to a [`ServerStore`]: it reports
//! confirmed registrations and explicit unregistrations, and reads the
//! online set back when a server list packet has to be rebuilt. Each call is
//! expected to be atomic on its own; the engine keeps no transaction log and
//! never retries a failed call.

use dashmap::DashMap;
use log::debug;
use shared::ServerListType;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read/write contract of the online-server store
pub trait ServerStore: Send + Sync {
    /// Records `addr` as a verified, online game server.
    fn make_server_online(&self, addr: SocketAddr, session_key: u64) -> Result<(), StoreError>;

    /// Removes `addr` from the online set. Unknown servers are not an error.
    fn make_server_offline(&self, addr: SocketAddr) -> Result<(), StoreError>;

    /// Online servers belonging to `category`.
    fn list_online_servers(&self, category: ServerListType)
        -> Result<Vec<SocketAddr>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnlineServer {
    pub addr: SocketAddr,
    pub session_key: u64,
}

/// In-memory store keyed by endpoint; categories follow the address family.
///
/// `set_failing` makes every call fail, which lets tests drive the
/// store-failure paths of the engine.
#[derive(Debug, Default)]
pub struct MemoryStore {
    servers: DashMap<SocketAddr, OnlineServer>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked failing".to_string()));
        }
        Ok(())
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<OnlineServer> {
        self.servers.get(addr).map(|r| *r.value())
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl ServerStore for MemoryStore {
    fn make_server_online(&self, addr: SocketAddr, session_key: u64) -> Result<(), StoreError> {
        self.check_available()?;
        self.servers.insert(addr, OnlineServer { addr, session_key });
        debug!("{} stored as online ({} online)", addr, self.servers.len());
        Ok(())
    }

    fn make_server_offline(&self, addr: SocketAddr) -> Result<(), StoreError> {
        self.check_available()?;
        if self.servers.remove(&addr).is_some() {
            debug!("{} removed from the online set", addr);
        }
        Ok(())
    }

    fn list_online_servers(
        &self,
        category: ServerListType,
    ) -> Result<Vec<SocketAddr>, StoreError> {
        self.check_available()?;
        let mut servers: Vec<SocketAddr> = self
            .servers
            .iter()
            .map(|r| *r.key())
            .filter(|addr| category.matches(addr))
            .collect();
        servers.sort();
        Ok(servers)
    }
}
