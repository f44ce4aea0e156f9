//! Liveness probes for servers that asked to be listed
//!
//! A registration is never trusted on its own. Every accepted REGISTER
//! creates a [`QueriedServer`] and the master probes the claimed address
//! from its query socket. The entry stays pending until either:
//! - the claimed server answers the probe (confirmed, entry removed), or
//! - the probe has been sent the maximum number of times without an answer
//!   and the last attempt timed out (expired, entry removed silently)
//!
//! All timing is expressed in frames of the server loop, so the tracker is
//! fully deterministic and can be driven by hand in tests.

use log::debug;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Registration details carried by probes that originate from a REGISTER
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationSession {
    /// Source endpoint of the REGISTER datagram, where the ack is routed
    pub reply_address: SocketAddr,
    /// Key minted when the registration was accepted
    pub session_key: u64,
}

/// One outstanding liveness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueriedServer {
    /// Endpoint being probed: the claimed game server
    pub query_address: SocketAddr,
    /// Frame of the most recent probe
    pub frame: u64,
    /// Probes sent so far, 1 on creation
    pub attempts: u32,
    pub session: Option<RegistrationSession>,
}

impl QueriedServer {
    /// Creates a probe for a plain address with the first attempt made at `frame`.
    pub fn new(query_address: SocketAddr, frame: u64) -> Self {
        Self {
            query_address,
            frame,
            attempts: 1,
            session: None,
        }
    }

    /// Creates a probe on behalf of a registrant.
    pub fn with_session(
        query_address: SocketAddr,
        reply_address: SocketAddr,
        session_key: u64,
        frame: u64,
    ) -> Self {
        Self {
            session: Some(RegistrationSession {
                reply_address,
                session_key,
            }),
            ..Self::new(query_address, frame)
        }
    }

    /// Where the acknowledgment goes; the query address when there is no registrant.
    pub fn reply_address(&self) -> SocketAddr {
        self.session
            .map(|s| s.reply_address)
            .unwrap_or(self.query_address)
    }

    pub fn session_key(&self) -> u64 {
        self.session.map(|s| s.session_key).unwrap_or(0)
    }

    /// Frames since the last probe. Never negative, even if `now` lags.
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.frame)
    }
}

/// What a sweep decided for one tracked entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Probe again; the entry's attempt count and frame were updated
    Retry(SocketAddr),
    /// Attempts exhausted; the entry has been removed
    Expired(QueriedServer),
}

/// All pending probes, at most one per query address
#[derive(Debug, Default)]
pub struct QueryTracker {
    queries: HashMap<SocketAddr, QueriedServer>,
}

impl QueryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `query`. An existing probe for the same address is
    /// replaced and returned, restarting the probe cycle.
    pub fn add(&mut self, query: QueriedServer) -> Option<QueriedServer> {
        let replaced = self.queries.insert(query.query_address, query);
        if let Some(old) = &replaced {
            debug!(
                "Restarting probe cycle for {} (was at attempt {})",
                old.query_address, old.attempts
            );
        }
        replaced
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&QueriedServer> {
        self.queries.get(addr)
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> Option<QueriedServer> {
        self.queries.remove(addr)
    }

    /// Retries or expires every entry whose last probe is at least `timeout`
    /// frames old. An entry that already used `max_attempts` is expired
    /// without another probe. Outcomes are ordered by address.
    pub fn sweep(&mut self, now: u64, timeout: u64, max_attempts: u32) -> Vec<SweepOutcome> {
        let mut due: Vec<SocketAddr> = self
            .queries
            .values()
            .filter(|q| q.age(now) >= timeout)
            .map(|q| q.query_address)
            .collect();
        due.sort();

        let mut outcomes = Vec::with_capacity(due.len());
        for addr in due {
            let exhausted = self
                .queries
                .get(&addr)
                .map(|q| q.attempts >= max_attempts)
                .unwrap_or(false);

            if exhausted {
                if let Some(expired) = self.queries.remove(&addr) {
                    outcomes.push(SweepOutcome::Expired(expired));
                }
            } else if let Some(query) = self.queries.get_mut(&addr) {
                query.attempts += 1;
                query.frame = now;
                outcomes.push(SweepOutcome::Retry(addr));
            }
        }
        outcomes
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
