//! Registration engine: the master server's protocol state machine
//!
//! The engine is a plain synchronous value. Every entry point takes an
//! inbound event (a datagram or a frame tick) and returns the datagrams that
//! should go out in response, so the whole protocol can be exercised without
//! sockets. The network layer owns exactly one engine and feeds it events
//! one at a time.
//!
//! ## Sockets
//! Registration, unregistration and list requests arrive on the master
//! socket. Probes leave from, and their answers arrive on, the separate
//! query socket. A server only goes online when the address it claimed
//! answers a probe on the query socket, never because someone sent a
//! REGISTER on its behalf.
//!
//! ## Store side effects
//! `make_server_online` runs once per confirmed probe and
//! `make_server_offline` once per accepted UNREGISTER. Probe expiry never
//! touches the store. Store failures are logged and the in-memory
//! transition completes anyway.

use bytes::Bytes;
use log::{debug, info, warn};
use shared::{
    empty_packet, ClientGetList, DecodeError, PacketReader, PacketType, ServerListType,
    ServerRegister, ServerUnregister, NETWORK_MASTER_SERVER_VERSION,
    NETWORK_MASTER_SERVER_WELCOME_MESSAGE,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::cache::ServerListCache;
use crate::config::Config;
use crate::query::{QueriedServer, QueryTracker, SweepOutcome};
use crate::session::SessionKeys;
use crate::store::ServerStore;

/// Which of the two master sockets a datagram travels through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketRole {
    Master,
    Query,
}

/// A datagram the engine wants sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub via: SocketRole,
    pub addr: SocketAddr,
    pub data: Bytes,
}

type Handler =
    fn(&mut RegistrationEngine, SocketAddr, &mut PacketReader) -> Result<Vec<Outbound>, DecodeError>;

const MASTER_HANDLERS: [(PacketType, Handler); 3] = [
    (
        PacketType::ServerRegister,
        RegistrationEngine::receive_server_register as Handler,
    ),
    (
        PacketType::ServerUnregister,
        RegistrationEngine::receive_server_unregister as Handler,
    ),
    (
        PacketType::ClientGetList,
        RegistrationEngine::receive_client_get_list as Handler,
    ),
];

const QUERY_HANDLERS: [(PacketType, Handler); 1] = [(
    PacketType::ServerResponse,
    RegistrationEngine::receive_server_response as Handler,
)];

fn lookup_handler(role: SocketRole, packet_type: PacketType) -> Option<Handler> {
    let table: &[(PacketType, Handler)] = match role {
        SocketRole::Master => &MASTER_HANDLERS,
        SocketRole::Query => &QUERY_HANDLERS,
    };
    table
        .iter()
        .find(|(t, _)| *t == packet_type)
        .map(|(_, handler)| *handler)
}

pub struct RegistrationEngine {
    config: Config,
    store: Arc<dyn ServerStore>,
    queries: QueryTracker,
    cache: ServerListCache,
    session_keys: SessionKeys,
    frame: u64,
}

impl RegistrationEngine {
    pub fn new(config: Config, store: Arc<dyn ServerStore>) -> Self {
        Self {
            cache: ServerListCache::new(config.list_age, config.safe_mtu),
            session_keys: SessionKeys::new(config.session_seed),
            queries: QueryTracker::new(),
            store,
            config,
            frame: 0,
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn queries(&self) -> &QueryTracker {
        &self.queries
    }

    /// The most recently minted session key
    pub fn session_key(&self) -> u64 {
        self.session_keys.current()
    }

    pub fn is_list_dirty(&self, category: ServerListType) -> bool {
        self.cache.is_dirty(category)
    }

    /// Decodes one datagram received on `role`'s socket and routes it to the
    /// handler registered for its packet type. Anything malformed or
    /// unexpected is logged and dropped without touching state.
    pub fn handle_datagram(
        &mut self,
        role: SocketRole,
        from: SocketAddr,
        datagram: &[u8],
    ) -> Vec<Outbound> {
        let mut reader = match PacketReader::parse(datagram) {
            Ok(reader) => reader,
            Err(e) => {
                debug!("Dropping malformed datagram from {}: {}", from, e);
                return Vec::new();
            }
        };

        let packet_type = reader.packet_type();
        let handler = match lookup_handler(role, packet_type) {
            Some(handler) => handler,
            None => {
                debug!(
                    "Dropping unexpected {:?} packet from {} on the {:?} socket",
                    packet_type, from, role
                );
                return Vec::new();
            }
        };

        handler(self, from, &mut reader).unwrap_or_else(|e| {
            debug!("Dropping {:?} packet from {}: {}", packet_type, from, e);
            Vec::new()
        })
    }

    /// Advances the frame clock by one and retries or expires due probes.
    pub fn tick(&mut self) -> Vec<Outbound> {
        self.frame += 1;

        let outcomes = self.queries.sweep(
            self.frame,
            self.config.query_timeout,
            self.config.query_attempts,
        );

        let mut outbound = Vec::new();
        for outcome in outcomes {
            match outcome {
                SweepOutcome::Retry(addr) => {
                    debug!("Re-probing {} at frame {}", addr, self.frame);
                    outbound.push(Self::probe(addr));
                }
                SweepOutcome::Expired(query) => {
                    debug!(
                        "Giving up on {} after {} probes",
                        query.query_address, query.attempts
                    );
                }
            }
        }
        outbound
    }

    /// Current list packet for `category`. `Autodetect` has no requester to
    /// resolve against here and gets the IPv4 list.
    pub fn server_list_packet(&mut self, category: ServerListType) -> Bytes {
        self.cache.get(category, self.frame, self.store.as_ref())
    }

    fn probe(addr: SocketAddr) -> Outbound {
        Outbound {
            via: SocketRole::Query,
            addr,
            data: empty_packet(PacketType::ClientFindServer),
        }
    }

    fn receive_server_register(
        &mut self,
        from: SocketAddr,
        reader: &mut PacketReader,
    ) -> Result<Vec<Outbound>, DecodeError> {
        let register = ServerRegister::decode(reader)?;

        if register.welcome != NETWORK_MASTER_SERVER_WELCOME_MESSAGE {
            debug!(
                "Received a registration request from {} with an unknown welcome message",
                from
            );
            return Ok(Vec::new());
        }

        if register.version != NETWORK_MASTER_SERVER_VERSION {
            debug!(
                "Received a registration request from {} with unknown master server version {}",
                from, register.version
            );
            return Ok(Vec::new());
        }

        let query_address = SocketAddr::new(from.ip(), register.port);
        debug!("Received a registration request from {}", query_address);

        let session_key = self.session_keys.next_key();
        self.queries.add(QueriedServer::with_session(
            query_address,
            from,
            session_key,
            self.frame,
        ));

        Ok(vec![Self::probe(query_address)])
    }

    fn receive_server_unregister(
        &mut self,
        from: SocketAddr,
        reader: &mut PacketReader,
    ) -> Result<Vec<Outbound>, DecodeError> {
        let unregister = ServerUnregister::decode(reader)?;

        if unregister.version != NETWORK_MASTER_SERVER_VERSION {
            debug!(
                "Received an unregistration request from {} with unknown master server version {}",
                from, unregister.version
            );
            return Ok(Vec::new());
        }

        let addr = SocketAddr::new(from.ip(), unregister.port);
        debug!("Received an unregistration request from {}", addr);

        if let Err(e) = self.store.make_server_offline(addr) {
            warn!("Failed to mark {} offline: {}", addr, e);
        }
        if self.queries.remove(&addr).is_some() {
            debug!("Cancelled pending probe for {}", addr);
        }
        self.cache.invalidate_all();

        info!("Server {} unregistered", addr);
        Ok(Vec::new())
    }

    fn receive_client_get_list(
        &mut self,
        from: SocketAddr,
        reader: &mut PacketReader,
    ) -> Result<Vec<Outbound>, DecodeError> {
        let request = ClientGetList::decode(reader)?;
        let category = request.requested(&from);
        debug!("Received a request for the {:?} server list from {}", category, from);

        Ok(vec![Outbound {
            via: SocketRole::Master,
            addr: from,
            data: self.server_list_packet(category),
        }])
    }

    fn receive_server_response(
        &mut self,
        from: SocketAddr,
        _reader: &mut PacketReader,
    ) -> Result<Vec<Outbound>, DecodeError> {
        let query = match self.queries.remove(&from) {
            Some(query) => query,
            None => {
                warn!("Received an unexpected server response from {}", from);
                return Ok(Vec::new());
            }
        };

        debug!(
            "Received a server response from {} after {} probe(s)",
            from, query.attempts
        );

        if let Err(e) = self
            .store
            .make_server_online(query.query_address, query.session_key())
        {
            warn!("Failed to mark {} online: {}", query.query_address, e);
        }
        self.cache.invalidate_all();

        info!(
            "Server {} is online (registered from {})",
            query.query_address,
            query.reply_address()
        );
        Ok(vec![Outbound {
            via: SocketRole::Query,
            addr: query.query_address,
            data: empty_packet(PacketType::MasterAckRegister),
        }])
    }
}
