use log::{debug, info};
use shared::{
    empty_packet, ClientGetList, DecodeError, PacketReader, PacketType, ServerList,
    ServerListType, ServerRegister, ServerUnregister, SEND_MTU,
};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid address: {0}")]
    Address(#[from] std::net::AddrParseError),
    #[error("packet decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("no answer from the master server within {0:?}")]
    Timeout(Duration),
}

/// Talks to a master server from a single UDP socket.
///
/// The same socket doubles as the game server endpoint during
/// registration: the master probes it and expects the answer from it.
pub struct MasterClient {
    socket: UdpSocket,
    master_addr: SocketAddr,
    timeout: Duration,
}

impl MasterClient {
    pub async fn new(
        master_addr: &str,
        bind_addr: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let master_addr = master_addr.parse()?;

        Ok(MasterClient {
            socket,
            master_addr,
            timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.socket.local_addr()?)
    }

    async fn send_to_master(&self, data: &[u8]) -> Result<(), ClientError> {
        self.socket.send_to(data, self.master_addr).await?;
        Ok(())
    }

    /// Waits for the next well-formed packet. Malformed datagrams are skipped.
    async fn recv_packet(&self, deadline: Instant) -> Result<(PacketReader, SocketAddr), ClientError> {
        let mut buffer = [0u8; SEND_MTU];
        loop {
            let (len, from) = timeout_at(deadline, self.socket.recv_from(&mut buffer))
                .await
                .map_err(|_| ClientError::Timeout(self.timeout))??;

            match PacketReader::parse(&buffer[..len]) {
                Ok(reader) => return Ok((reader, from)),
                Err(e) => debug!("Ignoring malformed datagram from {}: {}", from, e),
            }
        }
    }

    /// Registers `port` on this host and answers the master's probes until
    /// the registration is acknowledged.
    pub async fn register(&self, port: u16) -> Result<(), ClientError> {
        let deadline = Instant::now() + self.timeout;
        self.send_to_master(&ServerRegister::new(port).encode())
            .await?;
        info!("Registration sent to {} for port {}", self.master_addr, port);

        loop {
            let (reader, from) = self.recv_packet(deadline).await?;
            match reader.packet_type() {
                PacketType::ClientFindServer => {
                    debug!("Answering probe from {}", from);
                    self.socket
                        .send_to(&empty_packet(PacketType::ServerResponse), from)
                        .await?;
                }
                PacketType::MasterAckRegister => {
                    info!("Registration acknowledged by {}", from);
                    return Ok(());
                }
                other => debug!("Ignoring {:?} from {} while registering", other, from),
            }
        }
    }

    pub async fn unregister(&self, port: u16) -> Result<(), ClientError> {
        self.send_to_master(&ServerUnregister::new(port).encode())
            .await?;
        info!("Unregistration sent to {} for port {}", self.master_addr, port);
        Ok(())
    }

    /// Requests a server list. `None` sends the selector-less request old
    /// clients use, which always yields the IPv4 list.
    pub async fn get_server_list(
        &self,
        list_type: Option<ServerListType>,
    ) -> Result<ServerList, ClientError> {
        let deadline = Instant::now() + self.timeout;
        self.send_to_master(&ClientGetList { list_type }.encode())
            .await?;

        loop {
            let (mut reader, from) = self.recv_packet(deadline).await?;
            if from != self.master_addr || reader.packet_type() != PacketType::MasterResponseList {
                debug!("Ignoring {:?} from {}", reader.packet_type(), from);
                continue;
            }
            return Ok(ServerList::decode(&mut reader)?);
        }
    }
}
