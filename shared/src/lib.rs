pub mod packet;

pub use packet::{DecodeError, PacketReader, PacketWriter, NETWORK_NAME_LENGTH, SEND_MTU};

use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Handshake literal a game server must present when registering.
pub const NETWORK_MASTER_SERVER_WELCOME_MESSAGE: &str = "OpenTTDRegister";

/// The only master server protocol version this implementation speaks.
pub const NETWORK_MASTER_SERVER_VERSION: u8 = 1;

pub const NETWORK_MASTER_SERVER_PORT: u16 = 3978;

/// Number of concrete server list categories (`SLT_END`).
pub const SLT_END: usize = 2;

/// UDP packet type tags. Gaps belong to packets this service never handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    ClientFindServer = 0,
    ServerResponse = 1,
    ServerRegister = 4,
    MasterAckRegister = 5,
    ClientGetList = 6,
    MasterResponseList = 7,
    ServerUnregister = 8,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(PacketType::ClientFindServer),
            1 => Ok(PacketType::ServerResponse),
            4 => Ok(PacketType::ServerRegister),
            5 => Ok(PacketType::MasterAckRegister),
            6 => Ok(PacketType::ClientGetList),
            7 => Ok(PacketType::MasterResponseList),
            8 => Ok(PacketType::ServerUnregister),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

/// Server list categories. `Autodetect` only appears on the wire and is
/// resolved against the requester's address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerListType {
    Ipv4 = 0,
    Ipv6 = 1,
    Autodetect = 2,
}

impl ServerListType {
    pub fn for_addr(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => ServerListType::Ipv4,
            SocketAddr::V6(_) => ServerListType::Ipv6,
        }
    }

    pub fn resolve(self, requester: &SocketAddr) -> Self {
        match self {
            ServerListType::Autodetect => Self::for_addr(requester),
            concrete => concrete,
        }
    }

    /// Cache line index; `None` for `Autodetect`.
    pub fn index(self) -> Option<usize> {
        match self {
            ServerListType::Ipv4 => Some(0),
            ServerListType::Ipv6 => Some(1),
            ServerListType::Autodetect => None,
        }
    }

    /// Version byte leading a MASTER_RESPONSE_LIST of this category.
    pub fn list_version(self) -> u8 {
        match self {
            ServerListType::Ipv6 => 2,
            _ => 1,
        }
    }

    pub fn matches(self, addr: &SocketAddr) -> bool {
        self == ServerListType::Autodetect || Self::for_addr(addr) == self
    }
}

impl TryFrom<u8> for ServerListType {
    type Error = DecodeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(ServerListType::Ipv4),
            1 => Ok(ServerListType::Ipv6),
            2 => Ok(ServerListType::Autodetect),
            other => Err(DecodeError::UnknownListType(other)),
        }
    }
}

/// A packet with no payload: probes, probe responses and acks.
pub fn empty_packet(packet_type: PacketType) -> Bytes {
    PacketWriter::new(packet_type).finish()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRegister {
    pub welcome: String,
    pub version: u8,
    pub port: u16,
}

impl ServerRegister {
    pub fn new(port: u16) -> Self {
        Self {
            welcome: NETWORK_MASTER_SERVER_WELCOME_MESSAGE.to_string(),
            version: NETWORK_MASTER_SERVER_VERSION,
            port,
        }
    }

    pub fn decode(reader: &mut PacketReader) -> Result<Self, DecodeError> {
        let welcome = reader.get_string(NETWORK_NAME_LENGTH)?;
        let version = reader.get_u8()?;
        let port = reader.get_u16()?;
        Ok(Self {
            welcome,
            version,
            port,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = PacketWriter::new(PacketType::ServerRegister);
        writer.put_string(&self.welcome);
        writer.put_u8(self.version);
        writer.put_u16(self.port);
        writer.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUnregister {
    pub version: u8,
    pub port: u16,
}

impl ServerUnregister {
    pub fn new(port: u16) -> Self {
        Self {
            version: NETWORK_MASTER_SERVER_VERSION,
            port,
        }
    }

    pub fn decode(reader: &mut PacketReader) -> Result<Self, DecodeError> {
        let version = reader.get_u8()?;
        let port = reader.get_u16()?;
        Ok(Self { version, port })
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = PacketWriter::new(PacketType::ServerUnregister);
        writer.put_u8(self.version);
        writer.put_u16(self.port);
        writer.finish()
    }
}

/// CLIENT_GET_LIST. Old clients send no payload and get the IPv4 list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGetList {
    pub list_type: Option<ServerListType>,
}

impl ClientGetList {
    pub fn decode(reader: &mut PacketReader) -> Result<Self, DecodeError> {
        if reader.remaining() == 0 {
            return Ok(Self { list_type: None });
        }

        let _version = reader.get_u8()?;
        let list_type = ServerListType::try_from(reader.get_u8()?)?;
        Ok(Self {
            list_type: Some(list_type),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = PacketWriter::new(PacketType::ClientGetList);
        if let Some(list_type) = self.list_type {
            writer.put_u8(2);
            writer.put_u8(list_type as u8);
        }
        writer.finish()
    }

    pub fn requested(&self, requester: &SocketAddr) -> ServerListType {
        self.list_type
            .unwrap_or(ServerListType::Ipv4)
            .resolve(requester)
    }
}

/// Writes a MASTER_RESPONSE_LIST for `list_type`, appending entries until
/// the next one would push the packet past `max_size`. Servers of the other
/// address family are skipped. Returns the packet and the entry count.
pub fn encode_server_list(
    list_type: ServerListType,
    servers: &[SocketAddr],
    max_size: usize,
) -> (Bytes, usize) {
    let mut writer = PacketWriter::new(PacketType::MasterResponseList);
    writer.put_u8(list_type.list_version());
    let count_offset = writer.len();
    writer.put_u16(0);

    let mut count: u16 = 0;
    for server in servers.iter().filter(|s| list_type.matches(s)) {
        let entry_size = match server {
            SocketAddr::V4(_) => 4 + 2,
            SocketAddr::V6(_) => 16 + 2,
        };
        if writer.len() + entry_size > max_size || count == u16::MAX {
            break;
        }

        match server.ip() {
            IpAddr::V4(ip) => writer.put_slice(&ip.octets()),
            IpAddr::V6(ip) => writer.put_slice(&ip.octets()),
        }
        writer.put_u16(server.port());
        count += 1;
    }

    writer.patch_u16(count_offset, count);
    (writer.finish(), count as usize)
}

/// Decoded MASTER_RESPONSE_LIST as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerList {
    pub list_type: ServerListType,
    pub servers: Vec<SocketAddr>,
}

impl ServerList {
    pub fn decode(reader: &mut PacketReader) -> Result<Self, DecodeError> {
        let version = reader.get_u8()?;
        let list_type = match version {
            1 => ServerListType::Ipv4,
            2 => ServerListType::Ipv6,
            other => return Err(DecodeError::UnknownListVersion(other)),
        };

        let count = reader.get_u16()?;
        let mut servers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let ip = match list_type {
                ServerListType::Ipv6 => IpAddr::V6(Ipv6Addr::from(reader.get_array::<16>()?)),
                _ => IpAddr::V4(Ipv4Addr::from(reader.get_array::<4>()?)),
            };
            let port = reader.get_u16()?;
            servers.push(SocketAddr::new(ip, port));
        }

        Ok(Self { list_type, servers })
    }
}
