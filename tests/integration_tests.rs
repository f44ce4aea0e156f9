//! Integration tests for the master server, client and wire protocol
//!
//! These tests run a real server on loopback sockets with a short frame
//! length and drive it through the client library or raw datagrams.

use client::{ClientError, MasterClient};
use server::config::Config;
use server::network::{Server, ServerHandle};
use server::store::{MemoryStore, ServerStore};
use shared::{
    empty_packet, ClientGetList, PacketReader, PacketType, ServerList, ServerListType,
    ServerRegister, SEND_MTU,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

const FRAME: Duration = Duration::from_millis(10);

struct TestServer {
    master_addr: SocketAddr,
    query_addr: SocketAddr,
    store: Arc<MemoryStore>,
    handle: ServerHandle,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

async fn start_server() -> TestServer {
    start_server_with_frame(FRAME).await
}

async fn start_server_with_frame(frame: Duration) -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let config = Config {
        frame_duration: frame,
        session_seed: Some(11),
        ..Config::default()
    };

    let mut server = Server::new("127.0.0.1:0", "127.0.0.1:0", config, store.clone())
        .await
        .expect("Failed to start server");
    let test_server = TestServer {
        master_addr: server.master_addr().unwrap(),
        query_addr: server.query_addr().unwrap(),
        store,
        handle: server.handle(),
    };

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    test_server
}

async fn client_for(server: &TestServer, wait: Duration) -> MasterClient {
    MasterClient::new(&server.master_addr.to_string(), "127.0.0.1:0", wait)
        .await
        .expect("Failed to bind client")
}

/// Receives one datagram or gives up after `wait`
async fn try_recv(socket: &UdpSocket, wait: Duration) -> Option<(Vec<u8>, SocketAddr)> {
    let mut buf = [0u8; SEND_MTU];
    match timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, from))) => Some((buf[..len].to_vec(), from)),
        _ => None,
    }
}

/// REGISTER → probe → response → ack → listed → unregister → unlisted
mod registration_tests {
    use super::*;

    #[tokio::test]
    async fn register_list_unregister() {
        let server = start_server().await;
        let game = client_for(&server, Duration::from_secs(2)).await;
        let game_addr = game.local_addr().unwrap();

        game.register(game_addr.port()).await.unwrap();
        assert_eq!(server.store.get(&game_addr).map(|s| s.addr), Some(game_addr));

        let browser = client_for(&server, Duration::from_secs(2)).await;
        let list = browser.get_server_list(None).await.unwrap();
        assert_eq!(list.list_type, ServerListType::Ipv4);
        assert_eq!(list.servers, vec![game_addr]);

        game.unregister(game_addr.port()).await.unwrap();
        sleep(FRAME * 2).await;
        assert!(server.store.is_empty());

        let list = browser.get_server_list(Some(ServerListType::Ipv4)).await.unwrap();
        assert!(list.servers.is_empty());
    }

    #[tokio::test]
    async fn multiple_servers_are_listed() {
        let server = start_server().await;
        let mut expected = Vec::new();

        for _ in 0..3 {
            let game = client_for(&server, Duration::from_secs(2)).await;
            let addr = game.local_addr().unwrap();
            game.register(addr.port()).await.unwrap();
            expected.push(addr);
        }
        expected.sort();

        let browser = client_for(&server, Duration::from_secs(2)).await;
        let list = browser
            .get_server_list(Some(ServerListType::Autodetect))
            .await
            .unwrap();
        assert_eq!(list.servers, expected);
    }

    #[tokio::test]
    async fn probe_comes_from_query_socket_and_is_retried() {
        let server = start_server_with_frame(Duration::from_millis(40)).await;
        let game = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = game.local_addr().unwrap().port();

        game.send_to(&ServerRegister::new(port).encode(), server.master_addr)
            .await
            .unwrap();

        // Ignore the probe and its first retry
        for _ in 0..2 {
            let (data, from) = try_recv(&game, Duration::from_secs(1))
                .await
                .expect("probe not received");
            assert_eq!(from, server.query_addr);
            let reader = PacketReader::parse(&data).unwrap();
            assert_eq!(reader.packet_type(), PacketType::ClientFindServer);
        }

        // Answer the final retry
        let (_, from) = try_recv(&game, Duration::from_secs(1))
            .await
            .expect("last probe not received");
        game.send_to(&empty_packet(PacketType::ServerResponse), from)
            .await
            .unwrap();

        let (data, from) = try_recv(&game, Duration::from_secs(1))
            .await
            .expect("ack not received");
        assert_eq!(from, server.query_addr);
        assert_eq!(
            PacketReader::parse(&data).unwrap().packet_type(),
            PacketType::MasterAckRegister
        );
        assert!(server.store.get(&game.local_addr().unwrap()).is_some());
    }

    #[tokio::test]
    async fn ack_goes_to_the_answering_game_server() {
        let server = start_server().await;
        let registrar = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let game = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let game_addr = game.local_addr().unwrap();

        registrar
            .send_to(&ServerRegister::new(game_addr.port()).encode(), server.master_addr)
            .await
            .unwrap();

        let (_, from) = try_recv(&game, Duration::from_secs(1))
            .await
            .expect("probe not received");
        game.send_to(&empty_packet(PacketType::ServerResponse), from)
            .await
            .unwrap();

        let (data, from) = try_recv(&game, Duration::from_secs(1))
            .await
            .expect("ack not received");
        assert_eq!(from, server.query_addr);
        assert_eq!(
            PacketReader::parse(&data).unwrap().packet_type(),
            PacketType::MasterAckRegister
        );
        assert!(try_recv(&registrar, FRAME * 10).await.is_none());
        assert!(server.store.get(&game_addr).is_some());
    }
}

/// A registration is never trusted without the claimed endpoint answering
mod anti_spoofing_tests {
    use super::*;

    #[tokio::test]
    async fn silent_server_is_never_listed() {
        let server = start_server().await;
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let silent_port = silent.local_addr().unwrap().port();

        // Claims the silent socket's port; the probe goes there, not to us
        let liar = client_for(&server, FRAME * 30).await;
        let result = liar.register(silent_port).await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));

        let probes = {
            let mut count = 0;
            while try_recv(&silent, FRAME * 10).await.is_some() {
                count += 1;
            }
            count
        };
        assert_eq!(probes, 3);
        assert!(server.store.is_empty());

        let browser = client_for(&server, Duration::from_secs(2)).await;
        assert!(browser.get_server_list(None).await.unwrap().servers.is_empty());
    }

    #[tokio::test]
    async fn unsolicited_response_is_ignored() {
        let server = start_server().await;
        let rogue = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        rogue
            .send_to(&empty_packet(PacketType::ServerResponse), server.query_addr)
            .await
            .unwrap();

        assert!(try_recv(&rogue, FRAME * 10).await.is_none());
        assert!(server.store.is_empty());
    }

    #[tokio::test]
    async fn response_on_master_socket_does_not_confirm() {
        let server = start_server().await;
        let game = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = game.local_addr().unwrap().port();

        game.send_to(&ServerRegister::new(port).encode(), server.master_addr)
            .await
            .unwrap();
        try_recv(&game, Duration::from_secs(1))
            .await
            .expect("probe not received");

        game.send_to(&empty_packet(PacketType::ServerResponse), server.master_addr)
            .await
            .unwrap();
        sleep(FRAME * 3).await;
        assert!(server.store.is_empty());
    }
}

/// Malformed input never produces a reply or a state change
mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn malformed_packets_are_dropped() {
        let server = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();

        let mut wrong_welcome = ServerRegister::new(port);
        wrong_welcome.welcome = "HelloMaster".to_string();
        let mut wrong_version = ServerRegister::new(port);
        wrong_version.version = 2;

        let malformed: Vec<Vec<u8>> = vec![
            vec![],
            vec![0xff],
            vec![0x03, 0x00, 0xee],
            vec![0x10, 0x00, PacketType::ServerRegister as u8],
            wrong_welcome.encode().to_vec(),
            wrong_version.encode().to_vec(),
            ServerRegister::new(port).encode()[..8].to_vec(),
        ];

        for datagram in &malformed {
            socket.send_to(datagram, server.master_addr).await.unwrap();
        }

        assert!(try_recv(&socket, FRAME * 20).await.is_none());
        assert!(server.store.is_empty());
    }

    #[tokio::test]
    async fn list_reply_is_bounded_and_decodable() {
        let server = start_server().await;
        for i in 0..400u16 {
            let addr = SocketAddr::from(([10, 2, (i >> 8) as u8, i as u8], 3979));
            server.store.make_server_online(addr, i as u64).unwrap();
        }

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(&ClientGetList { list_type: None }.encode(), server.master_addr)
            .await
            .unwrap();

        let (data, from) = try_recv(&socket, Duration::from_secs(1))
            .await
            .expect("list not received");
        assert_eq!(from, server.master_addr);
        assert!(data.len() <= 1360);

        let mut reader = PacketReader::parse(&data).unwrap();
        let list = ServerList::decode(&mut reader).unwrap();
        assert_eq!(list.servers.len(), 225);
    }
}
