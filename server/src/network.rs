//! Server network layer: two UDP sockets feeding one registration engine

use crate::config::Config;
use crate::engine::{Outbound, RegistrationEngine, SocketRole};
use crate::store::ServerStore;
use bytes::Bytes;
use log::{debug, error, info};
use shared::SEND_MTU;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    DatagramReceived {
        role: SocketRole,
        data: Bytes,
        addr: SocketAddr,
    },
    Shutdown,
}

/// Cloneable handle for stopping a running server from another task
#[derive(Debug, Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server loop already stopped");
        }
    }
}

/// Master server coordinating the two sockets and the frame clock
///
/// The engine lives on the main loop only. Receiver tasks forward raw
/// datagrams over a channel, and the loop applies them and the frame ticks
/// one at a time, so every state change happens behind that single owner.
pub struct Server {
    master_socket: Arc<UdpSocket>,
    query_socket: Arc<UdpSocket>,
    engine: RegistrationEngine,
    frame_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    pub async fn new(
        master_addr: &str,
        query_addr: &str,
        config: Config,
        store: Arc<dyn ServerStore>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let master_socket = Arc::new(UdpSocket::bind(master_addr).await?);
        let query_socket = Arc::new(UdpSocket::bind(query_addr).await?);
        info!(
            "Master server listening on {} (queries from {})",
            master_socket.local_addr()?,
            query_socket.local_addr()?
        );

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            master_socket,
            query_socket,
            frame_duration: config.frame_duration,
            engine: RegistrationEngine::new(config, store),
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    pub fn master_addr(&self) -> std::io::Result<SocketAddr> {
        self.master_socket.local_addr()
    }

    pub fn query_addr(&self) -> std::io::Result<SocketAddr> {
        self.query_socket.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    fn socket(&self, role: SocketRole) -> Arc<UdpSocket> {
        match role {
            SocketRole::Master => Arc::clone(&self.master_socket),
            SocketRole::Query => Arc::clone(&self.query_socket),
        }
    }

    /// Spawns task that continuously listens on one socket
    fn spawn_network_receiver(&self, role: SocketRole) -> JoinHandle<()> {
        let socket = self.socket(role);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; SEND_MTU];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let data = Bytes::copy_from_slice(&buffer[..len]);
                        if let Err(e) =
                            server_tx.send(ServerMessage::DatagramReceived { role, data, addr })
                        {
                            debug!("Server loop gone, stopping {:?} receiver: {}", role, e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving on the {:?} socket: {}", role, e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Spawns task that processes the outgoing datagram queue
    fn spawn_network_sender(&mut self) -> JoinHandle<()> {
        let master_socket = Arc::clone(&self.master_socket);
        let query_socket = Arc::clone(&self.query_socket);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                let socket = match outbound.via {
                    SocketRole::Master => &master_socket,
                    SocketRole::Query => &query_socket,
                };
                if let Err(e) = socket.send_to(&outbound.data, outbound.addr).await {
                    error!(
                        "Failed to send {} bytes to {} via the {:?} socket: {}",
                        outbound.data.len(),
                        outbound.addr,
                        outbound.via,
                        e
                    );
                }
            }
        })
    }

    fn queue(&self, outbound: Vec<Outbound>) {
        for datagram in outbound {
            if let Err(e) = self.outbound_tx.send(datagram) {
                error!("Failed to queue datagram for sending: {}", e);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let tasks = [
            self.spawn_network_receiver(SocketRole::Master),
            self.spawn_network_receiver(SocketRole::Query),
            self.spawn_network_sender(),
        ];

        let mut frame_interval = interval(self.frame_duration);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::DatagramReceived { role, data, addr }) => {
                            let outbound = self.engine.handle_datagram(role, addr, &data);
                            self.queue(outbound);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = frame_interval.tick() => {
                    let outbound = self.engine.tick();
                    self.queue(outbound);

                    if self.engine.frame() % 600 == 0 && !self.engine.queries().is_empty() {
                        debug!(
                            "Frame {}: {} registrations awaiting a probe reply",
                            self.engine.frame(),
                            self.engine.queries().len()
                        );
                    }
                },
            }
        }

        // The tasks hold socket clones; release them with the loop
        for task in tasks {
            task.abort();
        }

        Ok(())
    }
}
