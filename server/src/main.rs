use clap::Parser;
use log::info;
use server::config::Config;
use server::network::Server;
use server::store::MemoryStore;
use shared::NETWORK_MASTER_SERVER_PORT;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "UDP master server for game server registration")]
struct Args {
    /// IP address to bind both sockets to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port for registrations and server list requests
    #[arg(short, long, default_value_t = NETWORK_MASTER_SERVER_PORT)]
    port: u16,

    /// Port probes are sent from and answered on
    #[arg(short, long, default_value_t = NETWORK_MASTER_SERVER_PORT + 1)]
    query_port: u16,

    /// Length of one frame in milliseconds
    #[arg(long, default_value = "100")]
    frame_ms: u64,

    /// Frames a cached server list stays valid
    #[arg(long, default_value_t = server::config::GAME_SERVER_LIST_AGE)]
    list_age: u64,

    /// Frames to wait for a probe reply before retrying
    #[arg(long, default_value_t = server::config::SERVER_QUERY_TIMEOUT)]
    query_timeout: u64,

    /// Probes sent before a registration is dropped
    #[arg(long, default_value_t = server::config::SERVER_QUERY_ATTEMPTS)]
    query_attempts: u32,

    /// Size ceiling for server list packets
    #[arg(long, default_value_t = server::config::SAFE_MTU)]
    safe_mtu: usize,

    /// Fixed seed for session keys (testing only)
    #[arg(long)]
    session_seed: Option<u64>,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            list_age: self.list_age,
            query_timeout: self.query_timeout,
            query_attempts: self.query_attempts,
            safe_mtu: self.safe_mtu,
            frame_duration: Duration::from_millis(self.frame_ms),
            session_seed: self.session_seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.config();

    info!(
        "Frames of {}ms, probes every {} frames up to {} times, list age {} frames",
        args.frame_ms, config.query_timeout, config.query_attempts, config.list_age
    );

    let master_addr = format!("{}:{}", args.host, args.port);
    let query_addr = format!("{}:{}", args.host, args.query_port);
    let store = Arc::new(MemoryStore::new());

    let mut server = Server::new(&master_addr, &query_addr, config, store).await?;
    let handle = server.handle();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    }

    Ok(())
}
