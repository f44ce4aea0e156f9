use clap::{Parser, Subcommand};
use client::MasterClient;
use log::info;
use shared::{ServerListType, NETWORK_MASTER_SERVER_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Master server address
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", NETWORK_MASTER_SERVER_PORT))]
    server: String,

    /// Local address to bind; for `register` this is the game server endpoint
    #[arg(short = 'b', long, default_value = "0.0.0.0:0")]
    bind: String,

    /// Seconds to wait for the master server
    #[arg(short = 't', long, default_value = "5")]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a game server and answer the master's probe
    Register {
        /// Advertised port, defaults to the bound port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Remove a game server from the list
    Unregister {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the verified server list
    List {
        /// Request the IPv6 list instead of IPv4
        #[arg(long)]
        ipv6: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let client = MasterClient::new(&args.server, &args.bind, Duration::from_secs(args.timeout)).await?;
    let local_port = client.local_addr()?.port();

    match args.command {
        Command::Register { port } => {
            let port = port.unwrap_or(local_port);
            client.register(port).await?;
            info!("Registered port {} with {}", port, args.server);
        }
        Command::Unregister { port } => {
            client.unregister(port.unwrap_or(local_port)).await?;
        }
        Command::List { ipv6 } => {
            let list_type = ipv6.then_some(ServerListType::Ipv6);
            let list = client.get_server_list(list_type).await?;
            info!("{} {:?} servers", list.servers.len(), list.list_type);
            for server in list.servers {
                println!("{}", server);
            }
        }
    }

    Ok(())
}
