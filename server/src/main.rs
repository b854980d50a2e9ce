use arena_server::config::{GameConfig, ServerConfig, UnknownPlayerPolicy};
use arena_server::network::Server;
use arena_shared::{DEFAULT_PORT, TICK_RATE};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = TICK_RATE)]
    tick_rate: u32,

    /// Maximum number of connected players
    #[arg(short, long, default_value = "16")]
    max_players: usize,

    /// Seed for enemy spawn positions
    #[arg(long)]
    seed: Option<u64>,

    /// Create players on their first movement command if they are unknown
    #[arg(long)]
    lazy_join: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let unknown_player_policy = if self.lazy_join {
            UnknownPlayerPolicy::CreateOnMove
        } else {
            UnknownPlayerPolicy::Ignore
        };

        ServerConfig {
            address: format!("{}:{}", self.host, self.port),
            tick_rate: self.tick_rate,
            max_players: self.max_players,
            game: GameConfig {
                unknown_player_policy,
                rng_seed: self.seed,
                ..GameConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();
    info!("Starting arena server on {}", config.address);

    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
