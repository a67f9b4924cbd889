use clap::Parser;
use log::{error, info};
use server::network::Server;
use shared::{Difficulty, GameConfig, InputManager, DEFAULT_PORT};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Remote peers to wait for before the first round (0-3)
    #[arg(short = 'n', long, default_value = "1")]
    peers: usize,

    /// Name shown for the local character
    #[arg(long, default_value = "host")]
    name: String,

    /// JSON settings file; flags below override it
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Simulation ticks per second
    #[arg(short, long)]
    tick_rate: Option<u32>,

    /// Lives per character per round
    #[arg(short, long)]
    lives: Option<u32>,

    /// AI difficulty: easy, medium or hard
    #[arg(short, long)]
    difficulty: Option<Difficulty>,

    /// Seed for spawns and AI; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Play Pink from this console instead of leaving it to the AI
    #[arg(long)]
    play: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.settings {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }
    if let Some(lives) = args.lives {
        config.lives = lives;
    }
    if let Some(difficulty) = args.difficulty {
        config.difficulty = difficulty;
    }

    let address = format!("{}:{}", args.host, args.port);
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(
        "Starting authority on {} ({} Hz, {} lives, {} AI, seed {})",
        address, config.tick_rate, config.lives, config.difficulty, seed
    );

    let mut server = Server::new(&address, config, args.peers, seed).await?;
    server.set_local_name(&args.name);
    if args.play {
        info!("Playing Pink: w/a/s/d to travel, x to stop, f to fire, q to quit");
        server.set_local_input(InputManager::keyboard());
    }

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Session failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    server.shutdown().await;
    Ok(())
}
