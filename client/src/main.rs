use clap::Parser;
use client::network::{authority_address, Client};
use log::info;
use shared::{Difficulty, GameConfig, InputManager};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Authority to join, as host or host:port
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    server: String,

    /// Name shown to the other players
    #[arg(short, long, default_value = "player")]
    name: String,

    /// Let the AI play for you
    #[arg(short, long)]
    autopilot: bool,

    /// Autopilot difficulty: easy, medium or hard
    #[arg(short, long, default_value = "medium")]
    difficulty: Difficulty,

    /// Print the board once per second
    #[arg(short = 'b', long)]
    show_board: bool,

    /// JSON settings file; must match the authority's timings
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = match &args.settings {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    let server = authority_address(&args.server);

    let input = if args.autopilot {
        info!("Autopilot on ({})", args.difficulty);
        InputManager::autopilot(args.difficulty, rand::random())
    } else {
        info!("Commands: w/a/s/d to travel, x to stop, f to fire, q to quit");
        InputManager::keyboard()
    };

    let mut client = Client::new(&server, &args.name, config, input).await?;
    client.set_show_board(args.show_board);

    tokio::select! {
        result = client.run() => return result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, leaving the session");
        }
    }

    client.shutdown().await;
    Ok(())
}
