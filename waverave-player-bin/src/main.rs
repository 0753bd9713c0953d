mod config;
mod info;
mod os_signal;
mod play;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Play(play::Cmd),
    Info(info::Cmd),
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // Logs go to stderr, as stdout may be carrying samples.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("waverave_player=info,waverave_player_bin=info")),
        )
        .init();

    let args = Cli::parse();
    match args.command {
        Commands::Play(c) => c.cmd().await,
        Commands::Info(c) => c.cmd(),
    }
}
