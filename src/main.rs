//! tabframe - command-line entry point

use clap::Parser;
use tabframe::cli::{cmd_config, cmd_encode, cmd_stats, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabframe=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stats { rows, seed, task } => {
            cmd_stats(rows, seed, &task)?;
        }
        Commands::Encode { rows, seed, channels, batch_size, task, config, shuffle } => {
            cmd_encode(rows, seed, channels, batch_size, &task, config.as_deref(), shuffle)?;
        }
        Commands::Config => {
            cmd_config()?;
        }
    }

    Ok(())
}
