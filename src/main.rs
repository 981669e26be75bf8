//! regstack - Main Entry Point
//!
//! Interactive tune-and-stack run by default, `info` for data inspection.

use clap::Parser;
use regstack::cli::{cmd_info, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regstack=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Info { data }) => {
            cmd_info(&data)?;
        }
        None => {
            cmd_run(&cli.run)?;
        }
    }

    Ok(())
}
