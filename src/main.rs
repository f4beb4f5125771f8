mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use edgelog::config::Config;
use edgelog::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    observability::init_tracing();

    let cli = Cli::parse();
    let config = Config::load_with(cli.config)?;

    match cli.command {
        Commands::Ingest(args) => commands::ingest(config, args).await?,
        Commands::Export(args) => commands::export(config, args)?,
        Commands::Stats => commands::stats(config)?,
    }

    Ok(())
}
