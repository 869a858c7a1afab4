// src/main.rs — Surfwatch entry point

use clap::Parser;

use surfwatch::cli::{Cli, Commands};
use surfwatch::infra::config::Config;
use surfwatch::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // RUST_LOG, when set, wins over --log-level
    logger::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Falls back to defaults if no config.toml
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Some(Commands::Sources) => surfwatch::cli::sources::run_sources(&config),
        Some(Commands::Doctor) => surfwatch::cli::doctor::run_doctor(&config),
        Some(Commands::Serve { host, port }) => {
            surfwatch::cli::serve::run_serve(config, host, port).await
        }
        None => surfwatch::cli::serve::run_serve(config, None, None).await,
    }
}
