// src/cli/mod.rs — CLI definition (clap derive)

pub mod doctor;
pub mod serve;
pub mod sources;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "surfwatch",
    about = "Live surf-cam analysis supervisor",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Serve the analysis API (default)
    Serve {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List configured sources and their planned relay ports (fallback
    /// ports for non-numeric ids are assigned in start order)
    Sources,
    /// Check that the transcoder and detector are installed
    Doctor,
}
