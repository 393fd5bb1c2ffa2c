//! Sharetree CLI
//!
//! Command-line tools for inspecting and exercising Sharetree replication.
//!
//! # Commands
//!
//! - `decode` - Decode a hex-encoded operation or peer message
//! - `simulate` - Run a hub and several clients on tokio tasks, editing
//!   concurrently, and check that they converge

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Sharetree command-line tools.
#[derive(Parser)]
#[command(name = "sharetree")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a hex-encoded operation
    Decode {
        /// Hex bytes (whitespace is ignored)
        hex: String,

        /// Decode a whole peer message instead of a single operation
        #[arg(short, long)]
        message: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Simulate a replicated session
    Simulate {
        /// Number of client peers connected to the hub
        #[arg(short, long, default_value = "3")]
        clients: usize,

        /// Random edits made by each client
        #[arg(short, long, default_value = "50")]
        edits: usize,

        /// Seed for the edit generator
        #[arg(short, long, default_value = "1")]
        seed: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Decode {
            hex,
            message,
            format,
        } => {
            commands::decode::run(&hex, message, &format)?;
        }
        Commands::Simulate {
            clients,
            edits,
            seed,
            format,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::simulate::run(clients, edits, seed, &format))?;
        }
        Commands::Version => {
            println!("Sharetree CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Protocol v{}", sharetree_protocol::PROTOCOL_VERSION);
        }
    }

    Ok(())
}
