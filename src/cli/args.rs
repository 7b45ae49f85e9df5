//! CLI argument definitions using clap
//!
//! Commands:
//! - aerobitmap init --config <path>
//! - aerobitmap build --config <path>
//! - aerobitmap insert --config <path>
//! - aerobitmap query --config <path>
//! - aerobitmap inspect --config <path>
//! - aerobitmap recover --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aerobitmap - an on-disk bitmap index
#[derive(Parser, Debug)]
#[command(name = "aerobitmap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty index in the configured data directory
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./aerobitmap.json")]
        config: PathBuf,
    },

    /// Bulk-load rows read as JSON lines, in increasing TID order
    Build {
        /// Path to configuration file
        #[arg(long, default_value = "./aerobitmap.json")]
        config: PathBuf,
    },

    /// Insert rows read as JSON lines, in any order
    Insert {
        /// Path to configuration file
        #[arg(long, default_value = "./aerobitmap.json")]
        config: PathBuf,
    },

    /// Run one query read as a JSON object
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./aerobitmap.json")]
        config: PathBuf,
    },

    /// Print the metapage and every LOV entry
    Inspect {
        /// Path to configuration file
        #[arg(long, default_value = "./aerobitmap.json")]
        config: PathBuf,
    },

    /// Replay the WAL and verify the page file
    Recover {
        /// Path to configuration file
        #[arg(long, default_value = "./aerobitmap.json")]
        config: PathBuf,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Init { .. } => "init",
            Command::Build { .. } => "build",
            Command::Insert { .. } => "insert",
            Command::Query { .. } => "query",
            Command::Inspect { .. } => "inspect",
            Command::Recover { .. } => "recover",
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
