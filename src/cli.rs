use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate Arabic text to English
    Translate {
        /// Source text in Arabic
        text: String,
    },

    /// Download any missing or corrupt model artifacts
    Fetch {
        /// Re-download artifacts even if the cached copies are valid
        #[arg(long)]
        force: bool,
    },

    /// Show the model artifacts and their local state
    Status,
}
