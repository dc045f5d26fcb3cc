use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ide-supervisor")]
#[command(about = "Watches an AI-assisted IDE and nudges it along when it stalls", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Settings file (JSON). Missing file means defaults.
    #[arg(long, global = true, default_value = "supervisor.json")]
    pub config: PathBuf,

    /// SQLite file holding the supervisor checkpoint
    #[arg(long, global = true, default_value = "supervisor.sqlite3")]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the supervision loop until Ctrl-C or a halt
    Run {
        /// Text file kept up to date by the external OCR process
        #[arg(long)]
        capture_file: PathBuf,

        /// JSON-lines file the external injector reads instructions from
        #[arg(long)]
        outbox: PathBuf,

        /// Describe the project being built; saved to the settings file
        #[arg(long)]
        project: Option<String>,
    },

    /// Classify a piece of screen text and print the result as JSON
    Classify {
        text: String,
    },

    /// Print the persisted supervisor state as JSON
    State,

    /// Clear a persisted halt so `run` may start again
    ResetHalt,
}
