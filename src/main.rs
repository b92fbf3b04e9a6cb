//! fsmkit - state transition table tool
//!
//! Checks, renders and exercises table descriptions.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use fsmkit_runtime::{Config, ConfigError};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fsmkit")]
#[command(about = "Check, render and run state transition table descriptions")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML). Defaults to $FSMKIT_CONFIG if set.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a description and report diagnostics
    Check {
        /// Description file
        file: PathBuf,
    },

    /// Print the parsed table
    Show {
        /// Description file
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the description in normalised notation
    Render {
        /// Description file
        file: PathBuf,
    },

    /// Print Rust hook stubs for the table
    Stubs {
        /// Description file
        file: PathBuf,

        /// Name of the generated type
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// Hooks that are already implemented
        #[arg(long, value_delimiter = ',')]
        existing: Vec<String>,
    },

    /// Create a subject and post events to it
    Run {
        /// Description file
        file: PathBuf,

        /// Event to post (repeatable, posted in order)
        #[arg(short, long = "event", required = true)]
        events: Vec<String>,

        /// Dispatch through a background queue
        #[arg(short, long)]
        queued: bool,

        /// Subject name (random if not provided)
        #[arg(short, long)]
        name: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match commands::execute(cli.command, config).await {
        Ok(output) => {
            if !output.text.is_empty() {
                println!("{}", output.text.trim_end());
            }
            if !output.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        None => Config::load(),
    }
}
