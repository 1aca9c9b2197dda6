//! CLI interface for altcycle
//!
//! Provides subcommands for:
//! - `run`: Start the paper trading loop
//! - `status`: Show the risk subsystem status for the loaded configuration
//! - `config`: Show configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "altcycle")]
#[command(about = "Altcoin rotation trading bot with layered risk management")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start paper trading
    Run(RunArgs),
    /// Show the risk subsystem status
    Status,
    /// Show configuration
    Config,
}
