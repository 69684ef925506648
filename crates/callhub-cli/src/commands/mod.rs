//! CLI command definitions and dispatch.

pub mod config;
pub mod listen;
pub mod serve;
pub mod token;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use callhub_core::config::AppConfig;
use callhub_core::error::AppError;

/// CallHub: call signaling relay
#[derive(Debug, Parser)]
#[command(name = "callhub", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (extension optional)
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the signaling server
    Serve(serve::ServeArgs),
    /// Mint a development identity token
    Token(token::TokenArgs),
    /// Configuration management
    Config(config::ConfigArgs),
    /// Connect as a user and print every signaling frame
    Listen(listen::ListenArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Serve(args) => serve::execute(args, &self.config).await,
            Commands::Token(args) => token::execute(args, &self.config, self.format),
            Commands::Config(args) => config::execute(args, &self.config, self.format),
            Commands::Listen(args) => listen::execute(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file plus environment overrides
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load_file(config_path)
}
