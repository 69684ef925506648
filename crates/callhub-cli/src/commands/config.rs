//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use callhub_core::config::AppConfig;
use callhub_core::error::AppError;

const DEFAULT_SECRET: &str = "change-me-in-production";

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration (secret masked)
    Show,
    /// Validate configuration file
    Validate,
    /// Generate a default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config/generated.toml")]
        output: String,
    },
}

/// Execute config commands
pub fn execute(args: &ConfigArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let mut config = super::load_config(config_path)?;
            config.auth.jwt_secret = "****".to_string();
            output::print_item(&config, format);
        }
        ConfigCommand::Validate => match super::load_config(config_path) {
            Ok(config) => {
                output::print_success(&format!("Configuration '{}' is valid", config_path));
                output::print_kv(
                    "Server",
                    &format!("{}:{}", config.server.host, config.server.port),
                );
                output::print_kv(
                    "Heartbeat",
                    &format!(
                        "every {}s, timeout {}s",
                        config.realtime.ping_interval_seconds, config.realtime.ping_timeout_seconds
                    ),
                );
                output::print_kv(
                    "Ring timeout",
                    &format!("{}s", config.call.ring_timeout_seconds),
                );
                for warning in check(&config) {
                    output::print_warning(&warning);
                }
            }
            Err(e) => {
                output::print_error(&format!("Configuration invalid: {}", e));
                return Err(e);
            }
        },
        ConfigCommand::Generate { output: out_path } => {
            let default_config = include_str!("../../../../config/default.toml");

            if let Some(parent) = std::path::Path::new(out_path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::internal(format!("Failed to create dir: {}", e)))?;
            }

            std::fs::write(out_path, default_config)
                .map_err(|e| AppError::internal(format!("Failed to write config: {}", e)))?;

            output::print_success(&format!("Default config written to '{}'", out_path));
        }
    }

    Ok(())
}

/// Settings that load fine but are unlikely to be intended.
fn check(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.auth.jwt_secret == DEFAULT_SECRET {
        warnings.push("auth.jwt_secret is the built-in development secret".to_string());
    }
    if config.realtime.ping_interval_seconds == 0 {
        warnings.push("realtime.ping_interval_seconds is 0; heartbeat is disabled".to_string());
    }
    if config.call.ring_timeout_seconds == 0 {
        warnings.push("call.ring_timeout_seconds is 0; calls end immediately".to_string());
    }
    if config.server.cors.allowed_origins.iter().any(|o| o == "*")
        && config.server.cors.allow_credentials
    {
        warnings.push("CORS credentials are ignored with a wildcard origin".to_string());
    }
    warnings
}
