//! Mint identity tokens for local testing.

use clap::Args;
use serde::Serialize;

use crate::output::{self, OutputFormat};
use callhub_auth::JwtEncoder;
use callhub_core::error::AppError;
use callhub_core::types::UserId;

/// Arguments for the token command
#[derive(Debug, Args)]
pub struct TokenArgs {
    /// User id placed in the `sub` claim
    #[arg(short, long)]
    pub user: String,

    /// Display name (defaults to the user id)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Lifetime in minutes (defaults to auth.token_ttl_minutes)
    #[arg(long)]
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
struct IssuedToken {
    user_id: UserId,
    username: String,
    token: String,
}

/// Execute the token command
pub fn execute(args: &TokenArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let user_id = UserId::new(args.user.trim());
    if user_id.is_blank() {
        return Err(AppError::validation("User id must not be empty"));
    }
    let username = args.name.clone().unwrap_or_else(|| user_id.to_string());

    let encoder = JwtEncoder::new(&config.auth);
    let token = match args.ttl_minutes {
        Some(minutes) => {
            encoder.issue_with_ttl(&user_id, &username, chrono::Duration::minutes(minutes))?
        }
        None => encoder.issue(&user_id, &username)?,
    };

    match format {
        OutputFormat::Pretty => println!("{}", token),
        OutputFormat::Json => output::print_item(
            &IssuedToken {
                user_id,
                username,
                token,
            },
            format,
        ),
    }
    Ok(())
}
