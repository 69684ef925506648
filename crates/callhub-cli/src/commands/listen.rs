//! Connect as a user and print signaling traffic.

use clap::Args;
use tokio::sync::{broadcast, mpsc};

use crate::output::{self, OutputFormat};
use callhub_auth::JwtEncoder;
use callhub_client::transport::{Registration, SignalingClient};
use callhub_core::error::AppError;
use callhub_core::signal::ClientEvent;
use callhub_core::types::{ChatId, MediaAddress, UserId};

/// Arguments for the listen command
#[derive(Debug, Args)]
pub struct ListenArgs {
    /// User id to register as
    #[arg(short, long)]
    pub user: String,

    /// Media address to publish
    #[arg(short, long, default_value = "cli-listener")]
    pub media_address: String,

    /// Signaling URL (defaults to call.signaling_url)
    #[arg(long)]
    pub url: Option<String>,

    /// Token to present; one is minted from the config secret when absent
    #[arg(short, long)]
    pub token: Option<String>,

    /// Chat rooms to join after connecting
    #[arg(short, long)]
    pub join: Vec<String>,
}

/// Execute the listen command
pub async fn execute(
    args: &ListenArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let user_id = UserId::new(args.user.trim());
    if user_id.is_blank() {
        return Err(AppError::validation("User id must not be empty"));
    }

    let token = match &args.token {
        Some(token) => token.clone(),
        None => JwtEncoder::new(&config.auth).issue(&user_id, user_id.as_str())?,
    };
    let url = args
        .url
        .clone()
        .unwrap_or_else(|| config.call.signaling_url.clone());

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    for chat in &args.join {
        let _ = outbound_tx.send(ClientEvent::JoinChat {
            chat_id: ChatId::new(chat.as_str()),
        });
    }

    tracing::debug!(url = %url, user_id = %user_id, rooms = args.join.len(), "Connecting listener");
    let client = SignalingClient::new(url.as_str(), token);
    let connection = client
        .connect(
            Registration {
                user_id: user_id.clone(),
                media_address: MediaAddress::new(args.media_address.as_str()),
            },
            None,
            outbound_rx,
        )
        .await?;
    let mut frames = connection.subscribe();

    output::print_success(&format!("Listening as '{}' on {}", user_id, url));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                connection.close();
                break;
            }
            _ = connection.finished() => {
                output::print_warning("Signaling connection closed");
                break;
            }
            frame = frames.recv() => match frame {
                Ok(event) => output::print_line(&event, format),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    output::print_warning(&format!("Skipped {} frames", n));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    drop(outbound_tx);
    connection.join().await
}
