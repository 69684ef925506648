//! WebSocket link to the signaling server.

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use callhub_core::error::{AppError, ErrorKind};
use callhub_core::result::AppResult;
use callhub_core::signal::{ClientEvent, ServerEvent};
use callhub_core::types::{MediaAddress, UserId};

use crate::agent::CallHandle;

/// Maps a WebSocket failure into the workspace error type.
pub fn transport_error(err: tungstenite::Error) -> AppError {
    AppError::with_source(ErrorKind::Transport, format!("WebSocket error: {err}"), err)
}

/// What to publish with `register` right after connecting.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Our user id (must match the token's subject).
    pub user_id: UserId,
    /// Address the media library assigned to this client.
    pub media_address: MediaAddress,
}

/// Connects to the signaling server.
#[derive(Debug, Clone)]
pub struct SignalingClient {
    url: String,
    token: String,
}

impl SignalingClient {
    /// `url` is the `/ws` endpoint, `token` the identity token.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }

    /// URL including the token query parameter.
    pub fn endpoint(&self) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.url, sep, self.token)
    }

    /// Opens the socket, sends `register`, and spawns the link task.
    ///
    /// Frames from `outbound` are written to the socket. Call signals are
    /// fed into `calls`; every decoded frame is also published to
    /// [`SignalingConnection::subscribe`]. Pings are answered here.
    pub async fn connect(
        &self,
        registration: Registration,
        calls: Option<CallHandle>,
        outbound: mpsc::UnboundedReceiver<ClientEvent>,
    ) -> AppResult<SignalingConnection> {
        let (ws, _response) = tokio_tungstenite::connect_async(self.endpoint())
            .await
            .map_err(transport_error)?;
        info!(url = %self.url, user_id = %registration.user_id, "Signaling connected");

        let (frames, _) = broadcast::channel(64);
        let shutdown = CancellationToken::new();
        let finished = CancellationToken::new();

        let link = Link {
            frames: frames.clone(),
            calls,
            shutdown: shutdown.clone(),
        };
        let done = finished.clone().drop_guard();
        let task = tokio::spawn(async move {
            let _done = done;
            link.run(ws, registration, outbound).await
        });

        Ok(SignalingConnection {
            frames,
            shutdown,
            finished,
            task,
        })
    }
}

/// A live signaling link.
#[derive(Debug)]
pub struct SignalingConnection {
    frames: broadcast::Sender<ServerEvent>,
    shutdown: CancellationToken,
    finished: CancellationToken,
    task: JoinHandle<AppResult<()>>,
}

impl SignalingConnection {
    /// Every frame received from the server.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.frames.subscribe()
    }

    /// Ask the link to close the socket.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once the link task has stopped, for whatever reason.
    pub async fn finished(&self) {
        self.finished.cancelled().await
    }

    /// Wait for the link to end.
    pub async fn join(self) -> AppResult<()> {
        self.task
            .await
            .map_err(|e| AppError::internal(format!("Signaling task failed: {e}")))?
    }
}

struct Link {
    frames: broadcast::Sender<ServerEvent>,
    calls: Option<CallHandle>,
    shutdown: CancellationToken,
}

impl Link {
    async fn run<S>(
        self,
        ws: S,
        registration: Registration,
        mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    ) -> AppResult<()>
    where
        S: futures::Stream<Item = Result<Message, tungstenite::Error>>
            + futures::Sink<Message, Error = tungstenite::Error>
            + Unpin,
    {
        let (mut sink, mut stream) = ws.split();

        send_event(
            &mut sink,
            &ClientEvent::Register {
                user_id: registration.user_id,
                media_address: registration.media_address,
            },
        )
        .await?;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                out = outbound.recv() => match out {
                    Some(event) => send_event(&mut sink, &event).await?,
                    None => {
                        debug!("Outbound queue closed, ending link");
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = self.on_text(text.as_str()) {
                            send_event(&mut sink, &reply).await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Signaling server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(transport_error(e)),
                },
            }
        }

        Ok(())
    }

    /// Routes one text frame. Returns a reply to send, if any.
    fn on_text(&self, text: &str) -> Option<ClientEvent> {
        let event = match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Undecodable frame from server");
                return None;
            }
        };
        let _ = self.frames.send(event.clone());

        match event {
            ServerEvent::Ping { timestamp } => Some(ClientEvent::Pong { timestamp }),
            ServerEvent::IncomingCall { .. }
            | ServerEvent::CallAccepted { .. }
            | ServerEvent::CallEnded {} => {
                if let Some(calls) = &self.calls {
                    if let Err(e) = calls.deliver_signal(event) {
                        warn!(error = %e, "Call signal not delivered");
                    }
                }
                None
            }
            ServerEvent::Error { code, message } => {
                warn!(code = %code, message = %message, "Server reported an error");
                None
            }
            ServerEvent::UserTyping { .. } => None,
        }
    }
}

async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> AppResult<()>
where
    S: futures::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(event)?;
    sink.send(Message::text(text)).await.map_err(transport_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> (Link, broadcast::Receiver<ServerEvent>) {
        let (frames, rx) = broadcast::channel(8);
        (
            Link {
                frames,
                calls: None,
                shutdown: CancellationToken::new(),
            },
            rx,
        )
    }

    #[test]
    fn test_endpoint_appends_token() {
        let client = SignalingClient::new("ws://localhost:3000/ws", "abc");
        assert_eq!(client.endpoint(), "ws://localhost:3000/ws?token=abc");

        let client = SignalingClient::new("ws://localhost:3000/ws?v=1", "abc");
        assert_eq!(client.endpoint(), "ws://localhost:3000/ws?v=1&token=abc");
    }

    #[test]
    fn test_ping_is_answered_with_pong() {
        let (link, mut rx) = link();
        let reply = link.on_text(r#"{"event":"ping","data":{"timestamp":42}}"#);
        assert_eq!(reply, Some(ClientEvent::Pong { timestamp: 42 }));
        assert_eq!(rx.try_recv().ok(), Some(ServerEvent::Ping { timestamp: 42 }));
    }

    #[test]
    fn test_garbage_frame_is_ignored() {
        let (link, mut rx) = link();
        assert_eq!(link.on_text("not json"), None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_transport_error_kind() {
        let err = transport_error(tungstenite::Error::ConnectionClosed);
        assert_eq!(err.kind, ErrorKind::Transport);
    }
}
