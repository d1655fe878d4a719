//! WebSocket handshake and the per-socket session loop.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Message, handshake::derive_accept_key, protocol::Role};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Channel, ChannelError, ChannelHandle, ClientMessage, ConnectionRegistry, RealtimeError, ServerMessage};
use crate::error::ApiError;
use crate::http::{Request, Response, StatusCode, Upgraded};
use crate::tasks::UserId;

/// Frames queued per socket before further sends are refused.
const OUTBOUND_BUFFER: usize = 32;

const SUPPORTED_VERSION: &str = "13";

/// Push channel backed by a socket session's outbound queue.
struct SocketChannel {
    tx: mpsc::Sender<String>,
    // Cancelled when the server ends the session, e.g. after account deletion.
    shutdown: CancellationToken,
}

impl Channel for SocketChannel {
    fn is_open(&self) -> bool {
        !self.tx.is_closed() && !self.shutdown.is_cancelled()
    }

    fn send(&self, text: String) -> Result<(), ChannelError> {
        self.tx.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::Full,
            TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    fn close(&self) {
        self.shutdown.cancel();
    }
}

fn accept_key(request: &Request) -> Result<String, RealtimeError> {
    let version = request.headers().get("sec-websocket-version").map(str::trim);
    if version != Some(SUPPORTED_VERSION) {
        return Err(RealtimeError::Handshake("unsupported Sec-WebSocket-Version"));
    }
    let key = request
        .headers()
        .get("sec-websocket-key")
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(RealtimeError::Handshake("missing Sec-WebSocket-Key"))?;
    Ok(derive_accept_key(key.as_bytes()))
}

/// Answers a WebSocket opening handshake for an authenticated `user`.
///
/// The caller must have checked the session already; this only validates the
/// handshake headers. The returned `101` carries a hook that registers the
/// socket under `user` once the server hands the connection over.
pub fn upgrade(
    request: &Request,
    user: UserId,
    registry: Arc<ConnectionRegistry>,
) -> Result<Response, ApiError> {
    if !request.is_websocket_upgrade() {
        return Err(ApiError::UpgradeRequired);
    }
    let accept = accept_key(request)?;

    Ok(Response::new(StatusCode::SwitchingProtocols)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Accept", accept)
        .on_upgrade(move |upgraded| run_session(upgraded, user, registry)))
}

async fn run_session(upgraded: Upgraded, user: UserId, registry: Arc<ConnectionRegistry>) {
    let Upgraded { stream, prefix } = upgraded;
    let socket = if prefix.is_empty() {
        WebSocketStream::from_raw_socket(stream, Role::Server, None).await
    } else {
        WebSocketStream::from_partially_read(stream, prefix.to_vec(), Role::Server, None).await
    };
    let (mut write, mut read) = socket.split();

    let (tx, mut outbound) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let shutdown = CancellationToken::new();
    let channel: ChannelHandle = Arc::new(SocketChannel {
        tx,
        shutdown: shutdown.clone(),
    });
    registry.register(user.clone(), Arc::clone(&channel)).await;
    info!(user_id = %user, "push channel opened");

    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(ClientMessage::Ping) = serde_json::from_str::<ClientMessage>(&text) {
                        let Ok(pong) = ServerMessage::Pong.to_text() else { continue };
                        if let Err(e) = write.send(Message::Text(pong)).await {
                            debug!(user_id = %user, error = %e, "failed to send pong");
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(user_id = %user, error = %e, "socket read failed");
                    break;
                }
                // Binary and control frames; tungstenite answers pings itself.
                Some(Ok(_)) => {}
            },
            Some(text) = outbound.recv() => {
                if let Err(e) = write.send(Message::Text(text)).await {
                    debug!(user_id = %user, error = %e, "socket write failed");
                    break;
                }
            }
            _ = shutdown.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(user_id = %user, error = %e, "failed to send close frame");
                }
                break;
            }
        }
    }

    outbound.close();
    registry.unregister(&user, &channel).await;
    info!(user_id = %user, "push channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake(extra: &str) -> Request {
        let raw = format!(
            "GET /ws HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive, Upgrade\r\n\
             Upgrade: websocket\r\n{extra}\r\n"
        );
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn accepts_rfc_sample_key() {
        let request = handshake(
            "Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n",
        );
        let res = upgrade(&request, UserId::from("ada"), Arc::new(ConnectionRegistry::new())).unwrap();
        assert_eq!(res.status(), StatusCode::SwitchingProtocols);
        assert_eq!(
            res.headers().get("sec-websocket-accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
    }

    #[test]
    fn rejects_bad_handshakes() {
        let registry = Arc::new(ConnectionRegistry::new());

        let missing_key = handshake("Sec-WebSocket-Version: 13\r\n");
        let err = upgrade(&missing_key, UserId::from("ada"), Arc::clone(&registry)).unwrap_err();
        assert_eq!(err.status(), StatusCode::BadRequest);

        let plain = Request::parse(b"GET /ws HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap().0;
        let err = upgrade(&plain, UserId::from("ada"), registry).unwrap_err();
        assert_eq!(err.status(), StatusCode::UpgradeRequired);
    }

    #[tokio::test]
    async fn socket_channel_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        let channel = SocketChannel {
            tx,
            shutdown: CancellationToken::new(),
        };
        assert!(channel.is_open());
        assert_eq!(channel.send("a".into()), Ok(()));
        assert_eq!(channel.send("b".into()), Err(ChannelError::Full));
        drop(rx);
        assert!(!channel.is_open());
        assert_eq!(channel.send("c".into()), Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn closing_a_socket_channel_signals_its_session() {
        let (tx, _rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let channel = SocketChannel {
            tx,
            shutdown: shutdown.clone(),
        };
        channel.close();
        assert!(!channel.is_open());
        assert!(shutdown.is_cancelled());
    }
}
