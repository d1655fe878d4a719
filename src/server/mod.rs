//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler function.
//! Supports HTTP/1.1 persistent connections (keep-alive), graceful shutdown, and
//! handing a connection over to an upgrade hook after a `101` response.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode, Upgraded,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (1 MiB).
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The taskbell HTTP server.
///
/// Binds to a TCP address and dispatches incoming HTTP/1.1 requests to a
/// handler function.
///
/// # Examples
///
/// ```rust,no_run
/// use taskbell::server::Server;
/// use taskbell::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:4000").await?;
///     server
///         .run_until(
///             |_req: Request| async { Response::new(StatusCode::Ok).body("ok") },
///             async { let _ = tokio::signal::ctrl_c().await; },
///         )
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections and dispatches requests to `handler` until `shutdown`
    /// resolves.
    ///
    /// The handler is wrapped in an [`Arc`] and shared across all spawned Tokio
    /// tasks, so it must be `Send + Sync + 'static`. Connections already in
    /// flight are not interrupted when the accept loop stops.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; accept failures are logged and skipped.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()> + Send,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "taskbell listening");

        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }

        Ok(())
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection, signals
/// `Connection: close`, or the response upgrades the connection.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        // A pipelined request may already be fully buffered.
        if buf.is_empty() {
            let bytes_read = stream.read_buf(&mut buf).await?;
            if bytes_read == 0 {
                debug!(peer = %peer_addr, "connection closed by peer");
                break;
            }
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                if stream.read_buf(&mut buf).await? == 0 {
                    break;
                }
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let total_needed = body_offset + request.content_length().unwrap_or(0);
        if total_needed > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, total_needed, "declared body too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }
        if buf.len() < total_needed {
            if stream.read_buf(&mut buf).await? == 0 {
                break;
            }
            continue;
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let mut response = handler(request).await;
        let upgrade = response.take_upgrade();
        let upgrading = upgrade.is_some() && response.status() == StatusCode::SwitchingProtocols;

        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);

        if upgrading {
            if let Some(hook) = upgrade {
                debug!(peer = %peer_addr, "connection upgraded");
                hook(Upgraded { stream, prefix: buf }).await;
            }
            return Ok(());
        }

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}
