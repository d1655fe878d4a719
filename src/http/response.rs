//! HTTP/1.1 response builder.
//!
//! Provides a fluent builder API for constructing HTTP responses and
//! serializing them to a byte buffer for transmission over TCP. A response may
//! also carry an upgrade hook: once the server has written it, the hook takes
//! over the raw connection (used for the WebSocket push channel).

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tokio::net::TcpStream;

use super::{Headers, StatusCode};

/// The raw connection handed to an upgrade hook after the `101` response.
///
/// `prefix` holds bytes the client sent right behind the handshake request
/// that were already read off the socket; they belong to the new protocol.
#[derive(Debug)]
pub struct Upgraded {
    pub stream: TcpStream,
    pub prefix: BytesMut,
}

type UpgradeFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type OnUpgrade = Box<dyn FnOnce(Upgraded) -> UpgradeFuture + Send>;

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use taskbell::http::{Response, StatusCode};
///
/// let response = Response::json(StatusCode::Ok, &serde_json::json!({ "status": "ok" }));
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Type: application/json\r\n"));
/// ```
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
    on_upgrade: Option<OnUpgrade>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
            on_upgrade: None,
        }
    }

    /// Creates a response with `value` serialized as its JSON body.
    ///
    /// Serialization of the crate's own payload types cannot fail in practice;
    /// if it does, a bare `500` is returned instead.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header("Content-Type", "application/json")
                .body_bytes(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response body");
                Self::new(StatusCode::InternalServerError)
            }
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place. Intended for middleware pipelines that receive
    /// a `Response` from downstream and need to decorate it without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body from a string.
    ///
    /// The `Content-Length` header is written automatically by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Attaches a hook that receives the raw connection once this response has
    /// been written. Only meaningful on a `101 Switching Protocols` response.
    #[must_use]
    pub fn on_upgrade<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(Upgraded) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_upgrade = Some(Box::new(move |upgraded| Box::pin(hook(upgraded))));
        self
    }

    /// Removes and returns the upgrade hook, if any.
    pub(crate) fn take_upgrade(&mut self) -> Option<OnUpgrade> {
        self.on_upgrade.take()
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response body.
    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Content-Length: <n>`, except on `101` responses.
    /// - `Connection: keep-alive` or `Connection: close`, unless a `Connection`
    ///   header was already set (upgrades set `Connection: Upgrade`).
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        if !self.headers.contains("connection") {
            let connection = if self.keep_alive {
                "keep-alive"
            } else {
                "close"
            };
            self.headers.insert("Connection", connection);
        }

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        if self.status != StatusCode::SwitchingProtocols {
            buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        }

        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_slice());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("keep_alive", &self.keep_alive)
            .field("upgrade", &self.on_upgrade.is_some())
            .finish()
    }
}
