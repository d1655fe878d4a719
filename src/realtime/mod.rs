//! Push channels for due-task notifications.
//!
//! A signed-in browser opens `GET /ws`; once upgraded, the socket is wrapped
//! in a [`Channel`] and registered under the user's id in the
//! [`ConnectionRegistry`]. The [`Dispatcher`] fans a [`Notice`] out to every
//! open channel of one user and reports how many received it.
//!
//! ## Wire format
//!
//! Server to client:
//!
//! ```json
//! { "type": "notification", "payload": { "kind": "task_due", ... }, "time": "..." }
//! { "type": "pong" }
//! ```
//!
//! Client to server: `{ "type": "ping" }`. Anything else is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tasks::TaskId;

pub mod dispatch;
pub mod registry;
pub mod socket;

pub use dispatch::Dispatcher;
pub use registry::{ChannelHandle, ConnectionRegistry};
pub use socket::upgrade;

/// Why a single send on a channel did not go through.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,

    #[error("channel send buffer is full")]
    Full,
}

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("websocket handshake rejected: {0}")]
    Handshake(&'static str),
}

/// One open push connection belonging to one user.
///
/// Sends are non-blocking: an implementation queues the text frame and
/// returns, so a slow client never stalls a dispatch.
pub trait Channel: Send + Sync {
    fn is_open(&self) -> bool;

    fn send(&self, text: String) -> Result<(), ChannelError>;

    /// Asks the channel's owner to end the connection. Idempotent.
    fn close(&self);
}

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    TaskDue {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        title: String,
        message: String,
    },
    Test {
        message: String,
    },
}

impl Notice {
    pub fn task_due(task_id: TaskId, title: &str) -> Self {
        Notice::TaskDue {
            task_id,
            title: title.to_owned(),
            message: format!("\"{title}\" is due"),
        }
    }
}

/// Messages the server writes to a socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Notification { payload: Notice, time: DateTime<Utc> },
    Pong,
}

impl ServerMessage {
    pub fn to_text(&self) -> Result<String, RealtimeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages a client may send. Unknown shapes fail to parse and are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}
