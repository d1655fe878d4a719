//! # taskbell
//!
//! A personal task tracker: one-off and recurring tasks over a small JSON API,
//! with due-task reminders pushed to the browser over WebSocket.
//!
//! The HTTP layer is a from-scratch async HTTP/1.1 server (tokio + httparse).
//! On top of it sit the task API ([`api`]), the due-task evaluator ([`due`]),
//! the push channels ([`realtime`]) and the periodic sweep that ties them
//! together ([`background`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskbell::{App, Config, MemoryStore, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let server = Server::bind(config.bind_addr()).await?;
//!     let app = App::new(config, Arc::new(MemoryStore::new()));
//!     app.serve(server, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod http;
pub mod server;

pub mod context;
pub mod middleware;
pub mod router;
pub mod security;

pub mod config;
pub mod error;

pub mod due;
pub mod store;
pub mod tasks;

pub mod background;
pub mod realtime;

pub mod api;
pub mod app;

pub use app::App;
pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
pub use store::MemoryStore;
