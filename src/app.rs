//! Shared application state and the top-level serve loop.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::background::Scheduler;
use crate::config::Config;
use crate::middleware::{LoggerMiddleware, Pipeline};
use crate::realtime::{ConnectionRegistry, Dispatcher};
use crate::router::Router;
use crate::security::{SessionMiddleware, SessionStore};
use crate::server::{Server, ServerError};
use crate::store::{TaskStore, UserStore};

/// Everything a request handler or the scheduler needs, built once at startup.
pub struct App {
    pub config: Config,
    pub tasks: Arc<dyn TaskStore>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<SessionStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Dispatcher,
}

impl App {
    pub fn new<S>(config: Config, store: Arc<S>) -> Arc<Self>
    where
        S: TaskStore + UserStore + 'static,
    {
        let registry = Arc::new(ConnectionRegistry::new());
        let tasks: Arc<dyn TaskStore> = store.clone();
        let users: Arc<dyn UserStore> = store;
        Arc::new(Self {
            config,
            tasks,
            users,
            sessions: Arc::new(SessionStore::new()),
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
        })
    }

    pub fn router(self: &Arc<Self>) -> Router {
        crate::api::routes(self)
    }

    /// Request logging, then session resolution, then the routes.
    pub fn pipeline(self: &Arc<Self>) -> Pipeline {
        Pipeline::new(self.router())
            .with(LoggerMiddleware)
            .with(SessionMiddleware::new(Arc::clone(&self.sessions)))
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            Arc::clone(&self.tasks),
            self.dispatcher.clone(),
            self.config.sweep_interval(),
            self.config.min_gap(),
        )
    }

    /// Serves HTTP on `server` with the scheduler running alongside, until
    /// `shutdown` resolves. The scheduler is stopped and awaited before
    /// returning.
    pub async fn serve<S>(self: Arc<Self>, server: Server, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let cancel = CancellationToken::new();
        let scheduler = Arc::new(self.scheduler()).spawn(cancel.clone());

        let pipeline = Arc::new(self.pipeline());
        let result = server
            .run_until(
                move |request| {
                    let pipeline = Arc::clone(&pipeline);
                    async move { pipeline.handle(request).await }
                },
                shutdown,
            )
            .await;

        cancel.cancel();
        if let Err(e) = scheduler.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
        info!("taskbell stopped");
        result
    }
}
