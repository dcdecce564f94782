//! Shutdown coordination: a broadcast channel every server front-end
//! subscribes to, plus a root [`Cancel`](crate::cancel::Cancel) derived
//! from it so in-flight pipeline executions unwind promptly instead of
//! being abandoned mid-query.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::cancel::Cancel;

/// How long `shutdown` waits for registered components to finish after
/// signalling them, before giving up and returning anyway.
const COMPONENT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type ShutdownFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

struct Component {
    name: String,
    shutdown: Box<dyn FnOnce() -> ShutdownFuture + Send>,
}

/// Coordinates graceful shutdown across every listener and background
/// task in the process.
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<()>,
    root_cancel: Cancel,
    components: tokio::sync::Mutex<Vec<Component>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            root_cancel: Cancel::new(),
            components: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// A receiver server front-ends select against in their accept loop
    /// to stop taking new connections.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// The root cancellation handle. Every in-flight query's `Cancel` is
    /// a child of this one, so it fires for the whole call tree at once.
    pub fn root_cancel(&self) -> &Cancel {
        &self.root_cancel
    }

    /// Registers a component-specific async cleanup to run during
    /// shutdown (closing a connection pool, flushing a cache, etc).
    pub async fn register<F, Fut>(&self, name: impl Into<String>, shutdown: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.components.lock().await.push(Component {
            name: name.into(),
            shutdown: Box::new(move || Box::pin(shutdown())),
        });
    }

    /// Signals shutdown to every subscriber, cancels the root `Cancel`,
    /// and runs registered component cleanups with a bounded timeout
    /// each.
    pub async fn shutdown(&self) {
        info!("initiating graceful shutdown");
        let _ = self.shutdown_tx.send(());
        self.root_cancel.cancel();

        let components = std::mem::take(&mut *self.components.lock().await);
        for component in components {
            let name = component.name.clone();
            match timeout(COMPONENT_SHUTDOWN_TIMEOUT, (component.shutdown)()).await {
                Ok(()) => info!(component = %name, "component shut down"),
                Err(_) => warn!(component = %name, "component shutdown timed out"),
            }
        }
        info!("graceful shutdown complete");
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}
