//! Container runtime seam.
//!
//! [`ContainerRuntime`] is the narrow interface the reconciler and watcher
//! need from Docker.  [`Connection`] wraps one runtime for the whole process
//! together with the "did we ever connect" flag the health check reports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use log::{error, info, warn};

use crate::error::Result;
use crate::types::{ContainerRecord, EventFilter, RuntimeEvent};

pub mod docker;
pub use docker::DockerRuntime;

/// Lifecycle events from the runtime. Infinite while healthy; once it yields
/// an error or ends it cannot be resumed.
pub type EventStream = BoxStream<'static, Result<RuntimeEvent>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Checks that the runtime answers.
    async fn ping(&self) -> Result<()>;

    /// All currently running containers.
    async fn list_running(&self) -> Result<Vec<ContainerRecord>>;

    /// Subscribes to lifecycle events matching `filter`.
    fn subscribe(&self, filter: &EventFilter) -> EventStream;
}

/// Result of a live health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    Ok,
    Unavailable(String),
}

/// The process-wide runtime handle.
///
/// Built once at startup and shared read-only; only the connected flag
/// changes afterwards, and only the watcher changes it.
pub struct Connection {
    runtime: Arc<dyn ContainerRuntime>,
    connected: AtomicBool,
}

impl Connection {
    /// Pings `runtime` once and records whether it answered.
    pub async fn establish(runtime: Arc<dyn ContainerRuntime>) -> Self {
        let connected = match runtime.ping().await {
            Ok(()) => {
                info!("Connected to Docker daemon");
                true
            }
            Err(e) => {
                error!("Cannot connect to Docker daemon: {}", e);
                error!("Check that /var/run/docker.sock is mounted into this container");
                false
            }
        };
        Self::with_state(runtime, connected)
    }

    /// Wraps `runtime` with a known state, skipping the initial ping.
    pub fn with_state(runtime: Arc<dyn ContainerRuntime>, connected: bool) -> Self {
        Self {
            runtime,
            connected: AtomicBool::new(connected),
        }
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn mark_connected(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            info!("Docker connection restored");
        }
    }

    pub fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!("Docker connection marked unavailable");
        }
    }

    /// Re-checks the live connection rather than trusting the cached flag.
    ///
    /// A runtime that never connected is reported without pinging it.
    pub async fn health(&self) -> Health {
        if !self.is_connected() {
            return Health::Unavailable("Cannot connect to Docker daemon".to_string());
        }
        match self.runtime.ping().await {
            Ok(()) => Health::Ok,
            Err(e) => {
                warn!("Health check ping failed: {}", e);
                Health::Unavailable("Lost connection to Docker daemon".to_string())
            }
        }
    }
}
