//! Operations behind the HTTP control surface.
//!
//! These never fail: read paths fall back to an empty set and refresh
//! errors are logged, so the caller always gets a best-effort answer.

use std::sync::Arc;

use log::error;

use crate::error::log_scan_failure;
use crate::hosts_file::HostsFile;
use crate::reconciler::Reconciler;
use crate::runtime::{Connection, Health};
use crate::types::HostnameSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub connected: bool,
}

#[derive(Clone)]
pub struct Controller {
    connection: Arc<Connection>,
    hosts: Arc<HostsFile>,
    reconciler: Arc<Reconciler>,
}

impl Controller {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            connection: Arc::clone(reconciler.connection()),
            hosts: Arc::clone(reconciler.hosts_file()),
            reconciler,
        }
    }

    /// Cached connection flag from startup (or the last reconnect).
    pub fn status(&self) -> Status {
        Status {
            connected: self.connection.is_connected(),
        }
    }

    pub async fn health(&self) -> Health {
        self.connection.health().await
    }

    /// Hostnames currently in the managed region.
    pub async fn list_managed_hosts(&self) -> HostnameSet {
        let hosts = Arc::clone(&self.hosts);
        match tokio::task::spawn_blocking(move || hosts.read_current()).await {
            Ok(Ok(set)) => set,
            Ok(Err(e)) => {
                error!("Failed to read {}: {}", self.hosts.path().display(), e);
                HostnameSet::new()
            }
            Err(e) => {
                error!("Hosts file read task failed: {}", e);
                HostnameSet::new()
            }
        }
    }

    /// Runs a scan now and returns what the file holds afterwards.
    ///
    /// If the scan is skipped or fails, this is the previously written set.
    pub async fn force_refresh(&self) -> HostnameSet {
        if let Err(e) = self.reconciler.run().await {
            log_scan_failure("Forced scan", &e);
        }
        self.list_managed_hosts().await
    }
}
