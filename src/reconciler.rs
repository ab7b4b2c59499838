//! Full rescan of running containers into the hosts file.
//!
//! Every run lists all running containers, unions their declared hostnames
//! and rewrites the managed region once with the complete set.  There is no
//! incremental update, so however many events fire and in whatever order,
//! the file ends up matching what the last run observed.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::Result;
use crate::hosts_file::HostsFile;
use crate::labels::LabelExtractor;
use crate::runtime::Connection;
use crate::types::{short_id, HostnameSet};

/// What a successful [`Reconciler::run`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The runtime is flagged unavailable; the file was not touched.
    Skipped,
    /// The managed region now holds exactly this set.
    Applied(HostnameSet),
}

pub struct Reconciler {
    connection: Arc<Connection>,
    hosts: Arc<HostsFile>,
    extractor: LabelExtractor,
}

impl Reconciler {
    pub fn new(
        connection: Arc<Connection>,
        hosts: Arc<HostsFile>,
        extractor: LabelExtractor,
    ) -> Self {
        Self {
            connection,
            hosts,
            extractor,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn hosts_file(&self) -> &Arc<HostsFile> {
        &self.hosts
    }

    /// Recomputes the hostname set from the runtime and applies it.
    ///
    /// # Errors
    ///
    /// A listing failure returns before the file is opened, leaving the
    /// previous managed region in place.  Write failures from
    /// [`HostsFile::resync`] are returned as is.
    pub async fn run(&self) -> Result<Reconciliation> {
        if !self.connection.is_connected() {
            warn!("Skipping scan: not connected to Docker");
            return Ok(Reconciliation::Skipped);
        }

        info!("Scanning running containers");
        let containers = self.connection.runtime().list_running().await?;
        info!("Found {} running containers", containers.len());

        let mut all_hosts = HostnameSet::new();
        for container in &containers {
            let hosts = self.extractor.extract(&container.labels);
            if !hosts.is_empty() {
                debug!(
                    "{} ({}) declares {}",
                    container.display_name(),
                    short_id(&container.id),
                    hosts
                );
            }
            all_hosts.union_with(hosts);
        }

        let file = Arc::clone(&self.hosts);
        let target = all_hosts.clone();
        tokio::task::spawn_blocking(move || file.resync(&target)).await??;

        info!("Scan complete: {} hosts managed", all_hosts.len());
        Ok(Reconciliation::Applied(all_hosts))
    }
}
