//! Keeps a hosts file in sync with the hostnames running Docker containers
//! declare through Traefik router labels.
//!
//! ```text
//! Docker events ──► Watcher ──► Reconciler::run()
//!                                  │  list running containers
//!                                  │  LabelExtractor per container, union
//!                                  ▼
//!                              HostsFile::resync(set)
//! ```
//!
//! The HTTP control surface in [`api`] reuses the same reconciler and hosts
//! file through [`control::Controller`].

pub mod api;
pub mod config;
pub mod control;
pub mod error;
pub mod hosts_file;
pub mod labels;
pub mod reconciler;
pub mod runtime;
pub mod types;
pub mod watcher;

pub use error::{Error, Result};
pub use hosts_file::HostsFile;
pub use labels::{extract_hostnames, LabelExtractor};
pub use reconciler::{Reconciler, Reconciliation};
pub use runtime::{Connection, ContainerRuntime, DockerRuntime, Health};
pub use types::HostnameSet;
pub use watcher::{ReconnectPolicy, Watcher};
