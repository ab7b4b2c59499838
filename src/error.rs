//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the extractor, patcher, reconciler and runtime seam.
///
/// None of these are fatal to the daemon.  Each caller decides whether to log
/// and carry on (the watcher, the HTTP handlers) or to propagate.
#[derive(Debug, Error)]
pub enum Error {
    /// The container runtime could not be reached.
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// A Docker API request failed.
    #[error("docker request failed: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// The event subscription failed or ended.
    #[error("event stream failed: {0}")]
    Stream(String),

    /// The hosts file could not be written because of its permissions.
    #[error("permission denied writing {}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure on the hosts file.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A blocking file task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Wraps an I/O error on `path`, singling out `PermissionDenied`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path, source }
        } else {
            Self::Io { path, source }
        }
    }

    /// Returns `true` for [`Error::PermissionDenied`].
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// What the operator can do about this error, if anything.
    pub fn hint(&self) -> Option<&'static str> {
        if self.is_permission_denied() {
            Some("Check the container's permissions and that the hosts file is mounted writable")
        } else {
            None
        }
    }
}

/// Logs a failed scan together with its operator hint.
pub fn log_scan_failure(context: &str, err: &Error) {
    log::error!("{} failed: {}", context, err);
    if let Some(hint) = err.hint() {
        log::error!("{}", hint);
    }
}
