//! Managed region of a shared hosts file.
//!
//! The file is split into whatever other writers put there and a single
//! block this crate owns:
//!
//! ```text
//! 10.0.0.5 printer.local
//! # BEGIN DYNAMIC HOSTS
//! 127.0.0.1       a.example.local
//! 127.0.0.1       b.example.local
//! # END DYNAMIC HOSTS
//! ```
//!
//! Lines outside `BEGIN`/`END` are copied verbatim on every rewrite.  Every
//! span found while scanning is dropped and exactly one fresh region is
//! appended, so stray duplicate markers collapse into one pair.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::HostnameSet;

pub const MARKER_BEGIN: &str = "# BEGIN DYNAMIC HOSTS";
pub const MARKER_END: &str = "# END DYNAMIC HOSTS";
pub const LOOPBACK: &str = "127.0.0.1";
pub const EMPTY_PLACEHOLDER: &str = "# (no dynamic hosts)";

/// Guards every read and rewrite in this process.
///
/// The OS gives no locking here, so this only protects against writers
/// inside this process.
static FILE_LOCK: Mutex<()> = Mutex::new(());

/// Handle to the hosts file at a fixed path.
///
/// Nothing is cached between calls; every operation opens, transforms and
/// closes the file.  The content is handled as bytes, so an operator line
/// in some other encoding never stops a rewrite.
#[derive(Debug, Clone)]
pub struct HostsFile {
    path: PathBuf,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hostnames currently listed in the managed region.
    ///
    /// A missing file is an empty set, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::PermissionDenied`] if the file
    /// exists but cannot be read.
    pub fn read_current(&self) -> Result<HostnameSet> {
        let _guard = FILE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let content = self.read_content()?;
        Ok(parse_managed(&content))
    }

    /// Rewrites the managed region to hold exactly `hosts`.
    ///
    /// Creates the file if it does not exist.  Calling this twice with the
    /// same set leaves byte-identical content.  A symlinked path is written
    /// through, never replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] when the file is not writable and
    /// [`Error::Io`] for any other failure.  The file is left as it was
    /// whenever the atomic path could be used.
    pub fn resync(&self, hosts: &HostnameSet) -> Result<()> {
        let _guard = FILE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        info!(
            "Resyncing {} ({} dynamic hosts)",
            self.path.display(),
            hosts.len()
        );

        let current = self.read_content()?;
        let updated = render(&current, hosts);
        self.write_content(&updated)?;

        info!("Resynced {}", self.path.display());
        Ok(())
    }

    fn read_content(&self) -> Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }

    /// Write-then-rename on the resolved file, falling back to an in-place
    /// rewrite when the rename cannot work (a bind-mounted `/etc/hosts`
    /// returns `EBUSY`, the parent directory is read-only, or the owner
    /// can't be carried over).
    fn write_content(&self, content: &[u8]) -> Result<()> {
        if let Some(target) = self.resolve_target() {
            match write_atomic(&target, content) {
                Ok(()) => return Ok(()),
                Err(e) => debug!(
                    "Atomic replace of {} failed ({}), rewriting in place",
                    target.display(),
                    e
                ),
            }
        }
        fs::write(&self.path, content).map_err(|e| Error::io(&self.path, e))
    }

    /// The file a rename must replace: the symlink target when the path is
    /// a link.  `None` for a dangling link, which only an in-place write
    /// can follow.
    fn resolve_target(&self) -> Option<PathBuf> {
        match fs::canonicalize(&self.path) {
            Ok(target) => Some(target),
            Err(_) if is_symlink(&self.path) => None,
            Err(_) => Some(self.path.clone()),
        }
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

fn write_atomic(target: &Path, content: &[u8]) -> io::Result<()> {
    let tmp = temp_path(target);
    let result = (|| -> io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(content)?;
        if let Ok(meta) = fs::metadata(target) {
            file.set_permissions(meta.permissions())?;
            #[cfg(unix)]
            preserve_owner(&file, &meta)?;
        }
        file.sync_all()?;
        fs::rename(&tmp, target)
    })();

    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove temp file {}: {}", tmp.display(), e);
            }
        }
    }
    result
}

/// Gives the temp file the original's uid/gid. Fails without privileges
/// when they differ from ours, which sends the caller to the in-place path.
#[cfg(unix)]
fn preserve_owner(file: &fs::File, original: &fs::Metadata) -> io::Result<()> {
    use std::os::unix::fs::{fchown, MetadataExt};

    let created = file.metadata()?;
    if created.uid() == original.uid() && created.gid() == original.gid() {
        return Ok(());
    }
    fchown(file, Some(original.uid()), Some(original.gid()))
}

fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hosts".to_string());
    target.with_file_name(format!(".{name}.hostsync.tmp"))
}

/// Hostnames mapped to the loopback address inside the managed region.
///
/// Lines that don't parse as `127.0.0.1 <host>`, such as the empty-region
/// placeholder or anything that isn't UTF-8, are skipped.
pub fn parse_managed(content: &[u8]) -> HostnameSet {
    let mut hosts = HostnameSet::new();
    let mut inside = false;

    for line in content.split(|&b| b == b'\n') {
        if line.starts_with(MARKER_END.as_bytes()) {
            inside = false;
        }
        if inside {
            if let Ok(line) = std::str::from_utf8(line) {
                let mut fields = line.split_whitespace();
                if let (Some(LOOPBACK), Some(host)) = (fields.next(), fields.next()) {
                    hosts.insert(host);
                }
            }
        }
        if line.starts_with(MARKER_BEGIN.as_bytes()) {
            inside = true;
        }
    }
    hosts
}

/// Returns `content` with its managed region replaced by one listing `hosts`.
///
/// Unmanaged lines keep their original bytes, whatever their encoding and
/// including `\r\n` endings.  A begin marker without an end marker swallows
/// the rest of the file.
pub fn render(content: &[u8], hosts: &HostnameSet) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + hosts.len() * 32 + 64);
    let mut inside = false;

    for line in content.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(MARKER_BEGIN.as_bytes()) {
            inside = true;
        }
        if !inside {
            out.extend_from_slice(line);
        }
        if line.starts_with(MARKER_END.as_bytes()) {
            inside = false;
        }
    }

    if !out.is_empty() && !out.ends_with(b"\n") {
        out.push(b'\n');
    }

    let mut region = format!("{MARKER_BEGIN}\n");
    if hosts.is_empty() {
        region.push_str(EMPTY_PLACEHOLDER);
        region.push('\n');
    } else {
        for host in hosts.iter() {
            region.push_str(&format!("{LOOPBACK}       {host}\n"));
        }
    }
    region.push_str(MARKER_END);
    region.push('\n');

    out.extend_from_slice(region.as_bytes());
    out
}
