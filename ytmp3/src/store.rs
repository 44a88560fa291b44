use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub removed: usize,
    pub failed: usize,
}

/// Flat on-disk directory of produced audio files.
///
/// Filenames are opaque `<uuid>.<ext>` identifiers; the directory listing is
/// the only record of what exists.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating the root directory (and parents) if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "artifact store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a filename to its path inside the store. Does not check existence.
    ///
    /// Names with path separators or that refer to the directory itself are
    /// rejected, so a caller-supplied name can never escape the root.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.root.join(filename))
    }

    /// Resolve and open an artifact for reading.
    ///
    /// Only regular files are artifacts; a directory under the root is
    /// reported as not found.
    pub async fn open(&self, filename: &str) -> Result<(PathBuf, tokio::fs::File)> {
        let path = self.resolve(filename)?;
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ArtifactNotFound { path });
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            debug!(path = %path.display(), "not a regular file");
            return Err(Error::ArtifactNotFound { path });
        }

        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::ArtifactNotFound { path })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every regular file directly under the root whose modification
    /// time is more than `max_age` in the past.
    ///
    /// Per-file failures are logged and counted; the scan always finishes.
    pub fn cleanup(&self, max_age: Duration) -> CleanupStats {
        let mut stats = CleanupStats::default();

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "failed to list artifact directory");
                return stats;
            }
        };

        let now = SystemTime::now();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "failed to read directory entry");
                    stats.failed += 1;
                    continue;
                }
            };
            let path = entry.path();

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to stat artifact");
                    stats.failed += 1;
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }

            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), age_secs = age.as_secs(), "cleaned up old file");
                    stats.removed += 1;
                }
                // Another cleanup pass got there first.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "artifact already removed");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "error deleting artifact");
                    stats.failed += 1;
                }
            }
        }

        stats
    }

    /// Best-effort removal of every `<id>.*` file, used after a failed
    /// conversion so that partial downloads don't linger.
    pub fn discard(&self, id: &str) {
        let prefix = format!("{id}.");
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return;
        };

        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
            if !matches {
                continue;
            }
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to discard partial artifact");
            } else {
                debug!(path = %path.display(), "discarded partial artifact");
            }
        }
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    let bad = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);
    if bad {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    Ok(())
}
