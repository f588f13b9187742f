//! On-disk cache snapshot
//!
//! The persisted document is a single JSON object: a `stats` block first
//! (per-class cardinalities, purely informational), then one array of domain
//! strings per class, keyed by the canonical class names. Ordinal keys are
//! not accepted on load.
//!
//! Writes are crash-safe: the document is serialized to a sibling `.tmp`
//! file, flushed and fsynced, then renamed over the real path, so the file
//! on disk is always either the previous complete state or the most recent
//! one. The read path tolerates the two crash shapes this leaves behind: a
//! missing main file with an orphan `.tmp` (the temp file is promoted), and
//! a corrupt main file (the temp file is promoted if present, otherwise the
//! cache starts empty).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use crate::cache::CacheStats;

/// Wire form of the resolution cache.
///
/// Field order is the serialization order, which keeps `stats` first in the
/// document. Unknown keys are rejected so that files keyed by class ordinal
/// (or otherwise foreign) fall into the corrupt-snapshot recovery path
/// instead of being half-read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    #[serde(default)]
    pub stats: CacheStats,
    #[serde(default)]
    pub resolvable: HashSet<String>,
    #[serde(default)]
    pub unresolvable: HashSet<String>,
    #[serde(default)]
    pub none: HashSet<String>,
    #[serde(default, rename = "nameServerError")]
    pub name_server_error: HashSet<String>,
    #[serde(default)]
    pub timeout: HashSet<String>,
    #[serde(default, rename = "dnsError")]
    pub dns_error: HashSet<String>,
    #[serde(default)]
    pub error: HashSet<String>,
}

/// Handle to the snapshot file and its sibling temp file.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    /// Loads the snapshot, recovering from interrupted writes.
    ///
    /// Never fails: a missing file yields an empty snapshot, and a corrupt
    /// one falls back to the promoted temp file or, failing that, to empty.
    pub async fn read(&self) -> Snapshot {
        let tmp = self.tmp_path();

        // A rename that never happened: the temp file is the newest state.
        if !self.path.exists() && tmp.exists() {
            warn!(
                "Promoting orphan temp snapshot {} over missing {}",
                tmp.display(),
                self.path.display()
            );
            if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
                error!("Failed to promote temp snapshot: {}", e);
            }
        }

        match self.parse(&self.path).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("No snapshot at {}, starting empty", self.path.display());
                Snapshot::default()
            }
            Err(e) => {
                error!("Corrupt snapshot {}: {:#}", self.path.display(), e);
                if tmp.exists() {
                    warn!("Falling back to temp snapshot {}", tmp.display());
                    if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
                        error!("Failed to promote temp snapshot: {}", e);
                        return Snapshot::default();
                    }
                    if let Ok(Some(snapshot)) = self.parse(&self.path).await {
                        return snapshot;
                    }
                }
                Snapshot::default()
            }
        }
    }

    async fn parse(&self, path: &Path) -> Result<Option<Snapshot>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let snapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(snapshot))
    }

    /// Atomically replaces the snapshot on disk.
    ///
    /// Serializes into the temp file, fsyncs it, then renames it over the
    /// main path so readers only ever observe complete documents.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let data = serde_json::to_vec_pretty(snapshot).context("Failed to serialize snapshot")?;
        let tmp = self.tmp_path();

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(&data)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("Failed to sync {}", tmp.display()))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to rename {} over {}", tmp.display(), self.path.display()))?;

        debug!("Snapshot written to {}", self.path.display());
        Ok(())
    }
}
