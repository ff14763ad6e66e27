//! Durable snapshot of the embedded graph
//!
//! The whole state is written to a sibling temp file, synced, then renamed over
//! the target, so readers never observe a half-written snapshot and a crash
//! mid-write leaves the previous one intact.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::CorruptSnapshotPolicy;
use crate::data::{GraphError, Node, Relationship};

/// Serialized form of the full embedded state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

/// Location and load policy of a snapshot document.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    policy: CorruptSnapshotPolicy,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>, policy: CorruptSnapshotPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "snapshot".to_string());
        self.path.with_file_name(format!(".{}.tmp", file_name))
    }

    /// Reads the snapshot.
    ///
    /// A missing file is an empty graph. An unparsable file is handled per
    /// the configured [`CorruptSnapshotPolicy`].
    pub fn load(&self) -> Result<GraphSnapshot, GraphError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot on disk, starting empty");
                return Ok(GraphSnapshot::default());
            }
            Err(e) => {
                return Err(GraphError::persistence(
                    format!("failed to read snapshot {}", self.path.display()),
                    Some(e),
                ))
            }
        };

        match serde_json::from_slice::<GraphSnapshot>(&bytes) {
            Ok(snapshot) => {
                info!(
                    path = %self.path.display(),
                    nodes = snapshot.nodes.len(),
                    relationships = snapshot.relationships.len(),
                    "Loaded graph snapshot"
                );
                Ok(snapshot)
            }
            Err(e) => match self.policy {
                CorruptSnapshotPolicy::Discard => {
                    error!(
                        path = %self.path.display(),
                        error = %e,
                        "Snapshot is corrupt, starting with an empty graph"
                    );
                    Ok(GraphSnapshot::default())
                }
                CorruptSnapshotPolicy::Quarantine => {
                    let quarantined = self.quarantine()?;
                    error!(
                        path = %self.path.display(),
                        quarantined = %quarantined.display(),
                        error = %e,
                        "Snapshot is corrupt, moved aside"
                    );
                    Err(GraphError::persistence(
                        format!(
                            "snapshot {} is corrupt and was quarantined to {}",
                            self.path.display(),
                            quarantined.display()
                        ),
                        Some(e),
                    ))
                }
            },
        }
    }

    fn quarantine(&self) -> Result<PathBuf, GraphError> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "snapshot".to_string());
        let target = self.path.with_file_name(format!("{}.corrupt-{}", file_name, stamp));
        fs::rename(&self.path, &target).map_err(|e| {
            GraphError::persistence(
                format!("failed to quarantine corrupt snapshot {}", self.path.display()),
                Some(e),
            )
        })?;
        Ok(target)
    }

    /// Writes the full snapshot atomically. Never merges with what is on disk.
    pub fn save(&self, snapshot: &GraphSnapshot) -> Result<(), GraphError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    GraphError::persistence(
                        format!("failed to create snapshot directory {}", parent.display()),
                        Some(e),
                    )
                })?;
            }
        }

        let tmp_path = self.temp_path();
        let write_result = (|| -> std::io::Result<()> {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(GraphError::persistence(
                format!("failed to write snapshot {}", tmp_path.display()),
                Some(e),
            ));
        }

        // Atomic rename
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            GraphError::persistence(
                format!("failed to move snapshot into place at {}", self.path.display()),
                Some(e),
            )
        })?;

        debug!(
            path = %self.path.display(),
            nodes = snapshot.nodes.len(),
            relationships = snapshot.relationships.len(),
            "Saved graph snapshot"
        );
        Ok(())
    }

    /// Deletes the snapshot. A missing file is not an error.
    pub fn remove(&self) -> Result<(), GraphError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                warn!(path = %self.path.display(), "Removed graph snapshot");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GraphError::persistence(
                format!("failed to remove snapshot {}", self.path.display()),
                Some(e),
            )),
        }
    }
}
