//! Whole-run snapshot and rollback.
//!
//! ## Workflow
//! 1. `Transaction::begin(project_root)`: creates a fresh ghost directory.
//! 2. `snapshot(path)`: copies the file aside on first touch. A path that does
//!    not exist yet is remembered so rollback can remove it again.
//! 3. `commit()`: success path, drops the ghost directory.
//! 4. `restore_all()`: failure path, puts every snapshot back.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Errors from snapshot handling.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("no snapshot of {0}")]
    NotSnapshotted(PathBuf),
}

/// What a file looked like before the run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Snapshot {
    Copied(PathBuf),
    Absent,
}

/// Snapshots of every file the run may touch.
///
/// Ghost directory layout: `{project_root}/.retrotype/ghost/{run id}/{n}_{filename}.bak`
pub struct Transaction {
    ghost_dir: PathBuf,
    /// `original_path -> snapshot`
    snapshots: BTreeMap<PathBuf, Snapshot>,
}

impl Transaction {
    /// # Errors
    /// Fails when the ghost directory cannot be created.
    pub fn begin(project_root: &Path) -> Result<Self, TransactionError> {
        let ghost_dir = project_root
            .join(".retrotype")
            .join("ghost")
            .join(uuid::Uuid::new_v4().simple().to_string());
        fs::create_dir_all(&ghost_dir)?;
        Ok(Self {
            ghost_dir,
            snapshots: BTreeMap::new(),
        })
    }

    /// Records the current content of `path` unless already recorded.
    ///
    /// # Errors
    /// Copy failures.
    pub fn snapshot(&mut self, path: &Path) -> Result<(), TransactionError> {
        if self.snapshots.contains_key(path) {
            return Ok(());
        }
        let snapshot = if path.is_file() {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown");
            let backup = self
                .ghost_dir
                .join(format!("{}_{}.bak", self.snapshots.len(), filename));
            fs::copy(path, &backup)?;
            Snapshot::Copied(backup)
        } else {
            Snapshot::Absent
        };
        self.snapshots.insert(path.to_path_buf(), snapshot);
        Ok(())
    }

    /// `true` when `path` differs from its snapshot.
    ///
    /// # Errors
    /// Read failures, or a path that was never snapshotted.
    pub fn changed(&self, path: &Path) -> Result<bool, TransactionError> {
        match self.snapshots.get(path) {
            None => Err(TransactionError::NotSnapshotted(path.to_path_buf())),
            Some(Snapshot::Absent) => Ok(path.exists()),
            Some(Snapshot::Copied(backup)) => {
                if !path.exists() {
                    return Ok(true);
                }
                Ok(fs::read(backup)? != fs::read(path)?)
            }
        }
    }

    /// Puts every snapshot back and removes files that did not exist before.
    ///
    /// Keeps going past individual failures and reports the first one.
    ///
    /// # Errors
    /// The first copy or removal failure.
    pub fn restore_all(&self) -> Result<(), TransactionError> {
        let mut first_error = None;
        for (original, snapshot) in &self.snapshots {
            let result = match snapshot {
                Snapshot::Copied(backup) => fs::copy(backup, original).map(|_| ()),
                Snapshot::Absent if original.exists() => fs::remove_file(original),
                Snapshot::Absent => Ok(()),
            };
            match result {
                Ok(()) => debug!(file = %original.display(), "restored"),
                Err(e) => {
                    warn!(file = %original.display(), error = %e, "restore failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Drops the snapshots after a successful run.
    pub fn commit(self) {
        if let Err(e) = fs::remove_dir_all(&self.ghost_dir) {
            warn!(dir = %self.ghost_dir.display(), error = %e, "could not remove snapshots");
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}
