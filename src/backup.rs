//! Crash-safe backup of `level.dat` for the duration of a run.
//!
//! The backup file next to `level.dat` doubles as the run marker: while it
//! exists a run is in progress or died mid-run, and no new run may start.
//! It is only ever created by [`LevelBackup::begin`] and only ever removed by
//! renaming it back over `level.dat`.

use crate::error::ExploreError;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const LEVEL_BACKUP_NAME: &str = "level.dat.explorebackup";
pub const PARKED_REGION_NAME: &str = "region.explorerename-overworld";

pub fn backup_path_for(level: &Path) -> PathBuf {
    level.with_file_name(LEVEL_BACKUP_NAME)
}

/// Fails on the first leftover of an earlier run found under `root`: a
/// `level.dat` backup or a parked overworld region folder.
pub fn scan_stale_artifacts(root: &Path) -> Result<(), ExploreError> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                debug!("skipping unreadable entry while scanning {}: {error}", root.display());
                continue;
            }
        };
        let name = entry.file_name();
        let file_type = entry.file_type();
        if (file_type.is_file() && name == LEVEL_BACKUP_NAME)
            || (file_type.is_dir() && name == PARKED_REGION_NAME)
        {
            return Err(ExploreError::BackupAlreadyExists {
                path: entry.into_path(),
            });
        }
    }
    Ok(())
}

#[derive(Debug)]
pub struct LevelBackup {
    level: PathBuf,
    backup: PathBuf,
    finished: bool,
}

impl LevelBackup {
    /// Copies `level` to its backup path. Never touches an existing backup.
    pub fn begin(level: &Path) -> Result<Self, ExploreError> {
        let backup = backup_path_for(level);
        if backup.symlink_metadata().is_ok() {
            return Err(ExploreError::BackupAlreadyExists { path: backup });
        }
        if !level.is_file() {
            return Err(ExploreError::MissingPersistentState(level.to_path_buf()));
        }

        info!("  '{}' -> '{}'", level.display(), backup.display());
        copy_synced(level, &backup).map_err(|error| ExploreError::io(&backup, error))?;

        Ok(Self {
            level: level.to_path_buf(),
            backup,
            finished: false,
        })
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Puts the backed-up file back in place of `level.dat`.
    pub fn commit(mut self) -> Result<(), ExploreError> {
        self.finished = true;
        restore(&self.level, &self.backup)
    }
}

impl Drop for LevelBackup {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(
            "run ended without restoring {}; restoring it now",
            self.level.display()
        );
        if let Err(error) = restore(&self.level, &self.backup) {
            error!("{error}");
            error!(
                "the original level.dat is kept at {}",
                self.backup.display()
            );
        }
    }
}

/// Copies through a temporary name so a failed copy never leaves a partial
/// file at the backup path.
fn copy_synced(from: &Path, to: &Path) -> io::Result<()> {
    let tmp_path = PathBuf::from(format!("{}.tmp", to.to_string_lossy()));
    let result = std::fs::copy(from, &tmp_path)
        .and_then(|_| File::open(&tmp_path)?.sync_all())
        .and_then(|_| std::fs::rename(&tmp_path, to));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

fn restore(level: &Path, backup: &Path) -> Result<(), ExploreError> {
    if !backup.is_file() {
        return Err(ExploreError::MissingPersistentState(backup.to_path_buf()));
    }
    info!("  '{}' -> '{}'", backup.display(), level.display());
    match std::fs::remove_file(level) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(ExploreError::io(level, error)),
    }
    std::fs::rename(backup, level).map_err(|error| ExploreError::io(backup, error))
}
