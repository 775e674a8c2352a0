//! Single-generation backups of patch targets.
//!
//! A target has exactly one backup, stored next to it with [`BACKUP_SUFFIX`]
//! appended to its file name. The backup is written before the first mutation
//! and never overwritten afterwards, so it always holds the pristine binary.

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use crate::{
    disk::{create_atomic, write_atomic},
    error::BackupError,
};

pub const BACKUP_SUFFIX: &str = ".backup";

/// `client.exe` -> `client.exe.backup`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

pub fn has_backup(path: &Path) -> bool {
    backup_path(path).is_file()
}

/// Copies `path` to its backup location unless a backup already exists.
///
/// An existing backup is returned untouched even if the target changed since,
/// as it is the only record of the original content. The backup appears in a
/// single rename, so it is either absent or complete.
pub fn ensure_backup(path: &Path) -> Result<PathBuf, BackupError> {
    if !path.is_file() {
        return Err(BackupError::SourceNotFound(path.to_owned()));
    }

    let backup = backup_path(path);
    if backup.exists() {
        log::info!("Backup already exists at {}", backup.display());
        return Ok(backup);
    }

    let original = fs::read(path).map_err(|source| BackupError::Io {
        path: path.to_owned(),
        source,
    })?;
    match create_atomic(&backup, &original) {
        Ok(()) => log::info!("Backup created at {}", backup.display()),
        // Created concurrently; the first snapshot wins
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            log::info!("Backup already exists at {}", backup.display())
        }
        Err(source) => {
            return Err(BackupError::Io {
                path: backup,
                source,
            })
        }
    }
    Ok(backup)
}

/// Copies the backup over `path`. The backup itself is kept.
pub fn restore(path: &Path) -> Result<(), BackupError> {
    let backup = backup_path(path);
    if !backup.is_file() {
        return Err(BackupError::BackupMissing(backup));
    }

    let original = fs::read(&backup).map_err(|source| BackupError::Io {
        path: backup.clone(),
        source,
    })?;
    write_atomic(path, &original).map_err(|source| BackupError::Io {
        path: path.to_owned(),
        source,
    })?;

    log::info!("Restored {} from {}", path.display(), backup.display());
    Ok(())
}
