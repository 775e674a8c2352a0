use std::{
    io::{self, Write},
    path::Path,
};

use tempfile::NamedTempFile;

/// Replaces the contents of `path` with `bytes` in a single rename.
///
/// The data is written to a temporary file in the same directory, synced, and
/// then persisted over the target, so readers never observe a half-written
/// binary.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp = staged(path, bytes)?;
    temp.persist(path).map_err(|e| e.error)?;

    log::trace!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Like [`write_atomic`], but fails with [`io::ErrorKind::AlreadyExists`]
/// instead of replacing an existing file. `path` either keeps its old content
/// or holds all of `bytes`.
pub fn create_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp = staged(path, bytes)?;
    temp.persist_noclobber(path).map_err(|e| e.error)?;

    log::trace!("created {} with {} bytes", path.display(), bytes.len());
    Ok(())
}

/// Synced temporary file holding `bytes`, next to `path`.
fn staged(path: &Path, bytes: &[u8]) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}
