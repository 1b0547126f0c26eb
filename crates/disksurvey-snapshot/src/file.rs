use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use crate::{decode_state, encode_state, Result, SnapshotError, SnapshotState};

/// Write a snapshot next to `path` and atomically rename it into place.
/// A failure at any step leaves the previous file untouched; the temp file
/// is cleaned up on drop.
///
/// Blocking; callers on a runtime should use `spawn_blocking`.
pub fn save_to_path(path: &Path, state: &SnapshotState) -> Result<()> {
    let bytes = encode_state(state)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|persist| SnapshotError::Io(persist.error))?;

    info!(path = %path.display(), disks = state.disks.len(), bytes = bytes.len(), "snapshot written");
    Ok(())
}

/// Read and decode a snapshot. A missing file is reported as `Io` with
/// `NotFound`; callers treat that as an empty state.
///
/// Blocking; callers on a runtime should use `spawn_blocking`.
pub fn load_from_path(path: &Path) -> Result<SnapshotState> {
    let bytes = std::fs::read(path)?;
    debug!(path = %path.display(), bytes = bytes.len(), "loading snapshot");
    decode_state(&bytes)
}
