//! Write-or-nothing file output
//!
//! Every artifact the pipeline produces is written to a hidden sibling and
//! renamed into place, so a file under its final name is always complete.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Hidden staging sibling for `path`: `dir/.partial_<name>`
pub fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".partial_{}", name))
}

/// Stream into a staging file, then rename over `path`
pub fn write_atomic_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let staging = staging_path(path);
    let result = (|| -> Result<()> {
        let file = File::create(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()?;
        fs::rename(&staging, path).with_context(|| {
            format!("Failed to move {} into place", path.display())
        })?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

/// Write a byte buffer atomically
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic_with(path, |w| {
        w.write_all(bytes)?;
        Ok(())
    })
}

/// Remove a file if present; missing files are fine
pub fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove {}: {}", path.display(), e),
    }
}
