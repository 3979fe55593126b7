//! File I/O primitives with consistent error handling.

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Read file contents with standardized error handling.
///
/// Wraps `fs::read_to_string` with consistent `Error::internal_io` formatting.
/// Non-UTF-8 content is reported as an IO error.
pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Write content to file atomically (write to a sibling temp file, then rename).
///
/// Readers always see either the old content or the new content, never a
/// partial write. Existing permissions on `path` are carried over.
pub fn write_file_atomic(path: &Path, content: &str, operation: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(Error::internal_io(
                format!("Invalid path: {}", path.display()),
                Some(operation.to_string()),
            ))
        }
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("{} (create temp)", operation)))
    })?;

    tmp.write_all(content.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (write temp)", operation))))?;

    if let Ok(metadata) = fs::metadata(path) {
        let _ = fs::set_permissions(tmp.path(), metadata.permissions());
    }

    tmp.persist(path)
        .map_err(|e| Error::internal_io(e.error.to_string(), Some(format!("{} (rename)", operation))))?;

    Ok(())
}

/// Write bytes to a fresh temp file that is removed when the handle drops.
pub fn write_temp_file(content: &[u8], operation: &str) -> Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new()
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (create temp)", operation))))?;

    tmp.write_all(content)
        .and_then(|_| tmp.flush())
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (write temp)", operation))))?;

    Ok(tmp)
}
