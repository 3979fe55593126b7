//! Remote path joining utilities.

use crate::error::{Error, Result};

pub fn resolve_optional_base_path(base_path: Option<&str>) -> Option<&str> {
    base_path.and_then(|value| (!value.trim().is_empty()).then_some(value.trim()))
}

pub fn join_remote_path(base_path: Option<&str>, path: &str) -> Result<String> {
    let path = path.trim();

    if path.is_empty() {
        return Err(Error::validation_invalid_argument(
            "path",
            "Path cannot be empty",
            None,
            None,
        ));
    }

    if path.starts_with('/') {
        return Ok(path.to_string());
    }

    let Some(base) = resolve_optional_base_path(base_path) else {
        return Err(Error::config_missing_key("basePath", None));
    };

    if base.ends_with('/') {
        Ok(format!("{}{}", base, path))
    } else {
        Ok(format!("{}/{}", base, path))
    }
}

/// Parent directory of a remote file path. Relative paths without a slash
/// resolve to `.` (the login directory).
pub fn remote_dirname(path: &str) -> Result<String> {
    let path = path.trim();

    if path.is_empty() {
        return Err(Error::validation_invalid_argument(
            "path",
            "Path cannot be empty",
            None,
            None,
        ));
    }

    let without_trailing = path.trim_end_matches('/');

    let Some((parent, _)) = without_trailing.rsplit_once('/') else {
        return Ok(if path.starts_with('/') { "/" } else { "." }.to_string());
    };

    if parent.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(parent.to_string())
    }
}

pub fn remote_basename(path: &str) -> Result<String> {
    let name = path
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();

    if name.is_empty() {
        return Err(Error::validation_invalid_argument(
            "path",
            "Remote path must include a file name",
            Some(path.to_string()),
            None,
        ));
    }

    Ok(name.to_string())
}
