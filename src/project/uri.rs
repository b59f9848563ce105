//! Conversions between image server URIs and filesystem paths.
//!
//! Only `file:` URIs are supported.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::PathMirrorError;

fn invalid(uri: &str, reason: impl Into<String>) -> PathMirrorError {
    PathMirrorError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.into(),
    }
}

fn parse_file_uri(uri: &str) -> Result<Url, PathMirrorError> {
    let url = Url::parse(uri).map_err(|e| invalid(uri, e.to_string()))?;
    if url.scheme() != "file" {
        return Err(invalid(
            uri,
            format!("unsupported scheme '{}', only file URIs are supported", url.scheme()),
        ));
    }
    Ok(url)
}

/// Decoded path component of a file URI.
fn decoded_path(uri: &str, url: &Url) -> Result<String, PathMirrorError> {
    urlencoding::decode(url.path())
        .map(|p| p.into_owned())
        .map_err(|e| invalid(uri, e.to_string()))
}

/// True for `/C:/...`, a drive-letter path encoded in a URI.
fn is_windows_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 4
        && bytes[0] == b'/'
        && bytes[1].is_ascii_uppercase()
        && bytes[2] == b':'
        && bytes[3] == b'/'
}

/// Parses a `file:` URI into a path.
///
/// Windows drive paths (`file:/C:/images/a.svs`) come back without the
/// leading slash, as `C:/images/a.svs`.
///
/// # Errors
/// `InvalidUri` for malformed URIs and non-file schemes.
pub fn path_from_uri(uri: &str) -> Result<PathBuf, PathMirrorError> {
    let url = parse_file_uri(uri)?;
    let path = decoded_path(uri, &url)?;
    if is_windows_drive_path(&path) {
        Ok(PathBuf::from(&path[1..]))
    } else {
        Ok(PathBuf::from(path))
    }
}

/// Builds a `file:` URI for an absolute path.
///
/// # Errors
/// `InvalidUri` if `path` is relative.
pub fn uri_from_path(path: &Path) -> Result<String, PathMirrorError> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|_| invalid(&path.to_string_lossy(), "an absolute path is required"))
}

/// Returns true if two file URIs name the same path, regardless of how
/// each one is percent-encoded.
pub fn compare_uris(a: &str, b: &str) -> Result<bool, PathMirrorError> {
    let url_a = parse_file_uri(a)?;
    let url_b = parse_file_uri(b)?;
    Ok(decoded_path(a, &url_a)? == decoded_path(b, &url_b)?)
}
