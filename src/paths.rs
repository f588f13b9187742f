//! Process-level filesystem layout
//!
//! All relative paths used by the cache are resolved under a single root
//! directory so that repeated runs find the same state. The root defaults to
//! `./.temp` and can be moved with the `DOMAINVET_ROOT_DIR` environment
//! variable; the snapshot file itself can be pointed elsewhere with
//! `DOMAINVET_CACHE_FILE`. Directories are created on demand.

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the root directory.
pub const ROOT_DIR_ENV: &str = "DOMAINVET_ROOT_DIR";

/// Environment variable overriding the cache snapshot path.
pub const CACHE_FILE_ENV: &str = "DOMAINVET_CACHE_FILE";

/// Default snapshot file name, resolved under the root directory.
pub const DEFAULT_CACHE_FILE: &str = "dns_resolver_cache.json";

/// Returns the process root directory.
///
/// Reads `DOMAINVET_ROOT_DIR` if set, otherwise `.temp` under the current
/// working directory. The directory is not created here; see [`ensure_dir`].
pub fn root_dir() -> PathBuf {
    match env::var_os(ROOT_DIR_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".temp"),
    }
}

/// Resolves a path under the root directory.
///
/// Absolute paths are returned unchanged; relative paths are joined onto
/// [`root_dir`].
pub fn with_root(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root_dir().join(path)
    }
}

/// Creates a directory (and any missing parents) under the root and returns
/// its resolved path.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = with_root(path);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    Ok(dir)
}

/// Returns the resolved path of the cache snapshot file.
///
/// `DOMAINVET_CACHE_FILE` wins when set (itself resolved under the root when
/// relative); otherwise the default file name under the root directory.
pub fn cache_file() -> PathBuf {
    match env::var_os(CACHE_FILE_ENV) {
        Some(file) => with_root(PathBuf::from(file)),
        None => with_root(DEFAULT_CACHE_FILE),
    }
}
