use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hex SHA-256 of the URL. Stable across restarts and filesystem safe.
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// `<root>/<first two hex chars>/<full key>`.
pub fn cache_path(root: &Path, url: &str) -> PathBuf {
    let key = cache_key(url);
    root.join(&key[..2]).join(key)
}
