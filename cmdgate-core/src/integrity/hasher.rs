//! SHA-256 content hashing for policy files

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Number of hex characters shown when a hash appears in diagnostics
pub const HASH_PREFIX_LEN: usize = 16;

/// Hash a file's full contents, returning 64 lowercase hex characters
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;

    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192]; // 8KB buffer for streaming

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash in-memory bytes
pub fn hash_bytes(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Leading characters of a hash for display
pub fn short_hash(hash: &str) -> &str {
    hash.get(..HASH_PREFIX_LEN).unwrap_or(hash)
}
