//! Integrity hashing utilities.
//!
//! Integrity strings have the form `<algorithm>:<hex digest>`. `sha256` is
//! what indexes publish and lock files record; `blake3` is accepted too.

use crate::error::{GroveError, GroveResult};
use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of data as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute the Blake3 digest of data as lowercase hex
pub fn blake3_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// `sha256:<hex>` integrity string for data
pub fn integrity_of(data: &[u8]) -> String {
    format!("sha256:{}", sha256_hex(data))
}

fn digest_for(algorithm: &str, data: &[u8]) -> Option<String> {
    match algorithm {
        "sha256" => Some(sha256_hex(data)),
        "blake3" => Some(blake3_hex(data)),
        _ => None,
    }
}

/// Verify data against a list of integrity strings.
///
/// Succeeds when any hash with a supported algorithm matches. An empty list
/// is accepted (nothing to verify against); a list made only of unsupported
/// algorithms is rejected.
pub fn verify_integrity(package: &str, data: &[u8], expected: &[String]) -> GroveResult<()> {
    if expected.is_empty() {
        return Ok(());
    }

    let mut checked = Vec::new();
    for integrity in expected {
        let Some((algorithm, digest)) = integrity.split_once(':') else {
            continue;
        };
        if let Some(actual) = digest_for(algorithm, data) {
            if actual.eq_ignore_ascii_case(digest) {
                return Ok(());
            }
            checked.push(format!("{}:{}", algorithm, actual));
        }
    }

    Err(GroveError::IntegrityFailure {
        package: package.to_string(),
        expected: expected.join(", "),
        actual: if checked.is_empty() {
            "no supported hash algorithm".to_string()
        } else {
            checked.join(", ")
        },
    })
}
