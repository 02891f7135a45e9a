//! Content hashing for the extraction cache.

use sha2::{Digest, Sha256};

/// SHA-256 of the input, lowercase hex. Used as the cache key for LLM
/// extraction outputs so a rebuild can look up prior results by chunk text.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn stable_and_distinct() {
        assert_eq!(content_hash("chunk"), content_hash("chunk"));
        assert_ne!(content_hash("chunk"), content_hash("chunk "));
        assert_eq!(content_hash("").len(), 64);
    }
}
