//! Identifier generation.
//!
//! New rows get time-ordered UUID v7 identifiers so that primary-key order
//! follows insertion order. Content-addressed identifiers (deterministic
//! across runs) use UUID v5 over a fixed namespace.

use uuid::Uuid;

/// Namespace for deterministic ids. Fixed forever; changing it would silently
/// re-key every content-addressed row.
const RAGSTORE_NAMESPACE: Uuid = Uuid::from_u128(0x8f1d_5c3a_9b7e_4d20_a681_33c0_54f2_71e9);

/// Generate a fresh time-ordered identifier (UUID v7: 48-bit millisecond
/// timestamp, version 7, variant 10, 74 random bits).
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

/// Generate a deterministic identifier from arbitrary bytes (UUID v5, SHA-1
/// over the ragstore namespace with version and variant bits forced).
pub fn deterministic_id(input: &[u8]) -> Uuid {
    Uuid::new_v5(&RAGSTORE_NAMESPACE, input)
}

/// Parse an identifier, mapping malformed input to [`crate::Error::InvalidId`].
pub fn parse_id(raw: &str) -> crate::Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| crate::Error::invalid_id(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_version_7_variant_rfc4122() {
        let id = new_id();
        assert_eq!(id.get_version_num(), 7);
        assert_eq!(id.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn new_ids_are_time_ordered() {
        let first = new_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = new_id();
        assert!(second > first);
    }

    #[test]
    fn deterministic_ids_are_stable_version_5() {
        let a = deterministic_id(b"chunk: the quick brown fox");
        let b = deterministic_id(b"chunk: the quick brown fox");
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 5);
        assert_ne!(a, deterministic_id(b"chunk: something else"));
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = new_id();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
