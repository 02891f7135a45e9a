//! Name normalization.
//!
//! Entity and relation-endpoint names act as identity keys, so the same
//! normalization must run on every write and every read path that matches by
//! name: NFKC fold, lowercase, trim. Raw user-supplied casing is never stored
//! as the key.

use unicode_normalization::UnicodeNormalization;

/// Normalize a name for use as an identity key.
pub fn normalize_name(raw: &str) -> String {
    raw.nfkc().collect::<String>().to_lowercase().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_whitespace_fold_together() {
        assert_eq!(normalize_name("  TechCorp  "), "techcorp");
        assert_eq!(normalize_name("TECHCORP"), normalize_name("techcorp"));
    }

    #[test]
    fn nfkc_folds_compatibility_forms() {
        // Fullwidth latin and the ﬁ ligature both decompose under NFKC.
        assert_eq!(normalize_name("ＴｅｃｈＣｏｒｐ"), "techcorp");
        assert_eq!(normalize_name("ﬁle"), "file");
    }

    #[test]
    fn idempotent() {
        let once = normalize_name("  Grüße 42 ");
        assert_eq!(normalize_name(&once), once);
    }
}
