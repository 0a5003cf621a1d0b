//! Deterministic record identity.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::types::to_millis;

/// Field separator; cannot appear in sanitized text.
const UNIT_SEPARATOR: u8 = 0x1f;

/// Compute a record id from its identity inputs.
///
/// `text` must already be sanitized so that differences past the truncation
/// point cannot produce distinct ids for the same visible content.
pub fn record_id(source: &str, url: &str, published_at: DateTime<Utc>, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([UNIT_SEPARATOR]);
    hasher.update(url.as_bytes());
    hasher.update([UNIT_SEPARATOR]);
    hasher.update(to_millis(published_at).to_le_bytes());
    hasher.update([UNIT_SEPARATOR]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::from_millis;

    fn ts(ms: i64) -> DateTime<Utc> {
        from_millis(ms).unwrap()
    }

    #[test]
    fn test_deterministic() {
        let a = record_id("wire", "https://x/1", ts(1_000), "text");
        let b = record_id("wire", "https://x/1", ts(1_000), "text");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_each_field_changes_id() {
        let base = record_id("wire", "https://x/1", ts(1_000), "text");
        assert_ne!(base, record_id("other", "https://x/1", ts(1_000), "text"));
        assert_ne!(base, record_id("wire", "https://x/2", ts(1_000), "text"));
        assert_ne!(base, record_id("wire", "https://x/1", ts(1_001), "text"));
        assert_ne!(base, record_id("wire", "https://x/1", ts(1_000), "texts"));
    }

    #[test]
    fn test_field_boundaries_are_not_ambiguous() {
        let a = record_id("ab", "c", ts(0), "t");
        let b = record_id("a", "bc", ts(0), "t");
        assert_ne!(a, b);
    }
}
