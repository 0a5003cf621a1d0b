//! Text sanitization applied before identity hashing and embedding.
//!
//! 1. Drop control characters
//! 2. Trim whitespace
//! 3. Truncate to `max_chars` characters (not bytes)
//! 4. Trim trailing whitespace exposed by the cut
//!
//! Step 4 keeps the function idempotent.

/// Default truncation length in characters.
pub const DEFAULT_MAX_CHARS: usize = 200;

/// Pure, total text sanitizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    max_chars: usize,
}

impl Sanitizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Sanitize `text`. An empty result means the item carries no content.
    pub fn sanitize(&self, text: &str) -> String {
        let stripped: String = text.chars().filter(|c| !c.is_control()).collect();
        let trimmed = stripped.trim();

        match trimmed.char_indices().nth(self.max_chars) {
            Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
            None => trimmed.to_string(),
        }
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_control_characters() {
        let s = Sanitizer::default();
        assert_eq!(s.sanitize("Iran\u{0007} sanctions\u{0000}\n"), "Iran sanctions");
    }

    #[test]
    fn test_control_chars_join_words() {
        // Tabs and newlines are control characters and are removed, not replaced.
        let s = Sanitizer::default();
        assert_eq!(s.sanitize("a\tb\nc"), "abc");
    }

    #[test]
    fn test_trims() {
        let s = Sanitizer::default();
        assert_eq!(s.sanitize("   padded  "), "padded");
    }

    #[test]
    fn test_whitespace_only_becomes_empty() {
        let s = Sanitizer::default();
        assert_eq!(s.sanitize(" \t\r\n "), "");
        assert_eq!(s.sanitize(""), "");
    }

    #[test]
    fn test_truncates_by_chars() {
        let s = Sanitizer::new(5);
        assert_eq!(s.sanitize("abcdefgh"), "abcde");
        // Multi-byte characters count once each.
        assert_eq!(s.sanitize("ééééééé"), "ééééé");
    }

    #[test]
    fn test_exact_length_untouched() {
        let s = Sanitizer::new(3);
        assert_eq!(s.sanitize("abc"), "abc");
    }

    #[test]
    fn test_default_limit_is_200() {
        let s = Sanitizer::default();
        let long = "x".repeat(500);
        assert_eq!(s.sanitize(&long).chars().count(), 200);
    }

    #[test]
    fn test_idempotent_when_cut_lands_on_space() {
        let s = Sanitizer::new(6);
        let once = s.sanitize("hello world");
        assert_eq!(once, "hello");
        assert_eq!(s.sanitize(&once), once);
    }

    #[test]
    fn test_idempotent_on_mixed_input() {
        let s = Sanitizer::new(10);
        for input in ["  a\u{1b}[31m red ", "\u{0}\u{0}", "0123456789 tail", "ok"] {
            let once = s.sanitize(input);
            assert_eq!(s.sanitize(&once), once, "input {:?}", input);
        }
    }
}
