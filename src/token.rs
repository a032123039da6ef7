use serde::{Deserialize, Serialize};
use std::sync::Arc;

const CHARS_PER_TOKEN: usize = 4;
const WORD_WEIGHT: f64 = 1.3;
const SPECIAL_CHAR_DIVISOR: usize = 10;

/// Which estimator the budget uses.
///
/// Only relative ordering of estimates matters to callers; neither kind
/// promises exact parity with a model's tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// `max(1, chars / 4)`, the uniform fallback.
    #[default]
    Simple,
    /// Blend of word count, character count and punctuation density.
    Enhanced,
}

impl TokenizerKind {
    /// Creates a new estimator instance of this kind.
    #[must_use]
    pub fn create(self) -> Arc<dyn TokenEstimator> {
        match self {
            Self::Simple => Arc::new(SimpleTokenizer),
            Self::Enhanced => Arc::new(EnhancedTokenizer),
        }
    }
}

/// Estimates the number of tokens a piece of text will occupy in a prompt.
pub trait TokenEstimator: Send + Sync {
    /// Returns 0 for empty text and at least 1 otherwise.
    fn estimate(&self, text: &str) -> usize;
}

/// Character-count estimator.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimpleTokenizer;

impl TokenEstimator for SimpleTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        (text.chars().count() / CHARS_PER_TOKEN).max(1)
    }
}

/// Word-aware estimator.
///
/// Averages a word-based and a character-based estimate, then adds a
/// penalty for punctuation-heavy text such as manifests and path lists.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnhancedTokenizer;

impl TokenEstimator for EnhancedTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let words = text.split_whitespace().count();
        let chars = text.chars().count();
        let special = text
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();

        let word_estimate = (words as f64 * WORD_WEIGHT) as usize;
        let char_estimate = chars / CHARS_PER_TOKEN;

        (word_estimate.saturating_add(char_estimate) / 2)
            .saturating_add(special / SPECIAL_CHAR_DIVISOR)
            .max(1)
    }
}

/// Estimates tokens with the default (simple) estimator.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    SimpleTokenizer.estimate(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(EnhancedTokenizer.estimate(""), 0);
    }

    #[test]
    fn test_simple_floor_with_minimum() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("test"), 1);
        assert_eq!(estimate_tokens("hello world"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(1000)), 250);
    }

    #[test]
    fn test_simple_counts_chars_not_bytes() {
        // 8 two-byte characters
        assert_eq!(estimate_tokens("éééééééé"), 2);
    }

    #[test]
    fn test_estimates_are_monotonic() {
        let short = "src/main.rs\nsrc/lib.rs";
        let long = format!("{short}\nsrc/config.rs\nsrc/error.rs\ntests/cli.rs");
        for kind in [TokenizerKind::Simple, TokenizerKind::Enhanced] {
            let estimator = kind.create();
            assert!(estimator.estimate(&long) >= estimator.estimate(short));
        }
    }

    #[test]
    fn test_enhanced_manifest_text() {
        let manifest = r#"[dependencies]
serde = { version = "1.0", features = ["derive"] }
"#;
        let result = EnhancedTokenizer.estimate(manifest);
        assert!(result > 5);
        assert!(result < 40);
    }
}
