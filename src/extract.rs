//! Symbol and dependency extraction strategies.
//!
//! Digest reduction only sees the output of a [`SymbolExtractor`], so a
//! language-specific strategy can replace the default without touching it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static SYMBOL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\bdef|\bclass|\bfunction|\bconst|\blet|\bvar|\bpub\s+fn|\bfn|\bstruct|\btrait)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("symbol pattern is valid")
});

static DEPENDENCY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\bimport|\bfrom|\brequire|\buse)\s+([A-Za-z0-9_./:@-]+)")
        .expect("dependency pattern is valid")
});

/// Symbols and dependencies found in one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Declared names, sorted and deduplicated
    pub symbols: Vec<String>,
    /// Referenced modules or packages, sorted and deduplicated
    pub dependencies: Vec<String>,
}

/// Pulls symbol-like and dependency-like tokens out of text.
pub trait SymbolExtractor: Send + Sync {
    /// Extracts at most `max_symbols` symbols and `max_dependencies` dependencies.
    fn extract(&self, text: &str, max_symbols: usize, max_dependencies: usize) -> Extraction;
}

/// Keyword-driven extraction that works tolerably across Python, JS/TS and Rust.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexExtractor;

fn collect_sorted(pattern: &Regex, text: &str, limit: usize) -> Vec<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(limit)
        .collect()
}

impl SymbolExtractor for RegexExtractor {
    fn extract(&self, text: &str, max_symbols: usize, max_dependencies: usize) -> Extraction {
        Extraction {
            symbols: collect_sorted(&SYMBOL_PATTERN, text, max_symbols),
            dependencies: collect_sorted(&DEPENDENCY_PATTERN, text, max_dependencies),
        }
    }
}
