//! Removes reasoning traces that some models leak into their answers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const BLOCK_TAGS: &[&str] = &["think", "analysis", "reasoning"];

static REASONING_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    // the regex crate has no backreferences, so one pattern per tag
    BLOCK_TAGS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}>.*?</{tag}>")).expect("reasoning block pattern is valid")
        })
        .collect()
});

static REASONING_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^(?:Reasoning|Analysis|Chain of thought|Thinking):.*$")
        .expect("reasoning prefix pattern is valid")
});

static EXTRA_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("blank line pattern is valid"));

/// Model output with reasoning removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedOutput {
    /// Cleaned text
    pub text: String,
    /// Removed fragments joined by blank lines, if any
    pub extracted_reasoning: Option<String>,
    /// Whether cleaning changed anything beyond surrounding whitespace
    pub was_modified: bool,
}

/// Strips `<think>`, `<analysis>` and `<reasoning>` blocks.
///
/// In strict mode, lines starting with `Reasoning:`, `Analysis:`,
/// `Chain of thought:` or `Thinking:` are dropped as well. Runs of three or
/// more newlines collapse to two and the result is trimmed.
#[must_use]
pub fn sanitize_final_output(text: &str, strict: bool) -> SanitizedOutput {
    let mut extracted: Vec<String> = Vec::new();
    let mut cleaned = text.to_string();

    for pattern in REASONING_BLOCKS.iter() {
        extracted.extend(pattern.find_iter(&cleaned).map(|m| m.as_str().to_string()));
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }

    if strict {
        extracted.extend(
            REASONING_PREFIX
                .find_iter(&cleaned)
                .map(|m| m.as_str().to_string()),
        );
        cleaned = REASONING_PREFIX.replace_all(&cleaned, "").into_owned();
    }

    let cleaned = EXTRA_BLANK_LINES
        .replace_all(&cleaned, "\n\n")
        .trim()
        .to_string();

    let reasoning = extracted.join("\n\n").trim().to_string();

    SanitizedOutput {
        was_modified: cleaned != text.trim(),
        text: cleaned,
        extracted_reasoning: (!reasoning.is_empty()).then_some(reasoning),
    }
}
