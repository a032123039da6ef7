//! Context window budgeting.
//!
//! A [`ContextBudget`] is a snapshot: every compaction or retry reduction
//! produces a fresh budget and a fresh [`BudgetDecision`].

use crate::{config::Config, material::RepositoryMaterial, token::TokenEstimator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Field names used as keys in [`ContextBudget::component_estimates`].
pub const FILE_TREE: &str = "file_tree";
/// README component key.
pub const README_CONTENT: &str = "readme_content";
/// Package manifests component key.
pub const PACKAGE_FILES: &str = "package_files";

/// Whether an estimated prompt fits the usable part of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetDecision {
    /// Fits as is.
    Approved,
    /// Too large, but close enough that compaction should make it fit.
    NeedsCompaction,
    /// Too large to rescue by compaction alone.
    Rejected,
}

/// Token accounting for one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Model context window
    pub max_context_tokens: usize,
    /// Tokens reserved for the answer
    pub reserved_output_tokens: usize,
    /// Fraction of the window kept free
    pub headroom_ratio: f64,
    /// Sum of the component estimates
    pub estimated_prompt_tokens: usize,
    /// `max - reserved - floor(max * headroom)`, never below zero
    pub available_tokens: usize,
    /// Decision computed from the two numbers above
    pub decision: BudgetDecision,
    /// Per-field estimates keyed by material field name
    pub component_estimates: BTreeMap<String, usize>,
}

impl ContextBudget {
    /// Returns true if the estimate fits without compaction.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.decision == BudgetDecision::Approved
    }
}

fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

fn trim_file_tree(tree: &str, max_lines: usize) -> String {
    if max_lines == 0 {
        return String::new();
    }
    let lines: Vec<&str> = tree.lines().collect();
    if lines.len() <= max_lines {
        return tree.to_string();
    }
    lines[..max_lines].join("\n")
}

/// Usable prompt tokens for a window.
#[must_use]
pub fn available_tokens(max_context: usize, reserved_output: usize, headroom_ratio: f64) -> usize {
    let headroom = (max_context as f64 * headroom_ratio).floor() as usize;
    max_context
        .saturating_sub(reserved_output)
        .saturating_sub(headroom)
}

/// Estimates how much of the context window `material` would use.
///
/// The configured caps are applied to a preview of each field before
/// estimating; `material` itself is left untouched.
#[must_use]
pub fn build_context_budget(
    config: &Config,
    estimator: &dyn TokenEstimator,
    material: &RepositoryMaterial,
) -> ContextBudget {
    let file_tree = trim_file_tree(&material.file_tree, config.max_file_tree_lines);
    let readme = truncate_chars(&material.readme_content, config.max_readme_chars);
    let packages = truncate_chars(&material.package_files, config.max_package_chars);

    let component_estimates: BTreeMap<String, usize> = [
        (FILE_TREE, estimator.estimate(&file_tree)),
        (README_CONTENT, estimator.estimate(readme)),
        (PACKAGE_FILES, estimator.estimate(packages)),
    ]
    .into_iter()
    .map(|(name, tokens)| (name.to_string(), tokens))
    .collect();

    let estimated_prompt_tokens = component_estimates.values().sum();

    let mut budget = ContextBudget {
        max_context_tokens: config.max_context_tokens,
        reserved_output_tokens: config.max_output_tokens,
        headroom_ratio: config.context_headroom_ratio,
        estimated_prompt_tokens,
        available_tokens: available_tokens(
            config.max_context_tokens,
            config.max_output_tokens,
            config.context_headroom_ratio,
        ),
        decision: BudgetDecision::Approved,
        component_estimates,
    };
    budget.decision = validate_budget(&budget, config.compaction_factor);

    debug!(
        estimated = budget.estimated_prompt_tokens,
        available = budget.available_tokens,
        decision = ?budget.decision,
        "Built context budget"
    );

    budget
}

/// Classifies a budget.
///
/// `compaction_factor` is how far over the available tokens an estimate may
/// be and still count as compactable (2.0 by default).
#[must_use]
pub fn validate_budget(budget: &ContextBudget, compaction_factor: f64) -> BudgetDecision {
    let estimated = budget.estimated_prompt_tokens;
    let available = budget.available_tokens;

    if estimated <= available {
        return BudgetDecision::Approved;
    }
    if available > 0 && (estimated as f64) <= available as f64 * compaction_factor {
        return BudgetDecision::NeedsCompaction;
    }
    BudgetDecision::Rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::estimate_tokens;
    use crate::token::TokenizerKind;

    fn config(max_context: usize, output: usize, headroom: f64) -> Config {
        Config::builder()
            .max_context_tokens(max_context)
            .max_output_tokens(output)
            .context_headroom_ratio(headroom)
            .max_file_tree_lines(200)
            .max_readme_chars(10_000)
            .max_package_chars(10_000)
            .build()
            .unwrap()
    }

    fn material(file_tree: String, readme: String, packages: String) -> RepositoryMaterial {
        RepositoryMaterial {
            repo_url: "https://github.com/acme/widgets".to_string(),
            file_tree,
            readme_content: readme,
            package_files: packages,
            default_branch: "main".to_string(),
            is_private: false,
        }
    }

    fn budget(estimated: usize, available: usize) -> ContextBudget {
        ContextBudget {
            max_context_tokens: 1000,
            reserved_output_tokens: 100,
            headroom_ratio: 0.1,
            estimated_prompt_tokens: estimated,
            available_tokens: available,
            decision: BudgetDecision::Approved,
            component_estimates: BTreeMap::new(),
        }
    }

    #[test]
    fn test_small_payload_is_approved() {
        let m = material("a.py\nb.py".into(), "small".into(), "pkg".into());
        let estimator = TokenizerKind::Simple.create();
        let b = build_context_budget(&config(1000, 200, 0.1), estimator.as_ref(), &m);

        assert_eq!(b.available_tokens, 700);
        assert_eq!(b.decision, BudgetDecision::Approved);
        assert_eq!(b.component_estimates.len(), 3);
        assert_eq!(
            b.estimated_prompt_tokens,
            b.component_estimates.values().sum::<usize>()
        );
    }

    #[test]
    fn test_oversized_payload_is_not_approved() {
        let tree = (0..1000).map(|i| format!("f{i}.py")).collect::<Vec<_>>().join("\n");
        let m = material(tree, "x".repeat(10_000), "y".repeat(10_000));
        let estimator = TokenizerKind::Simple.create();
        let b = build_context_budget(&config(1200, 100, 0.1), estimator.as_ref(), &m);

        assert_ne!(b.decision, BudgetDecision::Approved);
    }

    #[test]
    fn test_caps_applied_before_estimating() {
        let m = material(String::new(), "x".repeat(50_000), String::new());
        let estimator = TokenizerKind::Simple.create();
        let b = build_context_budget(&config(100_000, 100, 0.1), estimator.as_ref(), &m);

        assert_eq!(b.component_estimates[README_CONTENT], 2_500);
        // input untouched
        assert_eq!(m.readme_content.len(), 50_000);
    }

    #[test]
    fn test_file_tree_trimmed_to_line_cap() {
        let tree = (0..500).map(|i| format!("file_{i:04}.rs")).collect::<Vec<_>>().join("\n");
        let m = material(tree.clone(), String::new(), String::new());
        let estimator = TokenizerKind::Simple.create();
        let b = build_context_budget(&config(100_000, 100, 0.1), estimator.as_ref(), &m);

        let first_200 = tree.lines().take(200).collect::<Vec<_>>().join("\n");
        assert_eq!(b.component_estimates[FILE_TREE], estimate_tokens(&first_200));
    }

    #[test]
    fn test_available_never_negative() {
        assert_eq!(available_tokens(1000, 900, 0.5), 0);
        assert_eq!(available_tokens(1000, 200, 0.1), 700);
    }

    #[test]
    fn test_validate_budget_states() {
        assert_eq!(validate_budget(&budget(700, 700), 2.0), BudgetDecision::Approved);
        assert_eq!(validate_budget(&budget(0, 0), 2.0), BudgetDecision::Approved);
        assert_eq!(
            validate_budget(&budget(1400, 700), 2.0),
            BudgetDecision::NeedsCompaction
        );
        assert_eq!(validate_budget(&budget(1401, 700), 2.0), BudgetDecision::Rejected);
        assert_eq!(validate_budget(&budget(10, 0), 2.0), BudgetDecision::Rejected);
    }

    #[test]
    fn test_compaction_factor_is_configurable() {
        assert_eq!(
            validate_budget(&budget(2000, 700), 3.0),
            BudgetDecision::NeedsCompaction
        );
        assert_eq!(validate_budget(&budget(800, 700), 1.0), BudgetDecision::Rejected);
    }

    #[test]
    fn test_fitting_estimates_always_approved() {
        for available in [1, 10, 700, 5_000] {
            for estimated in [0, available / 2, available] {
                assert!(validate_budget(&budget(estimated, available), 2.0) == BudgetDecision::Approved);
            }
        }
    }
}
