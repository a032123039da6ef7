use crate::{budget::ContextBudget, config::Config, material::RepositoryMaterial};
use tracing::debug;

const FILE_TREE_MARKER: &str = "... (trimmed file tree)";
const README_LABEL: &str = "README";
const PACKAGE_LABEL: &str = "package files";

const MIN_FILE_TREE_LINES: usize = 50;
const MIN_README_CHARS: usize = 1_000;
const MIN_PACKAGE_CHARS: usize = 1_200;
const MIN_SCALED_CHARS: usize = 500;
const CAP_RATIO: f64 = 0.5;
const TREE_RATIO: f64 = 0.6;
const MIN_SCALE: f64 = 0.2;

fn scaled(value: usize, ratio: f64) -> usize {
    (value as f64 * ratio).floor() as usize
}

/// Keeps whole lines only, so every remaining path stays resolvable.
fn trim_file_tree(file_tree: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = file_tree.lines().collect();
    if lines.len() <= max_lines {
        return file_tree.to_string();
    }
    let mut out = lines[..max_lines].join("\n");
    out.push('\n');
    out.push_str(FILE_TREE_MARKER);
    out
}

/// Cuts `content` so that the result, marker included, is at most
/// `max_chars` characters.
fn trim_text(content: &str, max_chars: usize, label: &str) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let marker = format!("\n... (trimmed {label})");
    let keep = max_chars.saturating_sub(marker.chars().count());
    let cut = content
        .char_indices()
        .nth(keep)
        .map_or(content.len(), |(idx, _)| idx);

    let mut out = String::with_capacity(cut + marker.len());
    out.push_str(&content[..cut]);
    out.push_str(&marker);
    out
}

/// Shrinks oversized material with a fixed ladder.
///
/// 1. File tree to `max(50, 0.6 * max_file_tree_lines)` lines.
/// 2. README to `max(1000, 0.5 * max_readme_chars)` characters and package
///    text to `max(1200, 0.5 * max_package_chars)` characters.
/// 3. When the budget is still over, both texts are scaled by
///    `clamp(available / estimated, 0.2, 1.0)`.
///
/// The input is not modified. Callers recompute the budget afterwards
/// instead of compacting the result a second time.
#[must_use]
pub fn compact_material(
    material: &RepositoryMaterial,
    budget: &ContextBudget,
    config: &Config,
) -> RepositoryMaterial {
    let tree_lines = scaled(config.max_file_tree_lines, TREE_RATIO).max(MIN_FILE_TREE_LINES);
    let readme_chars = scaled(config.max_readme_chars, CAP_RATIO).max(MIN_README_CHARS);
    let package_chars = scaled(config.max_package_chars, CAP_RATIO).max(MIN_PACKAGE_CHARS);

    let mut compacted = RepositoryMaterial {
        file_tree: trim_file_tree(&material.file_tree, tree_lines),
        readme_content: trim_text(&material.readme_content, readme_chars, README_LABEL),
        package_files: trim_text(&material.package_files, package_chars, PACKAGE_LABEL),
        ..material.clone()
    };

    let estimated = budget.estimated_prompt_tokens;
    let available = budget.available_tokens;
    if estimated > available && available > 0 {
        let factor = (available as f64 / estimated.max(1) as f64).clamp(MIN_SCALE, 1.0);
        let readme_len = compacted.readme_content.chars().count();
        let package_len = compacted.package_files.chars().count();

        compacted.readme_content = trim_text(
            &compacted.readme_content,
            scaled(readme_len, factor).max(MIN_SCALED_CHARS),
            README_LABEL,
        );
        compacted.package_files = trim_text(
            &compacted.package_files,
            scaled(package_len, factor).max(MIN_SCALED_CHARS),
            PACKAGE_LABEL,
        );
        debug!(factor, "Scaled README and package text to budget");
    }

    debug!(
        tree_lines = compacted.file_count(),
        readme_chars = compacted.readme_content.len(),
        package_chars = compacted.package_files.len(),
        "Compacted repository material"
    );

    compacted
}
