//! Structural digest of repository material.
//!
//! Material is split into chunks, each chunk is reduced to a capsule, and the
//! capsules are folded into one [`RepoDigest`]. Every step sorts its inputs,
//! so the same material always yields the same digest and `digest_id`.

use crate::{extract::SymbolExtractor, material::RepositoryMaterial};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

const README_CHUNK: &str = "README.md";
const PACKAGE_CHUNK: &str = "package_files.txt";

const CAPSULE_SUMMARY_CHARS: usize = 180;
const SUBSYSTEM_SUMMARY_CHARS: usize = 280;
const ARCHITECTURE_SUMMARY_CHARS: usize = 500;
const MAX_CAPSULE_SYMBOLS: usize = 10;
const MAX_CAPSULE_DEPENDENCIES: usize = 20;
const MAX_SUBSYSTEM_PATHS: usize = 20;
const MAX_SUBSYSTEM_SYMBOLS: usize = 20;
const MAX_SUMMARY_SUBSYSTEMS: usize = 5;
const MAX_KEY_DEPENDENCIES: usize = 40;
const MAX_ENTRY_POINTS: usize = 20;
const ID_HEX_CHARS: usize = 16;

const EMPTY_DIGEST_ID: &str = "empty";
const EMPTY_SUMMARY: &str = "No repository content available.";
const UNKNOWN_LANGUAGE: &str = "unknown";
const HAS_TESTS: &str = "has_tests";
const NO_TESTS: &str = "no_tests_detected";

const ENTRY_POINT_PATTERNS: &[&str] = &[
    "**/main.*",
    "**/__main__.*",
    "**/index.*",
    "**/cli.*",
    "**/app.*",
];
const ENTRY_POINT_DIRS: &[&str] = &["/cmd/", "/bin/"];

static ENTRY_POINTS: Lazy<GlobSet> = Lazy::new(|| {
    let mut builder = GlobSetBuilder::new();
    for pattern in ENTRY_POINT_PATTERNS {
        match GlobBuilder::new(pattern).literal_separator(true).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!("Skipping entry point pattern '{}': {}", pattern, e),
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
});

/// A slice of repository material with its line span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoChunk {
    /// Repository-relative path, or a synthetic name for README/package text
    pub path: String,
    /// Chunk text
    pub content: String,
    /// First line, 1-based
    pub start_line: usize,
    /// Last line, inclusive
    pub end_line: usize,
}

/// Coarse role of a chunk, guessed from its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// Source code
    Code,
    /// Prose documentation
    Doc,
    /// Configuration or manifest
    Config,
    /// Test code
    Test,
}

impl ChunkType {
    /// Classifies a path.
    ///
    /// Test markers win over extensions, so `tests/fixtures.json` is a test.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let low = path.to_lowercase();
        if low.contains("/test") || low.contains("test_") || low.ends_with("_test.py") {
            Self::Test
        } else if [".md", ".rst", ".txt"].iter().any(|ext| low.ends_with(ext)) {
            Self::Doc
        } else if [".json", ".yaml", ".yml", ".toml", ".ini", ".cfg"]
            .iter()
            .any(|ext| low.ends_with(ext))
        {
            Self::Config
        } else {
            Self::Code
        }
    }
}

/// Per-chunk extraction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCapsule {
    /// First 16 hex chars of sha256(`path:start:end`)
    pub chunk_id: String,
    /// Source path
    pub path: String,
    /// Coarse role
    pub chunk_type: ChunkType,
    /// Flattened content, at most 180 chars plus `...`
    pub summary: String,
    /// Declared names
    pub key_symbols: Vec<String>,
    /// Referenced modules or packages
    pub dependencies: Vec<String>,
}

/// Capsules grouped under a two-segment path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subsystem {
    /// Path prefix such as `src/auth`
    pub name: String,
    /// Member paths, sorted
    pub paths: Vec<String>,
    /// Joined member summaries
    pub summary: String,
    /// Union of member symbols, sorted
    pub key_symbols: Vec<String>,
}

/// Structural summary of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDigest {
    /// Human-facing project name
    pub topic: String,
    /// Summary of the largest subsystems
    pub architecture_summary: String,
    /// Most frequent language by file extension
    pub primary_language: String,
    /// Subsystems, largest first
    pub subsystems: Vec<Subsystem>,
    /// Dependencies seen in any capsule
    pub key_dependencies: Vec<String>,
    /// Paths that look like program entry points
    pub entry_points: Vec<String>,
    /// `has_tests` or `no_tests_detected`
    pub test_coverage_hint: String,
    /// Order-independent id over the capsule ids
    pub digest_id: String,
}

impl RepoDigest {
    /// Returns true if the digest was built from no content at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digest_id == EMPTY_DIGEST_ID
    }
}

fn short_sha256(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(ID_HEX_CHARS);
    for byte in digest.iter().take(ID_HEX_CHARS / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

fn line_count(text: &str) -> usize {
    memchr::memchr_iter(b'\n', text.as_bytes()).count() + 1
}

/// Joins the non-blank trimmed lines with spaces and cuts at `max_chars`.
fn summarize(content: &str, max_chars: usize) -> String {
    let flat = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

fn language_from_path(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("py") => "python",
        Some("ts" | "tsx") => "typescript",
        Some("js") => "javascript",
        Some("rs") => "rust",
        _ => UNKNOWN_LANGUAGE,
    }
}

fn subsystem_name(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() >= 2 {
        parts[..2].join("/")
    } else {
        parts.first().map_or_else(|| "root".to_string(), |p| (*p).to_string())
    }
}

fn is_entry_point(path: &str) -> bool {
    let lower = path.to_lowercase();
    let rooted = format!("/{lower}");
    ENTRY_POINTS.is_match(&lower) || ENTRY_POINT_DIRS.iter().any(|dir| rooted.contains(dir))
}

/// Splits material into chunks.
///
/// Every non-blank file tree line becomes a one-line chunk whose content is
/// the path itself; README and package text become one chunk each.
#[must_use]
pub fn chunk_repository_material(material: &RepositoryMaterial) -> Vec<RepoChunk> {
    let mut paths: Vec<&str> = material
        .file_tree
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    paths.sort_unstable();

    let mut chunks: Vec<RepoChunk> = paths
        .into_iter()
        .map(|path| RepoChunk {
            path: path.to_string(),
            content: path.to_string(),
            start_line: 1,
            end_line: 1,
        })
        .collect();

    for (name, content) in [
        (README_CHUNK, &material.readme_content),
        (PACKAGE_CHUNK, &material.package_files),
    ] {
        if !content.is_empty() {
            chunks.push(RepoChunk {
                path: name.to_string(),
                content: content.clone(),
                start_line: 1,
                end_line: line_count(content),
            });
        }
    }

    chunks
}

/// Reduces each chunk to a capsule using `extractor` for symbols and
/// dependencies.
#[must_use]
pub fn extract_chunk_capsules(
    chunks: &[RepoChunk],
    extractor: &dyn SymbolExtractor,
) -> Vec<ChunkCapsule> {
    chunks
        .iter()
        .map(|chunk| {
            let extraction =
                extractor.extract(&chunk.content, MAX_CAPSULE_SYMBOLS, MAX_CAPSULE_DEPENDENCIES);
            ChunkCapsule {
                chunk_id: short_sha256(&format!(
                    "{}:{}:{}",
                    chunk.path, chunk.start_line, chunk.end_line
                )),
                path: chunk.path.clone(),
                chunk_type: ChunkType::from_path(&chunk.path),
                summary: summarize(&chunk.content, CAPSULE_SUMMARY_CHARS),
                key_symbols: extraction.symbols,
                dependencies: extraction.dependencies,
            }
        })
        .collect()
}

/// Folds capsules into a digest.
///
/// With no capsules the result is a fixed placeholder whose id is `empty`.
#[must_use]
pub fn reduce_capsules(capsules: &[ChunkCapsule], topic: &str) -> RepoDigest {
    if capsules.is_empty() {
        return RepoDigest {
            topic: topic.to_string(),
            architecture_summary: EMPTY_SUMMARY.to_string(),
            primary_language: UNKNOWN_LANGUAGE.to_string(),
            subsystems: Vec::new(),
            key_dependencies: Vec::new(),
            entry_points: Vec::new(),
            test_coverage_hint: NO_TESTS.to_string(),
            digest_id: EMPTY_DIGEST_ID.to_string(),
        };
    }

    let mut by_subsystem: BTreeMap<String, Vec<&ChunkCapsule>> = BTreeMap::new();
    // insertion order breaks ties between equally common languages
    let mut languages: Vec<(&'static str, usize)> = Vec::new();
    let mut dependencies: BTreeSet<&str> = BTreeSet::new();
    let mut entry_points: BTreeSet<&str> = BTreeSet::new();

    for capsule in capsules {
        by_subsystem
            .entry(subsystem_name(&capsule.path))
            .or_default()
            .push(capsule);

        let language = language_from_path(&capsule.path);
        match languages.iter_mut().find(|(lang, _)| *lang == language) {
            Some((_, count)) => *count += 1,
            None => languages.push((language, 1)),
        }

        dependencies.extend(capsule.dependencies.iter().map(String::as_str));

        if is_entry_point(&capsule.path) {
            entry_points.insert(&capsule.path);
        }
    }

    let primary_language = languages
        .iter()
        .fold(None::<(&str, usize)>, |best, &(lang, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((lang, count)),
        })
        .map_or(UNKNOWN_LANGUAGE, |(lang, _)| lang);

    let mut grouped: Vec<(String, Vec<&ChunkCapsule>)> = by_subsystem.into_iter().collect();
    grouped.sort_by(|(a_name, a), (b_name, b)| b.len().cmp(&a.len()).then_with(|| a_name.cmp(b_name)));

    let subsystems: Vec<Subsystem> = grouped
        .into_iter()
        .map(|(name, members)| {
            let paths: BTreeSet<&str> = members.iter().map(|c| c.path.as_str()).collect();
            let symbols: BTreeSet<&str> = members
                .iter()
                .flat_map(|c| c.key_symbols.iter().map(String::as_str))
                .collect();
            let joined = members
                .iter()
                .map(|c| c.summary.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            Subsystem {
                name,
                paths: paths.into_iter().take(MAX_SUBSYSTEM_PATHS).map(str::to_string).collect(),
                summary: summarize(&joined, SUBSYSTEM_SUMMARY_CHARS),
                key_symbols: symbols
                    .into_iter()
                    .take(MAX_SUBSYSTEM_SYMBOLS)
                    .map(str::to_string)
                    .collect(),
            }
        })
        .collect();

    let architecture_summary = summarize(
        &subsystems
            .iter()
            .take(MAX_SUMMARY_SUBSYSTEMS)
            .map(|s| format!("{}: {}", s.name, s.summary))
            .collect::<Vec<_>>()
            .join(" "),
        ARCHITECTURE_SUMMARY_CHARS,
    );

    let has_tests = capsules.iter().any(|c| c.chunk_type == ChunkType::Test);

    let mut ids: Vec<&str> = capsules.iter().map(|c| c.chunk_id.as_str()).collect();
    ids.sort_unstable();
    let digest_id = short_sha256(&ids.join("|"));

    debug!(
        capsules = capsules.len(),
        subsystems = subsystems.len(),
        primary_language,
        %digest_id,
        "Reduced capsules"
    );

    RepoDigest {
        topic: topic.to_string(),
        architecture_summary,
        primary_language: primary_language.to_string(),
        subsystems,
        key_dependencies: dependencies
            .into_iter()
            .take(MAX_KEY_DEPENDENCIES)
            .map(str::to_string)
            .collect(),
        entry_points: entry_points
            .into_iter()
            .take(MAX_ENTRY_POINTS)
            .map(str::to_string)
            .collect(),
        test_coverage_hint: if has_tests { HAS_TESTS } else { NO_TESTS }.to_string(),
        digest_id,
    }
}

/// Chunks, extracts and reduces `material` in one go.
#[must_use]
pub fn build_repo_digest(
    material: &RepositoryMaterial,
    topic: &str,
    extractor: &dyn SymbolExtractor,
) -> RepoDigest {
    let chunks = chunk_repository_material(material);
    let capsules = extract_chunk_capsules(&chunks, extractor);
    reduce_capsules(&capsules, topic)
}
