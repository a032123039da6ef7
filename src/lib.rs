//! # llmstxt-engine
//!
//! Budget-aware generation of `llms.txt` documentation artifacts from code
//! repositories.
//!
//! ## Features
//!
//! - Context window budgeting with deterministic compaction
//! - Bounded retries with shrinking budgets on context or payload errors
//! - Structural repository digests with stable, content-derived ids
//! - Concurrent run tracking with TTL and capacity eviction
//! - Atomic artifact writes, hashing and chunked reads
//! - Optional repository graph built from the digest
//!
//! ## Quick Start
//!
//! ```no_run
//! use llmstxt_engine::{Config, HeuristicBackend, LinkStyle, LocalMaterialSource, Orchestrator};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .output_dir("./artifacts")
//!     .allowed_root("./artifacts")
//!     .build()?;
//!
//! let source = Arc::new(LocalMaterialSource::new("."));
//! let backend = HeuristicBackend::new(LinkStyle::Blob)?;
//!
//! let record = Orchestrator::new(config, source, backend)?
//!     .generate("https://github.com/acme/widgets")?;
//! println!("{}", record.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! A run moves through these stages:
//! 1. **Material**: file tree, README and manifests from a [`MaterialSource`]
//! 2. **Budget**: token estimates against the context window, compacting when over
//! 3. **Digest**: subsystems, symbols and entry points reduced from the material
//! 4. **Generation**: the [`LlmClient`], retried on a shrinking budget
//! 5. **Artifacts**: sanitized output written atomically and recorded in the [`RunStore`]

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod compaction;
mod config;
mod digest;
mod error;
mod expand;
mod extract;
mod fallback;
mod graph;
mod material;
mod orchestrator;
mod retry;
mod runs;
mod sanitize;
mod security;
mod template;
mod token;

pub mod artifacts;
pub mod budget;

pub use budget::{BudgetDecision, ContextBudget, build_context_budget, validate_budget};
pub use client::{GenerationError, GenerationLock, GenerationOutput, GenerationRequest, LlmClient};
pub use compaction::compact_material;
pub use config::{Config, ConfigBuilder, LinkStyle, ModelSettings};
pub use digest::{
    ChunkCapsule, ChunkType, RepoChunk, RepoDigest, Subsystem, build_repo_digest,
    chunk_repository_material, extract_chunk_capsules, reduce_capsules,
};
pub use error::{Error, Result};
pub use expand::{ArtifactExpander, LocalExpander};
pub use extract::{Extraction, RegexExtractor, SymbolExtractor};
pub use fallback::{
    DocLink, HeuristicBackend, LinkSection, LlmsPayload, ProjectInfo, build_dynamic_buckets,
    fallback_payload, summary_from_readme,
};
pub use graph::{
    ForceGraphData, ForceGraphLink, ForceGraphNode, GraphFiles, GraphNodeEvidence, GraphNodeType,
    RepoGraphNode, RepoSkillGraph, build_repo_graph, emit_graph_files, load_graph, to_force_graph,
};
pub use material::{
    LocalMaterialSource, MaterialSource, RepositoryMaterial, owner_repo_from_url, project_name,
};
pub use orchestrator::{Orchestrator, preview_budget};
pub use retry::{ErrorClass, classify_generation_error, next_retry_budget};
pub use runs::{ArtifactName, ArtifactRef, CleanupHandle, RunRecord, RunStatus, RunStore, RunUpdate};
pub use sanitize::{SanitizedOutput, sanitize_final_output};
pub use security::validate_output_dir;
pub use template::TemplateEngine;
pub use token::{TokenEstimator, TokenizerKind, estimate_tokens};

/// Generates artifacts for one local checkout with the heuristic backend.
///
/// This is the shortest path from a repository to `llms.txt` when no model
/// is available.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The URL is not a GitHub repository URL
/// - The output directory escapes the allowed root
/// - The checkout cannot be read or artifacts cannot be written
///
/// # Examples
///
/// ```no_run
/// use llmstxt_engine::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let record = run(Config::default(), ".", "https://github.com/acme/widgets")?;
/// assert!(record.status.is_terminal());
/// # Ok(())
/// # }
/// ```
pub fn run(
    config: Config,
    root_dir: impl Into<std::path::PathBuf>,
    repo_url: &str,
) -> Result<RunRecord> {
    let root_dir = root_dir.into();
    let backend = HeuristicBackend::new(config.link_style)?;
    let source = std::sync::Arc::new(LocalMaterialSource::new(root_dir.clone()));
    let expander = std::sync::Arc::new(LocalExpander::new(root_dir));

    Orchestrator::new(config, source, backend)?
        .with_expander(expander)
        .generate(repo_url)
}
