//! Repository skill graph built from a [`RepoDigest`].
//!
//! One `moc` (map of content) node links to a `concept` node per subsystem.
//! The graph is written as `repo.graph.json`, a force-layout view
//! `repo.force.json` and one markdown file per node under `nodes/`.

use crate::{
    artifacts::{write_json_artifact, write_text_artifact},
    digest::RepoDigest,
    error::{Error, Result},
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::Write as _,
    path::{Path, PathBuf},
};
use tracing::debug;

const SCHEMA_VERSION: &str = "1.0";
const MOC_ID: &str = "moc";
const MAX_SUBSYSTEM_NODES: usize = 20;
const MAX_MOC_LINKS: usize = 16;
const MAX_NODE_SYMBOLS: usize = 12;
const MAX_NODE_EVIDENCE: usize = 8;

static NON_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"));

/// Kind of graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphNodeType {
    /// Map of content, the graph's entry node
    Moc,
    /// One subsystem of the repository
    Concept,
    /// Recurring structure
    Pattern,
    /// Known pitfall
    Gotcha,
}

/// Where a node's claim can be checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNodeEvidence {
    /// Repository path
    pub path: String,
    /// First line, when known
    pub start_line: Option<usize>,
    /// Last line, when known
    pub end_line: Option<usize>,
    /// Artifact or digest the evidence came from
    pub artifact_ref: Option<String>,
    /// Quoted text
    pub excerpt: Option<String>,
}

impl GraphNodeEvidence {
    fn file(path: &str) -> Self {
        Self {
            path: path.to_string(),
            start_line: Some(1),
            end_line: Some(1),
            artifact_ref: Some("repo_digest".to_string()),
            excerpt: None,
        }
    }
}

/// One node of a [`RepoSkillGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoGraphNode {
    /// Slug, unique within the graph
    pub id: String,
    /// Display label
    pub label: String,
    /// Node kind
    #[serde(rename = "type")]
    pub node_type: GraphNodeType,
    /// One-line description
    pub description: String,
    /// Markdown body written to `nodes/<id>.md`
    pub content: String,
    /// Ids of linked nodes
    pub links: Vec<String>,
    /// Supporting paths
    pub evidence: Vec<GraphNodeEvidence>,
    /// Graph files that mention the node
    pub artifacts: Vec<String>,
    /// Free-form tags
    pub tags: Vec<String>,
}

/// Graph of a repository's subsystems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSkillGraph {
    /// Project name the graph describes
    pub topic: String,
    /// Nodes, `moc` first
    pub nodes: Vec<RepoGraphNode>,
    /// Format version of the JSON file
    pub schema_version: String,
    /// Build time
    pub generated_at: DateTime<Utc>,
}

impl RepoSkillGraph {
    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&RepoGraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// Node of a [`ForceGraphData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceGraphNode {
    /// Node id
    pub id: String,
    /// Display label
    pub label: String,
    /// Node kind
    #[serde(rename = "type")]
    pub node_type: GraphNodeType,
    /// Relative size
    pub val: f64,
}

/// Directed edge of a [`ForceGraphData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceGraphLink {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
}

/// Flat node/link lists for force-directed rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceGraphData {
    /// Nodes
    pub nodes: Vec<ForceGraphNode>,
    /// Links
    pub links: Vec<ForceGraphLink>,
}

/// Paths written by [`emit_graph_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphFiles {
    /// `repo.graph.json`
    pub graph_json: PathBuf,
    /// `repo.force.json`
    pub force_json: PathBuf,
    /// Directory of per-node markdown files
    pub nodes_dir: PathBuf,
}

fn slug(value: &str) -> String {
    let lowered = value.to_lowercase();
    let slug = NON_SLUG.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "node".to_string()
    } else {
        slug.to_string()
    }
}

/// Distinct ids for subsystems whose names slug to the same value.
fn unique_id(name: &str, taken: &mut HashSet<String>) -> String {
    let base = slug(name);
    let mut id = base.clone();
    let mut n = 2;
    while !taken.insert(id.clone()) {
        id = format!("{base}-{n}");
        n += 1;
    }
    id
}

/// Builds the graph for a digest. Node ids and links depend only on the
/// digest; `generated_at` is the build time.
#[must_use]
pub fn build_repo_graph(digest: &RepoDigest) -> RepoSkillGraph {
    let mut taken = HashSet::from([MOC_ID.to_string()]);
    let mut nodes = Vec::with_capacity(digest.subsystems.len().min(MAX_SUBSYSTEM_NODES) + 1);

    for subsystem in digest.subsystems.iter().take(MAX_SUBSYSTEM_NODES) {
        let symbols = subsystem
            .key_symbols
            .iter()
            .take(MAX_NODE_SYMBOLS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let content = format!(
            "---\ntitle: {name}\ntype: concept\ndescription: {summary}\n---\n\n{summary}\n\nKey symbols: {symbols}\n",
            name = subsystem.name,
            summary = subsystem.summary,
            symbols = if symbols.is_empty() { "n/a" } else { symbols.as_str() },
        );

        nodes.push(RepoGraphNode {
            id: unique_id(&subsystem.name, &mut taken),
            label: subsystem.name.clone(),
            node_type: GraphNodeType::Concept,
            description: subsystem.summary.clone(),
            content,
            links: Vec::new(),
            evidence: subsystem
                .paths
                .iter()
                .take(MAX_NODE_EVIDENCE)
                .map(|path| GraphNodeEvidence::file(path))
                .collect(),
            artifacts: vec![
                "repo.graph.json".to_string(),
                "repo.force.json".to_string(),
            ],
            tags: vec!["subsystem".to_string(), digest.primary_language.clone()],
        });
    }

    let moc_links: Vec<String> = nodes
        .iter()
        .take(MAX_MOC_LINKS)
        .map(|node| node.id.clone())
        .collect();

    let mut moc_content = format!(
        "# {}\n\nThis map summarizes repository structure and important exploration paths. \
         Start with subsystem nodes and follow evidence-backed links to inspect source files.\n\n\
         ## Domain Clusters\n",
        digest.topic
    );
    for id in &moc_links {
        let _ = writeln!(
            moc_content,
            "- Explore [[{id}]] to inspect related module behavior and evidence anchors."
        );
    }
    moc_content.push_str(
        "\n## Explorations Needed\n\
         - Which subsystems should be prioritized for onboarding documentation?\n\
         - Which dependencies are high-risk and need version guardrails?\n\
         - Where should integration tests be expanded based on current topology?\n",
    );

    let description = if digest.architecture_summary.is_empty() {
        "Repository map of content".to_string()
    } else {
        digest.architecture_summary.clone()
    };

    nodes.insert(
        0,
        RepoGraphNode {
            id: MOC_ID.to_string(),
            label: format!("{} Map", digest.topic),
            node_type: GraphNodeType::Moc,
            description,
            content: moc_content,
            links: moc_links,
            evidence: vec![GraphNodeEvidence {
                path: "repo_digest".to_string(),
                start_line: None,
                end_line: None,
                artifact_ref: Some(digest.digest_id.clone()),
                excerpt: None,
            }],
            artifacts: vec!["repo.graph.json".to_string()],
            tags: vec![MOC_ID.to_string(), digest.primary_language.clone()],
        },
    );

    RepoSkillGraph {
        topic: digest.topic.clone(),
        nodes,
        schema_version: SCHEMA_VERSION.to_string(),
        generated_at: Utc::now(),
    }
}

/// Flattens a graph into node and link lists.
#[must_use]
pub fn to_force_graph(graph: &RepoSkillGraph) -> ForceGraphData {
    let nodes = graph
        .nodes
        .iter()
        .map(|node| ForceGraphNode {
            id: node.id.clone(),
            label: node.label.clone(),
            node_type: node.node_type,
            val: if node.node_type == GraphNodeType::Moc { 3.0 } else { 1.5 },
        })
        .collect();

    let links = graph
        .nodes
        .iter()
        .flat_map(|node| {
            node.links.iter().map(|target| ForceGraphLink {
                source: node.id.clone(),
                target: target.clone(),
            })
        })
        .collect();

    ForceGraphData { nodes, links }
}

/// Writes `repo.graph.json`, `repo.force.json` and `nodes/<id>.md` under
/// `output_dir`.
///
/// # Errors
///
/// Returns an error if serialization or any write fails.
pub fn emit_graph_files(graph: &RepoSkillGraph, output_dir: &Path) -> Result<GraphFiles> {
    let files = GraphFiles {
        graph_json: output_dir.join("repo.graph.json"),
        force_json: output_dir.join("repo.force.json"),
        nodes_dir: output_dir.join("nodes"),
    };

    write_json_artifact(&files.graph_json, &serde_json::to_value(graph)?)?;
    write_json_artifact(&files.force_json, &serde_json::to_value(to_force_graph(graph))?)?;
    for node in &graph.nodes {
        write_text_artifact(
            &files.nodes_dir.join(format!("{}.md", node.id)),
            &node.content,
            false,
        )?;
    }

    debug!(
        "Wrote graph with {} node(s) to {}",
        graph.nodes.len(),
        output_dir.display()
    );
    Ok(files)
}

/// Reads a graph written by [`emit_graph_files`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_graph(path: &Path) -> Result<RepoSkillGraph> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Subsystem;

    fn subsystem(name: &str, paths: &[&str], symbols: &[&str]) -> Subsystem {
        Subsystem {
            name: name.to_string(),
            paths: paths.iter().map(ToString::to_string).collect(),
            summary: format!("{name} summary"),
            key_symbols: symbols.iter().map(ToString::to_string).collect(),
        }
    }

    fn digest(subsystems: Vec<Subsystem>) -> RepoDigest {
        RepoDigest {
            topic: "Widgets".to_string(),
            architecture_summary: "src/core: core summary".to_string(),
            primary_language: "rust".to_string(),
            subsystems,
            key_dependencies: Vec::new(),
            entry_points: vec!["src/main.rs".to_string()],
            test_coverage_hint: "no_tests_detected".to_string(),
            digest_id: "0123456789abcdef".to_string(),
        }
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("src/Core_Utils"), "src-core-utils");
        assert_eq!(slug("--"), "node");
    }

    #[test]
    fn test_moc_links_every_subsystem() {
        let graph = build_repo_graph(&digest(vec![
            subsystem("src/core", &["src/core/a.rs"], &["Engine"]),
            subsystem("docs", &["docs/guide.md"], &[]),
        ]));

        assert_eq!(graph.nodes.len(), 3);
        let moc = &graph.nodes[0];
        assert_eq!(moc.node_type, GraphNodeType::Moc);
        assert_eq!(moc.links, vec!["src-core", "docs"]);
        assert_eq!(moc.description, "src/core: core summary");
        assert!(moc.content.contains("- Explore [[docs]]"));

        let core = graph.node("src-core").unwrap();
        assert_eq!(core.evidence[0].path, "src/core/a.rs");
        assert!(core.content.contains("Key symbols: Engine"));
        assert!(graph.node("docs").unwrap().content.contains("Key symbols: n/a"));
    }

    #[test]
    fn test_colliding_slugs_get_distinct_ids() {
        let graph = build_repo_graph(&digest(vec![
            subsystem("src/a-b", &[], &[]),
            subsystem("src/a_b", &[], &[]),
            subsystem("moc", &[], &[]),
        ]));

        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["moc", "src-a-b", "src-a-b-2", "moc-2"]);
    }

    #[test]
    fn test_force_graph_sizes_and_links() {
        let graph = build_repo_graph(&digest(vec![subsystem("src/core", &[], &[])]));
        let force = to_force_graph(&graph);

        assert_eq!(force.nodes.len(), 2);
        assert!((force.nodes[0].val - 3.0).abs() < f64::EPSILON);
        assert!((force.nodes[1].val - 1.5).abs() < f64::EPSILON);
        assert_eq!(
            force.links,
            vec![ForceGraphLink {
                source: "moc".to_string(),
                target: "src-core".to_string(),
            }]
        );
    }

    #[test]
    fn test_emit_and_load() {
        let temp = assert_fs::TempDir::new().unwrap();
        let graph = build_repo_graph(&digest(vec![subsystem("src/core", &["src/core/a.rs"], &[])]));

        let files = emit_graph_files(&graph, &temp.path().join("graph")).unwrap();

        assert_eq!(load_graph(&files.graph_json).unwrap(), graph);
        let force: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files.force_json).unwrap()).unwrap();
        assert_eq!(force["nodes"][0]["type"], "moc");

        let node = std::fs::read_to_string(files.nodes_dir.join("src-core.md")).unwrap();
        assert!(node.starts_with("---\ntitle: src/core\n"));
        assert!(node.ends_with("Key symbols: n/a\n"));
        assert!(files.nodes_dir.join("moc.md").exists());
    }
}
