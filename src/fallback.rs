//! Heuristic `llms.txt` generation without a language model.
//!
//! Documentation-looking files are grouped into a fixed taxonomy, ranked by
//! name, and rendered with the same markdown template a model-backed run
//! would use. The structured payload is returned alongside so it can be
//! written as `llms.json`.

use crate::{
    client::{GenerationError, GenerationOutput, GenerationRequest, LlmClient},
    config::{LinkStyle, ModelSettings},
    material::{owner_repo_from_url, project_name},
    template::TemplateEngine,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

const FALLBACK_HEADER: &str = "<!-- Generated via fallback path (no LM). -->";
const MISSING_SUMMARY: &str = "Project overview unavailable.";
const MAX_SUMMARY_CHARS: usize = 280;
const MAX_LINKS_PER_SECTION: usize = 10;
const OPTIONAL_SECTION: &str = "Optional";

const REMEMBER: [&str; 3] = [
    "Start with Docs for install & onboarding",
    "Check Tutorials for end-to-end workflows",
    "Review API references before integrating",
];

static DOC_PAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(md|mdx|py|ipynb|js|ts|rst|txt|html)$").expect("doc page pattern is valid")
});

static README_PAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|/)README\.md$").expect("README pattern is valid"));

static INDEX_PAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|/)index(\.mdx?|\.html?)?$").expect("index pattern is valid")
});

static TITLE_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(md|rst|txt|py|ipynb|js|ts|html|mdx)$").expect("extension pattern is valid")
});

/// Section names in output order, each with the pattern that claims a page.
static TAXONOMY: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("Docs", r"(?i)(docs|guide|getting[-_ ]?started|quickstart|install|overview)"),
        ("Tutorials", r"(?i)(tutorial|example|how[-_ ]?to|cookbook|demos?)"),
        ("API", r"(?i)(api|reference|sdk|class|module)"),
        ("Concepts", r"(?i)(concept|architecture|design|faq)"),
        (
            OPTIONAL_SECTION,
            r"(?i)(contributing|changelog|release|security|license|benchmark)",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("taxonomy pattern is valid")))
    .collect()
});

static LLMS_JSON_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "llmsTxtDocument",
        "type": "object",
        "required": ["project", "remember", "sections"],
        "properties": {
            "project": {
                "type": "object",
                "required": ["name", "summary"],
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "summary": {"type": "string", "minLength": 1}
                }
            },
            "remember": {"type": "array", "minItems": 1, "items": {"type": "string"}},
            "sections": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["title", "links"],
                    "properties": {
                        "title": {"type": "string", "minLength": 1},
                        "links": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["title", "url", "note"],
                                "properties": {
                                    "title": {"type": "string"},
                                    "url": {"type": "string", "format": "uri"},
                                    "note": {"type": "string"}
                                }
                            }
                        }
                    }
                }
            }
        }
    })
});

/// One link in an `llms.txt` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocLink {
    /// Link text
    pub title: String,
    /// Target URL
    pub url: String,
    /// Short note after the link
    pub note: String,
}

/// A `## Title` block of links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSection {
    /// Heading text
    pub title: String,
    /// Links in display order
    pub links: Vec<DocLink>,
}

/// Project name and summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Project name
    pub name: String,
    /// One-paragraph summary
    pub summary: String,
}

/// Structured `llms.txt` document, written as `llms.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmsPayload {
    /// JSON schema describing this document
    pub schema: Value,
    /// Name and summary
    pub project: ProjectInfo,
    /// Reading advice bullets
    pub remember: Vec<String>,
    /// Link sections
    pub sections: Vec<LinkSection>,
}

struct Page {
    title: String,
    url: String,
    note: &'static str,
    /// Tenths, so ranking stays in integers.
    score: i64,
    path: String,
}

/// Title-cased page name from a path.
///
/// `docs/getting_started.md` becomes `Getting Started`; index pages take
/// their directory's name.
fn nicify_title(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    let base = TITLE_EXTENSION.replace(base, "");
    let mut title = project_name(&base);
    if title.is_empty() {
        title = path.to_string();
    }

    if INDEX_PAGE.is_match(path) {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        if parts.len() > 1 {
            title = project_name(parts[parts.len() - 2]);
        }
    }
    title
}

fn short_note(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    let has = |hints: &[&str]| hints.iter().any(|h| lower.contains(h));

    if has(&["getting-started", "quickstart", "install", "overview", "/readme"]) {
        "install & quickstart"
    } else if has(&["reference", "/api"]) {
        "API reference"
    } else if has(&["tutorial", "example", "how-to", "demo"]) {
        "worked example"
    } else if has(&["concept", "architecture", "faq"]) {
        "core concept"
    } else if has(&["changelog", "release"]) {
        "version history"
    } else if has(&["license"]) {
        "usage terms"
    } else if has(&["security"]) {
        "security policy"
    } else {
        "docs page"
    }
}

fn score(path: &str) -> i64 {
    let lower = path.to_lowercase();
    let has = |hints: &[&str]| hints.iter().any(|h| lower.contains(h));

    let mut score = 0;
    if has(&["quickstart", "getting-started", "install", "overview", "/readme"]) {
        score += 50;
    }
    if has(&["tutorial", "example", "how-to", "demo"]) {
        score += 30;
    }
    if INDEX_PAGE.is_match(&lower) {
        score += 20;
    }
    score - i64::try_from(lower.matches('/').count()).unwrap_or(i64::MAX)
}

/// Groups documentation-like files from `file_tree` into link sections.
///
/// Taxonomy sections come first in fixed order, then any remaining
/// top-level directory groups by name. Groups of one page are folded into
/// `Optional`.
#[must_use]
pub fn build_dynamic_buckets(
    owner: &str,
    repo: &str,
    file_tree: &str,
    default_branch: &str,
    link_style: LinkStyle,
) -> Vec<LinkSection> {
    let pages = file_tree
        .lines()
        .map(str::trim)
        .filter(|path| !path.is_empty() && DOC_PAGE.is_match(path))
        .map(|path| Page {
            title: if README_PAGE.is_match(path) {
                "README".to_string()
            } else {
                nicify_title(path)
            },
            url: link_style.file_url(owner, repo, default_branch, path),
            note: short_note(path),
            score: score(path),
            path: path.to_string(),
        });

    let mut buckets: BTreeMap<String, Vec<Page>> = BTreeMap::new();
    for page in pages {
        let section = TAXONOMY
            .iter()
            .find(|(_, pattern)| pattern.is_match(&page.path) || pattern.is_match(&page.title))
            .map_or_else(
                || {
                    let top = page.path.trim_matches('/').split('/').next().unwrap_or("");
                    if top.is_empty() {
                        "Misc".to_string()
                    } else {
                        project_name(top)
                    }
                },
                |(name, _)| (*name).to_string(),
            );
        buckets.entry(section).or_default().push(page);
    }

    for items in buckets.values_mut() {
        items.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.title.cmp(&b.title)));
        items.truncate(MAX_LINKS_PER_SECTION);
    }

    let is_reserved = |name: &str| TAXONOMY.iter().any(|(n, _)| *n == name);
    let singles: Vec<String> = buckets
        .iter()
        .filter(|(name, items)| !is_reserved(name) && items.len() <= 1)
        .map(|(name, _)| name.clone())
        .collect();
    for name in singles {
        if let Some(items) = buckets.remove(&name) {
            buckets
                .entry(OPTIONAL_SECTION.to_string())
                .or_default()
                .extend(items);
        }
    }

    let into_section = |title: String, items: Vec<Page>| LinkSection {
        title,
        links: items
            .into_iter()
            .map(|p| DocLink {
                title: p.title,
                url: p.url,
                note: p.note.to_string(),
            })
            .collect(),
    };

    let mut ordered = Vec::with_capacity(buckets.len());
    for (name, _) in TAXONOMY.iter() {
        if let Some(items) = buckets.remove(*name) {
            ordered.push(into_section((*name).to_string(), items));
        }
    }
    // BTreeMap iteration keeps the remaining groups sorted by name
    ordered.extend(
        buckets
            .into_iter()
            .map(|(name, items)| into_section(name, items)),
    );
    ordered
}

/// First paragraph of the README after its title, about 280 characters.
#[must_use]
pub fn summary_from_readme(readme: &str) -> String {
    let mut lines = readme
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .peekable();

    if lines.peek().is_some_and(|line| line.starts_with('#')) {
        lines.next();
    }

    let mut excerpt: Vec<&str> = Vec::new();
    for line in lines {
        if line.starts_with('#') {
            break;
        }
        excerpt.push(line);
        if excerpt.join(" ").chars().count() > MAX_SUMMARY_CHARS {
            break;
        }
    }

    let summary = excerpt.join(" ").trim().to_string();
    if summary.is_empty() {
        MISSING_SUMMARY.to_string()
    } else {
        summary
    }
}

/// Builds the structured document for a repository.
#[must_use]
pub fn fallback_payload(
    name: &str,
    owner: &str,
    repo: &str,
    file_tree: &str,
    readme: &str,
    default_branch: &str,
    link_style: LinkStyle,
) -> LlmsPayload {
    LlmsPayload {
        schema: LLMS_JSON_SCHEMA.clone(),
        project: ProjectInfo {
            name: name.to_string(),
            summary: summary_from_readme(readme),
        },
        remember: REMEMBER.iter().map(ToString::to_string).collect(),
        sections: build_dynamic_buckets(owner, repo, file_tree, default_branch, link_style),
    }
}

/// An [`LlmClient`] that never calls a model.
///
/// Useful offline and as a stand-in when no model endpoint is reachable.
pub struct HeuristicBackend {
    engine: TemplateEngine,
    link_style: LinkStyle,
    settings: Option<ModelSettings>,
}

impl HeuristicBackend {
    /// Creates a backend that links files in the given style.
    ///
    /// # Errors
    ///
    /// Returns an error if the markdown template fails to load.
    pub fn new(link_style: LinkStyle) -> crate::Result<Self> {
        Ok(Self {
            engine: TemplateEngine::new()?,
            link_style,
            settings: None,
        })
    }

    /// Renders `payload` as `llms.txt` markdown with the fallback header.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn render_markdown(&self, payload: &LlmsPayload) -> crate::Result<String> {
        let markdown = self.engine.render_llms_markdown(
            &payload.project.name,
            &payload.project.summary,
            &payload.remember,
            &payload.sections,
        )?;
        Ok(format!("{FALLBACK_HEADER}\n\n{markdown}"))
    }
}

impl LlmClient for HeuristicBackend {
    fn configure(&mut self, settings: &ModelSettings) -> Result<(), GenerationError> {
        self.settings = Some(settings.clone());
        Ok(())
    }

    #[instrument(skip_all, fields(repo_url = %request.material.repo_url))]
    fn generate(
        &mut self,
        request: &GenerationRequest<'_>,
    ) -> Result<GenerationOutput, GenerationError> {
        let material = request.material;
        let (owner, repo) = owner_repo_from_url(&material.repo_url)
            .map_err(|e| GenerationError::Failed(e.to_string()))?;

        let payload = fallback_payload(
            request.project_name,
            &owner,
            &repo,
            &material.file_tree,
            &material.readme_content,
            &material.default_branch,
            self.link_style,
        );
        let text = self
            .render_markdown(&payload)
            .map_err(|e| GenerationError::Failed(e.to_string()))?;
        let payload =
            serde_json::to_value(&payload).map_err(|e| GenerationError::Failed(e.to_string()))?;

        debug!(
            model = self.settings.as_ref().map_or("none", |s| s.model.as_str()),
            "Generated llms.txt heuristically"
        );
        Ok(GenerationOutput {
            text,
            payload: Some(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = "README.md\n\
        docs/getting-started.md\n\
        docs/guide/index.md\n\
        docs/api/client.md\n\
        examples/basic_usage.py\n\
        CHANGELOG.md\n\
        src/widgets/core.py\n\
        src/widgets/util.py\n\
        scripts/build.sh\n";

    fn titles(sections: &[LinkSection]) -> Vec<&str> {
        sections.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn test_nicify_title() {
        assert_eq!(nicify_title("docs/getting_started.md"), "Getting Started");
        assert_eq!(nicify_title("docs/user-guide/index.md"), "User Guide");
        assert_eq!(nicify_title("api.rst"), "Api");
    }

    #[test]
    fn test_short_notes() {
        assert_eq!(short_note("docs/quickstart.md"), "install & quickstart");
        assert_eq!(short_note("docs/api/client.md"), "API reference");
        assert_eq!(short_note("examples/demo.py"), "worked example");
        assert_eq!(short_note("LICENSE.txt"), "usage terms");
        assert_eq!(short_note("docs/misc.md"), "docs page");
    }

    #[test]
    fn test_buckets_follow_taxonomy() {
        let sections = build_dynamic_buckets("acme", "widgets", TREE, "main", LinkStyle::Blob);

        assert_eq!(titles(&sections), vec!["Docs", "Tutorials", "Optional", "Src"]);

        let docs = &sections[0];
        assert_eq!(docs.links[0].title, "Getting Started");
        assert_eq!(docs.links[0].note, "install & quickstart");
        assert_eq!(
            docs.links[0].url,
            "https://github.com/acme/widgets/blob/main/docs/getting-started.md"
        );

        // README and CHANGELOG both land in Optional
        let optional = &sections[2];
        assert_eq!(optional.links.len(), 2);
    }

    #[test]
    fn test_raw_link_style() {
        let sections =
            build_dynamic_buckets("acme", "widgets", "docs/intro.md", "dev", LinkStyle::Raw);
        assert_eq!(
            sections[0].links[0].url,
            "https://raw.githubusercontent.com/acme/widgets/dev/docs/intro.md"
        );
    }

    #[test]
    fn test_summary_from_readme() {
        let readme = "# Widgets\n\nMakes widgets.\nFast ones.\n\n## Install\n\npip install widgets";
        assert_eq!(summary_from_readme(readme), "Makes widgets. Fast ones.");
        assert_eq!(summary_from_readme(""), "Project overview unavailable.");
        assert_eq!(summary_from_readme("# Only a title"), "Project overview unavailable.");
    }

    #[test]
    fn test_summary_stops_after_limit() {
        let readme = (0..20)
            .map(|i| format!("Sentence number {i} is here to pad the paragraph out."))
            .collect::<Vec<_>>()
            .join("\n");
        let summary = summary_from_readme(&readme);
        let chars = summary.chars().count();

        assert!(chars > 280);
        assert!(chars < 400);
    }

    #[test]
    fn test_heuristic_backend_output() {
        let mut backend = HeuristicBackend::new(LinkStyle::Blob).unwrap();
        let material = crate::material::RepositoryMaterial {
            repo_url: "https://github.com/acme/widgets".to_string(),
            file_tree: TREE.to_string(),
            readme_content: "# Widgets\n\nMakes widgets.".to_string(),
            package_files: String::new(),
            default_branch: "main".to_string(),
            is_private: false,
        };
        let digest = crate::digest::reduce_capsules(&[], "Widgets");

        let out = backend
            .generate(&GenerationRequest {
                prompt: "",
                project_name: "Widgets",
                material: &material,
                digest: &digest,
            })
            .unwrap();

        assert!(out.text.starts_with("<!-- Generated via fallback path (no LM). -->\n\n# Widgets"));
        assert!(out.text.contains("> Makes widgets."));
        assert!(out.text.contains("- Start with Docs for install & onboarding"));

        let payload = out.payload.unwrap();
        assert_eq!(payload["project"]["name"], "Widgets");
        assert_eq!(payload["schema"]["title"], "llmsTxtDocument");
        assert_eq!(payload["sections"][0]["title"], "Docs");
    }

    #[test]
    fn test_heuristic_backend_rejects_non_github_url() {
        let mut backend = HeuristicBackend::new(LinkStyle::Blob).unwrap();
        let material = crate::material::RepositoryMaterial {
            repo_url: "file:///tmp/widgets".to_string(),
            file_tree: String::new(),
            readme_content: String::new(),
            package_files: String::new(),
            default_branch: "main".to_string(),
            is_private: false,
        };
        let digest = crate::digest::reduce_capsules(&[], "Widgets");

        let err = backend
            .generate(&GenerationRequest {
                prompt: "",
                project_name: "Widgets",
                material: &material,
                digest: &digest,
            })
            .unwrap_err();
        assert!(matches!(err, GenerationError::Failed(_)));
    }
}
