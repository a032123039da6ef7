//! Optional expansion of `llms.txt` into `llms-full.txt` and `llms-ctx.txt`.
//!
//! Expansion inlines the documents an `llms.txt` links to. It needs access
//! to those documents, so it is a capability the caller may or may not
//! provide; the orchestrator checks [`ArtifactExpander::is_available`] and
//! skips the extra artifacts when it returns false.

use crate::{
    error::{Error, Result},
    material::RepositoryMaterial,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::HashSet,
    fs,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, warn};

const DEFAULT_MAX_BYTES_PER_FILE: usize = 800_000;
const DEFAULT_MAX_FILES: usize = 100;
const OPTIONAL_SECTION: &str = "Optional";

static PAGE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*-\s*\[(?P<title>.+?)\]\((?P<url>https?://[^\s)]+)\)(?::\s*(?P<note>.*))?")
        .expect("page link pattern is valid")
});

static GITHUB_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^https?://(?:raw\.githubusercontent\.com|github\.com)/(?P<owner>[^/]+)/(?P<repo>[^/]+)/(?:(?:blob|tree)/)?(?P<ref>[^/]+)/(?P<path>.+)$",
    )
    .expect("GitHub file pattern is valid")
});

/// Builds the expanded artifacts from a finished `llms.txt`.
pub trait ArtifactExpander: Send + Sync {
    /// Whether expansion can run at all right now.
    fn is_available(&self) -> bool;

    /// Builds `llms-ctx.txt`: linked documents outside `Optional`, wrapped
    /// in tags.
    ///
    /// # Errors
    ///
    /// Returns an error if expansion fails as a whole. Individual documents
    /// that cannot be read are reported inline.
    fn create_ctx(&self, llms_text: &str, material: &RepositoryMaterial) -> Result<String>;

    /// Builds `llms-full.txt`: every linked document, concatenated.
    ///
    /// # Errors
    ///
    /// Returns an error if expansion fails as a whole.
    fn build_full(&self, llms_text: &str, material: &RepositoryMaterial) -> Result<String>;
}

/// A link found in `llms.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    section: String,
    title: String,
    note: String,
    url: String,
}

/// A GitHub file URL split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GitHubFile {
    owner: String,
    repo: String,
    git_ref: String,
    path: String,
}

fn parse_github_file(url: &str) -> Option<GitHubFile> {
    let caps = GITHUB_FILE.captures(url)?;
    Some(GitHubFile {
        owner: caps["owner"].to_string(),
        repo: caps["repo"].to_string(),
        git_ref: caps["ref"].to_string(),
        path: caps["path"].to_string(),
    })
}

fn parse_links(llms_text: &str) -> Vec<Link> {
    let mut section = String::new();
    let mut links = Vec::new();

    for line in llms_text.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            section = heading.trim().to_string();
            continue;
        }
        if let Some(caps) = PAGE_LINK.captures(line) {
            links.push(Link {
                section: section.clone(),
                title: caps["title"].trim().to_string(),
                note: caps
                    .name("note")
                    .map_or("", |m| m.as_str())
                    .trim()
                    .trim_end_matches('.')
                    .to_string(),
                url: caps["url"].trim().to_string(),
            });
        }
    }
    links
}

fn xml_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Expands links against a local checkout of the repository.
///
/// Only links into the repository the material describes are inlined;
/// anything else is skipped.
#[derive(Debug, Clone)]
pub struct LocalExpander {
    root_dir: PathBuf,
    max_bytes_per_file: usize,
    max_files: usize,
}

impl LocalExpander {
    /// Creates an expander reading from `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            max_bytes_per_file: DEFAULT_MAX_BYTES_PER_FILE,
            max_files: DEFAULT_MAX_FILES,
        }
    }

    /// Caps how much of each document is inlined.
    #[must_use]
    pub const fn max_bytes_per_file(mut self, bytes: usize) -> Self {
        self.max_bytes_per_file = bytes;
        self
    }

    /// Caps how many documents are inlined.
    #[must_use]
    pub const fn max_files(mut self, files: usize) -> Self {
        self.max_files = files;
        self
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::capability_unavailable(format!(
                "local expander ({})",
                self.root_dir.display()
            )))
        }
    }

    /// Reads a repository-relative file, refusing paths that climb out of
    /// the checkout.
    fn read_document(&self, relative: &str) -> Result<String> {
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::OutputDirNotAllowed {
                path: relative.to_path_buf(),
                allowed_root: self.root_dir.clone(),
            });
        }

        let path = self.root_dir.join(relative);
        let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        if bytes.len() > self.max_bytes_per_file {
            let mut text = String::from_utf8_lossy(&bytes[..self.max_bytes_per_file]).into_owned();
            text.push_str("\n[truncated]\n");
            Ok(text)
        } else {
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    /// Links into this repository, deduplicated, capped at `max_files`.
    fn resolvable_links(
        &self,
        llms_text: &str,
        material: &RepositoryMaterial,
    ) -> Vec<(Link, GitHubFile)> {
        let expected = crate::material::owner_repo_from_url(&material.repo_url).ok();
        let mut seen = HashSet::new();

        parse_links(llms_text)
            .into_iter()
            .filter_map(|link| parse_github_file(&link.url).map(|file| (link, file)))
            .filter(|(_, file)| {
                expected.as_ref().is_none_or(|(owner, repo)| {
                    owner.eq_ignore_ascii_case(&file.owner) && repo.eq_ignore_ascii_case(&file.repo)
                })
            })
            .filter(|(_, file)| seen.insert(file.clone()))
            .take(self.max_files)
            .collect()
    }

    fn document_or_error(&self, file: &GitHubFile) -> String {
        self.read_document(&file.path).unwrap_or_else(|e| {
            warn!("Could not inline {}: {}", file.path, e);
            format!(
                "[fetch-error] {}/{}/{}@{} :: {}",
                file.owner, file.repo, file.path, file.git_ref, e
            )
        })
    }
}

impl ArtifactExpander for LocalExpander {
    fn is_available(&self) -> bool {
        self.root_dir.is_dir()
    }

    fn create_ctx(&self, llms_text: &str, material: &RepositoryMaterial) -> Result<String> {
        self.ensure_available()?;
        let title = llms_text
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .unwrap_or("Project")
            .trim();
        let summary = llms_text
            .lines()
            .find_map(|line| line.strip_prefix("> "))
            .unwrap_or("")
            .trim();

        let mut out = format!(
            "<project title=\"{}\" summary=\"{}\">\n",
            xml_attr(title),
            xml_attr(summary)
        );

        let mut current: Option<String> = None;
        let links = self.resolvable_links(llms_text, material);
        for (link, file) in links
            .iter()
            .filter(|(link, _)| link.section != OPTIONAL_SECTION)
        {
            if current.as_deref() != Some(link.section.as_str()) {
                if let Some(section) = current.take() {
                    out.push_str(&format!("</{}>\n", section.to_lowercase().replace(' ', "_")));
                }
                out.push_str(&format!("<{}>\n", link.section.to_lowercase().replace(' ', "_")));
                current = Some(link.section.clone());
            }
            out.push_str(&format!(
                "<doc title=\"{}\" desc=\"{}\">\n{}\n</doc>\n",
                xml_attr(&link.title),
                xml_attr(&link.note),
                self.document_or_error(file).trim_end()
            ));
        }
        if let Some(section) = current {
            out.push_str(&format!("</{}>\n", section.to_lowercase().replace(' ', "_")));
        }
        out.push_str("</project>");

        debug!("Built llms-ctx from {} linked document(s)", links.len());
        Ok(out)
    }

    fn build_full(&self, llms_text: &str, material: &RepositoryMaterial) -> Result<String> {
        self.ensure_available()?;
        let blocks: Vec<String> = self
            .resolvable_links(llms_text, material)
            .iter()
            .map(|(_, file)| {
                format!(
                    "--- {} ---\n{}\n",
                    file.path.trim_start_matches('/'),
                    self.document_or_error(file)
                )
            })
            .collect();

        debug!("Built llms-full from {} linked document(s)", blocks.len());
        Ok(format!(
            "# llms-full\n> Built from a local checkout. Large files may be truncated.\n\n{}",
            blocks.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    const LLMS: &str = "# Widgets\n\
        \n\
        > Makes widgets.\n\
        \n\
        ## Docs\n\
        - [Install](https://github.com/acme/widgets/blob/main/docs/install.md): install & quickstart.\n\
        - [Install again](https://github.com/acme/widgets/blob/main/docs/install.md): duplicate.\n\
        - [Elsewhere](https://github.com/other/thing/blob/main/README.md): docs page.\n\
        \n\
        ## Optional\n\
        - [Changelog](https://raw.githubusercontent.com/acme/widgets/main/CHANGELOG.md): version history.\n";

    fn material() -> RepositoryMaterial {
        RepositoryMaterial {
            repo_url: "https://github.com/acme/widgets".to_string(),
            file_tree: String::new(),
            readme_content: String::new(),
            package_files: String::new(),
            default_branch: "main".to_string(),
            is_private: false,
        }
    }

    #[test]
    fn test_parse_links_tracks_sections() {
        let links = parse_links(LLMS);
        assert_eq!(links.len(), 4);
        assert_eq!(links[0].section, "Docs");
        assert_eq!(links[0].note, "install & quickstart");
        assert_eq!(links[3].section, "Optional");
    }

    #[test]
    fn test_parse_github_file() {
        let file = parse_github_file("https://raw.githubusercontent.com/acme/widgets/dev/a/b.md")
            .unwrap();
        assert_eq!(file.git_ref, "dev");
        assert_eq!(file.path, "a/b.md");
        assert!(parse_github_file("https://example.com/a.md").is_none());
    }

    #[test]
    fn test_build_full_inlines_repo_documents() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("docs/install.md").write_str("pip install widgets").unwrap();
        temp.child("CHANGELOG.md").write_str("## 1.0").unwrap();

        let full = LocalExpander::new(temp.path())
            .build_full(LLMS, &material())
            .unwrap();

        assert!(full.starts_with("# llms-full\n"));
        assert!(full.contains("--- docs/install.md ---\npip install widgets\n"));
        assert!(full.contains("--- CHANGELOG.md ---\n## 1.0\n"));
        assert_eq!(full.matches("--- docs/install.md ---").count(), 1);
        assert!(!full.contains("other/thing"));
    }

    #[test]
    fn test_missing_documents_reported_inline() {
        let temp = assert_fs::TempDir::new().unwrap();
        let full = LocalExpander::new(temp.path())
            .build_full(LLMS, &material())
            .unwrap();

        assert!(full.contains("[fetch-error] acme/widgets/docs/install.md@main"));
    }

    #[test]
    fn test_large_documents_truncated() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("docs/install.md").write_str(&"x".repeat(100)).unwrap();

        let full = LocalExpander::new(temp.path())
            .max_bytes_per_file(10)
            .build_full(LLMS, &material())
            .unwrap();
        assert!(full.contains(&format!("{}\n[truncated]\n", "x".repeat(10))));
    }

    #[test]
    fn test_create_ctx_skips_optional() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("docs/install.md").write_str("pip install widgets").unwrap();
        temp.child("CHANGELOG.md").write_str("## 1.0").unwrap();

        let ctx = LocalExpander::new(temp.path())
            .create_ctx(LLMS, &material())
            .unwrap();

        assert!(ctx.starts_with("<project title=\"Widgets\" summary=\"Makes widgets.\">"));
        assert!(ctx.contains("<docs>\n<doc title=\"Install\" desc=\"install &amp; quickstart\">"));
        assert!(ctx.contains("pip install widgets"));
        assert!(!ctx.contains("## 1.0"));
        assert!(ctx.ends_with("</docs>\n</project>"));
    }

    #[test]
    fn test_traversal_is_refused() {
        let temp = assert_fs::TempDir::new().unwrap();
        let expander = LocalExpander::new(temp.path());
        assert!(expander.read_document("../secret.txt").is_err());
    }

    #[test]
    fn test_availability() {
        let temp = assert_fs::TempDir::new().unwrap();
        assert!(LocalExpander::new(temp.path()).is_available());
        let missing = LocalExpander::new(temp.path().join("missing"));
        assert!(!missing.is_available());
        assert!(matches!(
            missing.build_full(LLMS, &material()),
            Err(Error::CapabilityUnavailable { .. })
        ));
    }
}
