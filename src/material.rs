use crate::error::{Error, Result};
use ignore::{WalkBuilder, WalkState};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, instrument, trace, warn};

static GITHUB_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^
        (?:
            git@github\.com:
            (?P<owner_ssh>[^/]+)/(?P<repo_ssh>[^/]+?)(?:\.git)?
            |
            https?://github\.com/
            (?P<owner_http>[^/]+)/(?P<repo_http>[^/]+?)(?:\.git)?
        )
        (?:/.*)?
        $",
    )
    .expect("GitHub URL pattern is valid")
});

const README_CANDIDATES: &[&str] = &["README.md", "README.rst", "README.txt", "README"];

const PACKAGE_CANDIDATES: &[&str] = &[
    "pyproject.toml",
    "setup.cfg",
    "setup.py",
    "requirements.txt",
    "package.json",
    "Cargo.toml",
    "go.mod",
];

/// Raw inputs gathered for one repository.
///
/// A snapshot: compaction produces a new value instead of editing this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMaterial {
    /// Repository URL as given by the caller
    pub repo_url: String,
    /// Newline-separated relative paths
    pub file_tree: String,
    /// README text, empty when absent
    pub readme_content: String,
    /// Concatenated package manifests, each prefixed with `=== <name> ===`
    pub package_files: String,
    /// Default branch name
    pub default_branch: String,
    /// Whether the repository is private
    pub is_private: bool,
}

impl RepositoryMaterial {
    /// Number of non-blank entries in the file tree.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.file_tree
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count()
    }
}

/// Produces repository material for a URL.
///
/// Implementations may call a hosting API or read a local checkout.
pub trait MaterialSource: Send + Sync {
    /// Gathers material for `repo_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read.
    fn fetch(&self, repo_url: &str) -> Result<RepositoryMaterial>;
}

/// Returns `(owner, repo)` for https or SSH GitHub URLs.
///
/// # Errors
///
/// Returns [`Error::InvalidRepoUrl`] for anything else.
pub fn owner_repo_from_url(repo_url: &str) -> Result<(String, String)> {
    let caps = GITHUB_URL
        .captures(repo_url.trim())
        .ok_or_else(|| Error::invalid_repo_url(repo_url))?;

    let owner = caps
        .name("owner_http")
        .or_else(|| caps.name("owner_ssh"))
        .map(|m| m.as_str().to_string());
    let repo = caps
        .name("repo_http")
        .or_else(|| caps.name("repo_ssh"))
        .map(|m| m.as_str().to_string());

    match (owner, repo) {
        (Some(owner), Some(repo)) if is_path_segment(&owner) && is_path_segment(&repo) => {
            Ok((owner, repo))
        }
        _ => Err(Error::invalid_repo_url(repo_url)),
    }
}

/// Owner and repo become directory names under the output root, so each
/// must be exactly one normal path component.
fn is_path_segment(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !value.contains('\\')
}

/// Human-facing project name derived from a repository name.
///
/// `my-cool_repo` becomes `My Cool Repo`.
#[must_use]
pub fn project_name(repo: &str) -> String {
    repo.replace(['-', '_'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads repository material from a local checkout.
///
/// The walk honours `.gitignore` and skips hidden entries, so the file tree
/// matches what a hosting API would list for the default branch.
pub struct LocalMaterialSource {
    root_dir: PathBuf,
    default_branch: String,
    is_private: bool,
}

impl LocalMaterialSource {
    /// Creates a source rooted at `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            default_branch: "main".to_string(),
            is_private: false,
        }
    }

    /// Sets the branch reported in the material.
    #[must_use]
    pub fn default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Marks the repository as private.
    #[must_use]
    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    /// Lists relative file paths, sorted, with `/` separators.
    fn list_files(&self) -> Result<Vec<String>> {
        if !self.root_dir.is_dir() {
            return Err(Error::config(format!(
                "Root path is not a directory: {}",
                self.root_dir.display()
            )));
        }

        let paths = Arc::new(Mutex::new(Vec::new()));

        let walker = WalkBuilder::new(&self.root_dir)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .hidden(true)
            .follow_links(false)
            .threads(num_cpus::get())
            .build_parallel();

        walker.run(|| {
            let paths = Arc::clone(&paths);
            let root = self.root_dir.clone();
            Box::new(move |result| {
                match result {
                    Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                        let relative = pathdiff::diff_paths(entry.path(), &root)
                            .unwrap_or_else(|| entry.path().to_path_buf());
                        let relative = relative.to_string_lossy().replace('\\', "/");
                        trace!("Listed {}", relative);
                        paths
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(relative);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Walk error: {}", e),
                }
                WalkState::Continue
            })
        });

        let mut paths = Arc::try_unwrap(paths)
            .map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner))
            .unwrap_or_else(|arc| arc.lock().unwrap_or_else(PoisonError::into_inner).clone());

        // Sort for deterministic ordering
        paths.sort();
        Ok(paths)
    }

    fn read_optional(path: &Path) -> Result<Option<String>> {
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn read_readme(&self) -> Result<String> {
        for candidate in README_CANDIDATES {
            if let Some(content) = Self::read_optional(&self.root_dir.join(candidate))? {
                debug!("Using {} as README", candidate);
                return Ok(content);
            }
        }
        Ok(String::new())
    }

    fn read_packages(&self) -> Result<String> {
        let mut blobs = Vec::new();
        for candidate in PACKAGE_CANDIDATES {
            if let Some(content) = Self::read_optional(&self.root_dir.join(candidate))? {
                if !content.trim().is_empty() {
                    blobs.push(format!("=== {candidate} ===\n{content}"));
                }
            }
        }
        Ok(blobs.join("\n\n"))
    }
}

impl MaterialSource for LocalMaterialSource {
    #[instrument(skip(self), fields(root_dir = %self.root_dir.display()))]
    fn fetch(&self, repo_url: &str) -> Result<RepositoryMaterial> {
        let files = self.list_files()?;
        debug!("Listed {} files", files.len());

        Ok(RepositoryMaterial {
            repo_url: repo_url.to_string(),
            file_tree: files.join("\n"),
            readme_content: self.read_readme()?,
            package_files: self.read_packages()?,
            default_branch: self.default_branch.clone(),
            is_private: self.is_private,
        })
    }
}
