//! Artifact files: naming, atomic writes, hashing and chunked reads.
//!
//! Artifacts live at `<output_root>/<owner>/<repo>/<base>-<suffix>`, where
//! `<base>` is the lowercased repository name with spaces replaced by `-`.

use crate::{
    error::{Error, Result},
    runs::{ArtifactName, ArtifactRef, RunStatus, RunStore},
};
use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use walkdir::WalkDir;

const NON_UTF8_MARKER: &str = "<Binary or non-UTF-8 content>";
const TRUNCATION_FOOTER: &str = "\n... (content truncated)";
const PROCESSING_MESSAGE: &str = "Processing...";
const HASH_BUFFER_BYTES: usize = 8 * 1024;

/// File name stem for a repository: `My Repo` becomes `my-repo`.
#[must_use]
pub fn artifact_base_name(repo: &str) -> String {
    repo.to_lowercase().replace(' ', "-")
}

/// Directory holding one repository's artifacts.
#[must_use]
pub fn artifact_dir(output_root: &Path, owner: &str, repo: &str) -> PathBuf {
    output_root.join(owner).join(repo)
}

/// Directory holding one repository's graph files.
#[must_use]
pub fn graph_dir(output_root: &Path, owner: &str, repo: &str) -> PathBuf {
    artifact_dir(output_root, owner, repo).join("graph")
}

/// Full path of one artifact.
#[must_use]
pub fn artifact_path(output_root: &Path, owner: &str, repo: &str, name: ArtifactName) -> PathBuf {
    if name.is_graph() {
        return graph_dir(output_root, owner, repo).join(name.suffix());
    }
    artifact_dir(output_root, owner, repo).join(format!(
        "{}-{}",
        artifact_base_name(repo),
        name.suffix()
    ))
}

/// URI of a run's artifact.
#[must_use]
pub fn resource_uri(run_id: &str, name: ArtifactName) -> String {
    format!("llmstxt://runs/{run_id}/{name}")
}

/// URI of an artifact file relative to the output root.
#[must_use]
pub fn artifact_resource_uri(relative_path: &Path) -> String {
    format!(
        "llmstxt://artifacts/{}",
        relative_path.to_string_lossy().replace('\\', "/")
    )
}

/// Writes a file atomically.
///
/// # Process
///
/// 1. Creates the parent directory
/// 2. Writes content to a sibling temporary file
/// 3. Syncs the temporary file to disk
/// 4. Renames it over the target
///
/// Readers never see a half-written artifact.
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    // Unique per write so concurrent runs for one repository never share it
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let temp_path = path.with_file_name(temp_name);

    let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;
    temp_file
        .write_all(content)
        .map_err(|e| Error::io(&temp_path, e))?;
    temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;
    drop(temp_file);

    fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Writes a text artifact with exactly one trailing newline.
///
/// With `stamp`, a `# Generated: <timestamp> UTC` line is appended after a
/// blank line.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_text_artifact(path: &Path, content: &str, stamp: bool) -> Result<()> {
    let mut text = content.trim_end().to_string();
    if stamp {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        text.push_str(&format!("\n\n# Generated: {now} UTC"));
    }
    text.push('\n');

    write_atomic(path, text.as_bytes())?;
    debug!("Wrote {} ({} bytes)", path.display(), text.len());
    Ok(())
}

/// Writes a JSON artifact, pretty-printed.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json_artifact(path: &Path, value: &serde_json::Value) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())?;
    debug!("Wrote {} ({} bytes)", path.display(), json.len());
    Ok(())
}

/// SHA-256 of a file, lowercase hex. Reads in fixed-size blocks.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; HASH_BUFFER_BYTES];

    loop {
        let read = file.read(&mut buffer).map_err(|e| Error::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

/// Describes an existing artifact file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn artifact_ref_from_path(name: ArtifactName, path: &Path) -> Result<ArtifactRef> {
    let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    Ok(ArtifactRef {
        name,
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        hash: sha256_file(path)?,
    })
}

/// Reads up to `max_chars` characters. Returns the text and whether more
/// was available.
///
/// Non-UTF-8 files yield a fixed marker and count as truncated.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_text_preview(path: &Path, max_chars: usize) -> Result<(String, bool)> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let Ok(text) = std::str::from_utf8(&bytes) else {
        return Ok((NON_UTF8_MARKER.to_string(), true));
    };

    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => Ok((text[..idx].to_string(), true)),
        None => Ok((text.to_string(), false)),
    }
}

fn status_message(status: RunStatus, error_message: Option<&str>) -> String {
    match status {
        RunStatus::Pending | RunStatus::Processing => PROCESSING_MESSAGE.to_string(),
        RunStatus::Failed => format!("Failed: {}", error_message.unwrap_or("Unknown error")),
        RunStatus::Completed => String::new(),
    }
}

/// Finds a completed run's artifact, or the status text to show instead.
fn completed_artifact(
    store: &RunStore,
    run_id: &str,
    name: ArtifactName,
) -> Result<std::result::Result<ArtifactRef, String>> {
    let run = store.get_run(run_id)?;
    if run.status != RunStatus::Completed {
        return Ok(Err(status_message(run.status, run.error_message.as_deref())));
    }
    run.artifact(name)
        .cloned()
        .map(Ok)
        .ok_or_else(|| Error::ArtifactNotFound {
            run_id: run_id.to_string(),
            name: name.to_string(),
        })
}

/// Reads an artifact of a completed run, truncated to `max_chars`.
///
/// Runs that are not completed yield `Processing...` or `Failed: <message>`.
///
/// # Errors
///
/// Returns an error for unknown runs, missing artifacts, or unreadable files.
pub fn read_resource_text(
    store: &RunStore,
    run_id: &str,
    name: ArtifactName,
    max_chars: usize,
) -> Result<String> {
    let artifact = match completed_artifact(store, run_id, name)? {
        Ok(artifact) => artifact,
        Err(message) => return Ok(message),
    };

    let (mut content, truncated) = read_text_preview(&artifact.path, max_chars)?;
    if truncated {
        content.push_str(TRUNCATION_FOOTER);
    }
    Ok(content)
}

/// Reads `limit` characters starting at byte `offset` of an artifact.
///
/// Returns an empty string once `offset` reaches the end of the file.
///
/// # Errors
///
/// Returns an error for unknown runs, missing artifacts, or unreadable files.
pub fn read_artifact_chunk(
    store: &RunStore,
    run_id: &str,
    name: ArtifactName,
    offset: usize,
    limit: usize,
) -> Result<String> {
    let artifact = match completed_artifact(store, run_id, name)? {
        Ok(artifact) => artifact,
        Err(message) => return Ok(message),
    };

    let path = artifact.path.as_path();
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    if offset >= bytes.len() {
        return Ok(String::new());
    }

    match std::str::from_utf8(&bytes[offset..]) {
        Ok(text) => Ok(text.chars().take(limit).collect()),
        Err(_) => Ok(NON_UTF8_MARKER.to_string()),
    }
}

/// Relative paths of all `*.txt` files under `root`, sorted.
///
/// A missing root yields an empty list.
#[must_use]
pub fn scan_artifacts(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "txt"))
        .filter_map(|entry| pathdiff::diff_paths(entry.path(), root))
        .collect();

    found.sort();
    info!("Found {} artifact(s) under {}", found.len(), root.display());
    found
}
