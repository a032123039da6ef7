use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Resolves `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Makes `path` absolute, then canonicalizes its longest existing ancestor
/// so symlinks inside the root cannot point outside it.
fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| Error::io(path, e))?;
        cwd.join(path)
    };
    let normalized = normalize_lexically(&absolute);

    let mut existing = normalized.as_path();
    let mut rest: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            resolved.extend(rest.iter().rev());
            return Ok(resolved);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                existing = parent;
            }
            _ => return Ok(normalized),
        }
    }
}

/// Checks that `path` stays inside `allowed_root` and returns it resolved.
///
/// Neither path has to exist. Nothing is created.
///
/// # Errors
///
/// Returns [`Error::OutputDirNotAllowed`] if the resolved path escapes the
/// root, or an IO error if the working directory cannot be read.
pub fn validate_output_dir(path: &Path, allowed_root: &Path) -> Result<PathBuf> {
    let resolved = resolve(path)?;
    let root = resolve(allowed_root)?;

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        warn!(
            path = %resolved.display(),
            root = %root.display(),
            "Rejected output directory outside allowed root"
        );
        Err(Error::OutputDirNotAllowed {
            path: resolved,
            allowed_root: root,
        })
    }
}
