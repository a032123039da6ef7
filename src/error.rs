use crate::retry::ErrorClass;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the llmstxt-engine library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Template rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// A run id that the store has never seen (or has already evicted).
    #[error("Run ID {run_id} not found")]
    RunNotFound {
        /// The requested run id
        run_id: String,
    },

    /// A status change that the run lifecycle does not allow.
    #[error("Run {run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Run id
        run_id: String,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Output directory resolves outside the allowlisted root.
    #[error("Path {path} is not within allowed root {allowed_root}")]
    OutputDirNotAllowed {
        /// Offending path
        path: PathBuf,
        /// Configured root
        allowed_root: PathBuf,
    },

    /// Repository URL is not a recognised GitHub URL.
    #[error("Unrecognized GitHub URL: '{url}'")]
    InvalidRepoUrl {
        /// The rejected URL
        url: String,
    },

    /// The generation backend could not be reached.
    #[error("LLM backend is unavailable: {message}")]
    Connectivity {
        /// Error message
        message: String,
    },

    /// The generation backend returned an error.
    #[error("Generation failed ({class}): {message}")]
    Generation {
        /// Classification of the failure
        class: ErrorClass,
        /// Raw backend message
        message: String,
    },

    /// An optional capability was requested but is not installed.
    #[error("Capability '{name}' is not available")]
    CapabilityUnavailable {
        /// Capability name
        name: String,
    },

    /// A background thread could not be started.
    #[error("Failed to start worker thread: {message}")]
    Worker {
        /// Error message
        message: String,
    },

    /// An artifact is not attached to the run.
    #[error("Artifact {name} not found in run {run_id}")]
    ArtifactNotFound {
        /// Run id
        run_id: String,
        /// Artifact name
        name: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        // tera keeps the useful part of the message in the source chain
        let mut message = source.to_string();
        let mut cause = std::error::Error::source(&source);
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }
        Self::Template {
            template: template.into(),
            message,
        }
    }

    /// Creates a not-found error for a run id.
    #[must_use]
    pub fn run_not_found(run_id: impl Into<String>) -> Self {
        Self::RunNotFound {
            run_id: run_id.into(),
        }
    }

    /// Creates an invalid repository URL error.
    #[must_use]
    pub fn invalid_repo_url(url: impl Into<String>) -> Self {
        Self::InvalidRepoUrl { url: url.into() }
    }

    /// Creates a connectivity error.
    #[must_use]
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    /// Creates a generation error with its classification.
    #[must_use]
    pub fn generation(class: ErrorClass, message: impl Into<String>) -> Self {
        Self::Generation {
            class,
            message: message.into(),
        }
    }

    /// Creates an error for a missing optional capability.
    #[must_use]
    pub fn capability_unavailable(name: impl Into<String>) -> Self {
        Self::CapabilityUnavailable { name: name.into() }
    }

    /// Creates an error for a thread that failed to spawn.
    #[must_use]
    pub fn worker(source: &std::io::Error) -> Self {
        Self::Worker {
            message: source.to_string(),
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if the requested run does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RunNotFound { .. })
    }

    /// Returns true if this is an output containment violation.
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(self, Self::OutputDirNotAllowed { .. })
    }
}

impl From<tera::Error> for Error {
    fn from(e: tera::Error) -> Self {
        Self::template("unknown", e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("test message");
        assert!(err.is_config());
        assert!(err.to_string().contains("test message"));
    }

    #[test]
    fn test_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io("/tmp/test.txt", io_err);
        assert!(err.is_io());
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[test]
    fn test_run_not_found() {
        let err = Error::run_not_found("missing");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Run ID missing not found");
    }

    #[test]
    fn test_generation_error_mentions_class() {
        let err = Error::generation(ErrorClass::ContextLength, "context_length_exceeded");
        assert!(err.to_string().contains("context_length"));
        assert!(err.to_string().contains("context_length_exceeded"));
    }

    #[test]
    fn test_error_clone() {
        let err = Error::connectivity("refused");
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }

    #[test]
    fn test_serialization_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }
}
