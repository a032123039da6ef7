//! The language model capability and the lock that serializes access to it.

use crate::{
    config::ModelSettings,
    digest::RepoDigest,
    error::Error,
    material::RepositoryMaterial,
    retry::classify_generation_error,
};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Failure reported by an [`LlmClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The backend could not be reached at all.
    #[error("{0}")]
    Connectivity(String),
    /// The backend answered with an error.
    #[error("{0}")]
    Failed(String),
}

impl From<GenerationError> for Error {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Connectivity(message) => Self::connectivity(message),
            GenerationError::Failed(message) => {
                Self::generation(classify_generation_error(&message), message)
            }
        }
    }
}

/// Everything a backend may use to produce one document.
///
/// Model backends normally only need `prompt`; heuristic backends can work
/// from the material and digest directly.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Rendered prompt
    pub prompt: &'a str,
    /// Human-facing project name
    pub project_name: &'a str,
    /// Material the prompt was rendered from, possibly compacted
    pub material: &'a RepositoryMaterial,
    /// Digest of that material
    pub digest: &'a RepoDigest,
}

/// Result of a successful generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    /// The `llms.txt` markdown, before sanitizing
    pub text: String,
    /// Structured form of the document, when the backend has one
    pub payload: Option<serde_json::Value>,
}

impl GenerationOutput {
    /// Output with text only.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: None,
        }
    }
}

/// A language model backend.
///
/// Configuration is mutable state on the client, so callers must not
/// interleave `configure` and `generate` from different runs; see
/// [`GenerationLock`].
pub trait LlmClient: Send {
    /// Applies model settings before a generation.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Connectivity`] if the backend cannot be
    /// reached.
    fn configure(&mut self, settings: &ModelSettings) -> Result<(), GenerationError>;

    /// Produces an `llms.txt` document.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] describing the backend failure.
    fn generate(&mut self, request: &GenerationRequest<'_>)
        -> Result<GenerationOutput, GenerationError>;
}

/// Owns the client and hands it out to one caller at a time.
///
/// Holding the lock across `configure` and `generate` keeps one run's
/// settings from leaking into another run's request.
pub struct GenerationLock {
    client: Mutex<Box<dyn LlmClient>>,
}

impl GenerationLock {
    /// Wraps `client`.
    pub fn new(client: impl LlmClient + 'static) -> Self {
        Self {
            client: Mutex::new(Box::new(client)),
        }
    }

    /// Runs `f` with exclusive access to the client.
    pub fn with_client<T>(&self, f: impl FnOnce(&mut dyn LlmClient) -> T) -> T {
        let mut guard = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_mut())
    }
}

impl std::fmt::Debug for GenerationLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationLock").finish_non_exhaustive()
    }
}
