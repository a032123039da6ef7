//! Run lifecycle records and the in-memory store that tracks them.
//!
//! Records move `pending -> processing -> completed | failed` and never back.
//! The store keeps memory bounded with two policies, both of which only ever
//! evict terminal records:
//!
//! - TTL: terminal records not updated for `ttl_seconds` are dropped.
//! - Capacity: while the store holds more than `max_runs` records, the
//!   oldest terminal records are dropped first.

use crate::{
    config::Config,
    error::{Error, Result},
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    path::PathBuf,
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    thread::JoinHandle,
    time::Duration,
};
use tracing::{debug, info, warn};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Accepted, not started
    Pending,
    /// Worker is running
    Processing,
    /// Artifacts written
    Completed,
    /// Stopped with an error message
    Failed,
}

impl RunStatus {
    /// Returns true for `completed` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a record in this state may be moved to `next`.
    ///
    /// Staying in a non-terminal state is allowed so workers can attach
    /// partial results without changing status.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Pending | Self::Processing)
                | (
                    Self::Processing,
                    Self::Processing | Self::Completed | Self::Failed
                )
        )
    }

    /// Lowercase name as used in JSON.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The artifacts a run can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArtifactName {
    /// Curated link list
    #[serde(rename = "llms.txt")]
    LlmsTxt,
    /// Link list with linked documents inlined
    #[serde(rename = "llms-full.txt")]
    LlmsFull,
    /// Link list expanded into a context file
    #[serde(rename = "llms-ctx.txt")]
    LlmsCtx,
    /// Structured payload from the fallback path
    #[serde(rename = "llms.json")]
    LlmsJson,
    /// Repository graph with node content and evidence
    #[serde(rename = "repo.graph.json")]
    RepoGraph,
    /// Node/link view of the repository graph for force-directed layouts
    #[serde(rename = "repo.force.json")]
    ForceGraph,
}

impl ArtifactName {
    /// All names, in the order they are written.
    pub const ALL: [Self; 6] = [
        Self::LlmsTxt,
        Self::LlmsFull,
        Self::LlmsCtx,
        Self::LlmsJson,
        Self::RepoGraph,
        Self::ForceGraph,
    ];

    /// File name suffix, appended to the repository base name.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::LlmsTxt => "llms.txt",
            Self::LlmsFull => "llms-full.txt",
            Self::LlmsCtx => "llms-ctx.txt",
            Self::LlmsJson => "llms.json",
            Self::RepoGraph => "repo.graph.json",
            Self::ForceGraph => "repo.force.json",
        }
    }

    /// Graph files live in a `graph/` subdirectory and are not prefixed
    /// with the repository base name.
    #[must_use]
    pub const fn is_graph(self) -> bool {
        matches!(self, Self::RepoGraph | Self::ForceGraph)
    }

    /// Parses a name such as `llms-full.txt`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.suffix() == name)
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A file produced by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Which artifact this is
    pub name: ArtifactName,
    /// Where it was written
    pub path: PathBuf,
    /// File size
    pub size_bytes: u64,
    /// SHA-256 of the contents, lowercase hex
    pub hash: String,
}

/// State of one generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// UUID v4
    pub run_id: String,
    /// Lifecycle state
    pub status: RunStatus,
    /// Files written so far
    pub artifacts: Vec<ArtifactRef>,
    /// Set when the run failed
    pub error_message: Option<String>,
    /// When the run was accepted
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// A fresh pending record with a random id.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            status: RunStatus::Pending,
            artifacts: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Looks up an attached artifact.
    #[must_use]
    pub fn artifact(&self, name: ArtifactName) -> Option<&ArtifactRef> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}

impl Default for RunRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial update applied by [`RunStore::update_run`].
///
/// There is no way to change a record's id through an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunUpdate {
    status: Option<RunStatus>,
    artifacts: Option<Vec<ArtifactRef>>,
    error_message: Option<Option<String>>,
}

impl RunUpdate {
    /// Moves the run to `processing`.
    #[must_use]
    pub fn processing() -> Self {
        Self::default().status(RunStatus::Processing)
    }

    /// Moves the run to `completed` with its artifacts.
    #[must_use]
    pub fn completed(artifacts: Vec<ArtifactRef>) -> Self {
        Self::default()
            .status(RunStatus::Completed)
            .artifacts(artifacts)
    }

    /// Moves the run to `failed` with a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::default()
            .status(RunStatus::Failed)
            .error_message(Some(message.into()))
    }

    /// Sets the status.
    #[must_use]
    pub fn status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Replaces the artifact list.
    #[must_use]
    pub fn artifacts(mut self, artifacts: Vec<ArtifactRef>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Sets or clears the error message.
    #[must_use]
    pub fn error_message(mut self, message: Option<String>) -> Self {
        self.error_message = Some(message);
        self
    }
}

/// Thread-safe registry of run records.
///
/// One mutex guards the whole map. Readers get clones, and updates replace
/// the stored record with a modified copy.
#[derive(Debug)]
pub struct RunStore {
    runs: Mutex<HashMap<String, RunRecord>>,
    max_runs: Option<usize>,
    ttl: Option<TimeDelta>,
    cleanup_interval: Option<Duration>,
}

impl RunStore {
    /// Creates a store. A value of 0 disables the matching policy.
    #[must_use]
    pub fn new(max_runs: usize, ttl_seconds: u64, cleanup_interval_seconds: u64) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            max_runs: (max_runs > 0).then_some(max_runs),
            ttl: (ttl_seconds > 0)
                .then(|| TimeDelta::try_seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)))
                .flatten(),
            cleanup_interval: (cleanup_interval_seconds > 0)
                .then(|| Duration::from_secs(cleanup_interval_seconds)),
        }
    }

    /// Creates a store with the retention settings from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_runs,
            config.ttl_seconds,
            config.cleanup_interval_seconds,
        )
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunRecord>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces a record, then applies the retention policies.
    pub fn put_run(&self, record: RunRecord) {
        let mut runs = self.lock();
        debug!(run_id = %record.run_id, status = %record.status, "Stored run");
        runs.insert(record.run_id.clone(), record);
        self.prune_locked(&mut runs, Utc::now());
    }

    /// Applies `update` to a copy of the record and stores the copy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] for unknown ids and
    /// [`Error::InvalidTransition`] when the status change is not allowed.
    pub fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<RunRecord> {
        let mut runs = self.lock();
        let existing = runs.get(run_id).ok_or_else(|| Error::run_not_found(run_id))?;

        let mut updated = existing.clone();
        if let Some(status) = update.status {
            if !existing.status.can_transition_to(status) {
                return Err(Error::InvalidTransition {
                    run_id: run_id.to_string(),
                    from: existing.status.to_string(),
                    to: status.to_string(),
                });
            }
            updated.status = status;
        }
        if let Some(artifacts) = update.artifacts {
            updated.artifacts = artifacts;
        }
        if let Some(message) = update.error_message {
            updated.error_message = message;
        }
        updated.updated_at = Utc::now();

        debug!(run_id, from = %existing.status, to = %updated.status, "Updated run");
        runs.insert(run_id.to_string(), updated.clone());
        self.prune_locked(&mut runs, updated.updated_at);
        Ok(updated)
    }

    /// Returns a copy of the record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] for unknown or evicted ids.
    pub fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        self.lock()
            .get(run_id)
            .cloned()
            .ok_or_else(|| Error::run_not_found(run_id))
    }

    /// Up to `limit` records, most recently updated first.
    #[must_use]
    pub fn list_runs(&self, limit: usize) -> Vec<RunRecord> {
        let mut all: Vec<RunRecord> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        all.truncate(limit);
        all
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Applies the retention policies now. Returns the number of evictions.
    pub fn prune_expired(&self) -> usize {
        let mut runs = self.lock();
        self.prune_locked(&mut runs, Utc::now())
    }

    fn prune_locked(&self, runs: &mut HashMap<String, RunRecord>, now: DateTime<Utc>) -> usize {
        let mut removed = 0;

        if let Some(ttl) = self.ttl {
            let cutoff = now - ttl;
            let before = runs.len();
            runs.retain(|_, run| !(run.status.is_terminal() && run.updated_at < cutoff));
            removed += before - runs.len();
        }

        if let Some(max_runs) = self.max_runs {
            if runs.len() > max_runs {
                let mut candidates: Vec<(DateTime<Utc>, String)> = runs
                    .values()
                    .filter(|run| run.status.is_terminal())
                    .map(|run| (run.updated_at, run.run_id.clone()))
                    .collect();
                candidates.sort();

                for (_, run_id) in candidates {
                    if runs.len() <= max_runs {
                        break;
                    }
                    runs.remove(&run_id);
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            debug!(removed, remaining = runs.len(), "Evicted runs");
        }
        removed
    }

    /// Starts a background thread that calls [`prune_expired`] on every
    /// cleanup interval.
    ///
    /// Returns `Ok(None)` when the TTL or the interval is disabled. The
    /// thread only holds a weak reference and exits once the store is gone
    /// or the handle is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    ///
    /// [`prune_expired`]: Self::prune_expired
    pub fn start_cleanup_worker(self: &Arc<Self>) -> Result<Option<CleanupHandle>> {
        let (Some(interval), Some(_)) = (self.cleanup_interval, self.ttl) else {
            debug!("Run cleanup worker disabled");
            return Ok(None);
        };

        let store: Weak<Self> = Arc::downgrade(self);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("run-cleanup".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(store) = store.upgrade() else {
                        break;
                    };
                    let removed = store.prune_expired();
                    if removed > 0 {
                        info!("Pruned {} expired run(s)", removed);
                    }
                }
                debug!("Run cleanup worker stopped");
            })
            .map_err(|e| Error::worker(&e))?;

        info!(interval_secs = interval.as_secs(), "Started run cleanup worker");
        Ok(Some(CleanupHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        }))
    }
}

impl Default for RunStore {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Stops the cleanup thread when dropped.
#[derive(Debug)]
pub struct CleanupHandle {
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    /// Signals the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Run cleanup worker panicked");
            }
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
