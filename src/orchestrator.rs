//! Generation runs from repository URL to artifacts on disk.

use crate::{
    artifacts::{
        artifact_dir, artifact_path, artifact_ref_from_path, graph_dir, write_json_artifact,
        write_text_artifact,
    },
    budget::{ContextBudget, build_context_budget},
    client::{GenerationLock, GenerationOutput, GenerationRequest, LlmClient},
    compaction::compact_material,
    config::Config,
    digest::build_repo_digest,
    error::{Error, Result},
    expand::ArtifactExpander,
    extract::{RegexExtractor, SymbolExtractor},
    graph::{build_repo_graph, emit_graph_files},
    material::{MaterialSource, RepositoryMaterial, owner_repo_from_url, project_name},
    retry::next_retry_budget,
    runs::{ArtifactName, ArtifactRef, RunRecord, RunStore, RunUpdate},
    sanitize::sanitize_final_output,
    security::validate_output_dir,
    template::TemplateEngine,
    token::TokenEstimator,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};
use tracing::{debug, info, instrument, warn};

/// Drives runs through `pending → processing → completed | failed`.
///
/// Run bookkeeping is concurrent, generation is not: every run takes the
/// same [`GenerationLock`] around `configure` + `generate`, so at most one
/// generation is in flight. There is no cancellation; a `generate` call
/// that never returns leaves its run in `processing`.
pub struct Orchestrator {
    config: Config,
    store: Arc<RunStore>,
    source: Arc<dyn MaterialSource>,
    lock: Arc<GenerationLock>,
    expander: Option<Arc<dyn ArtifactExpander>>,
    extractor: Arc<dyn SymbolExtractor>,
    estimator: Arc<dyn TokenEstimator>,
    engine: TemplateEngine,
}

/// What one successful generation produced before it is written out.
struct Generated {
    output: GenerationOutput,
    material: RepositoryMaterial,
    attempts: usize,
}

impl Orchestrator {
    /// Creates an orchestrator with its own run store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the built-in
    /// templates fail to load.
    pub fn new(
        config: Config,
        source: Arc<dyn MaterialSource>,
        client: impl LlmClient + 'static,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store: Arc::new(RunStore::from_config(&config)),
            estimator: config.tokenizer.create(),
            source,
            lock: Arc::new(GenerationLock::new(client)),
            expander: None,
            extractor: Arc::new(RegexExtractor),
            engine: TemplateEngine::new()?,
            config,
        })
    }

    /// Shares an existing run store instead of the private one.
    #[must_use]
    pub fn with_store(mut self, store: Arc<RunStore>) -> Self {
        self.store = store;
        self
    }

    /// Shares an existing generation lock, e.g. between orchestrators that
    /// wrap the same backend.
    #[must_use]
    pub fn with_lock(mut self, lock: Arc<GenerationLock>) -> Self {
        self.lock = lock;
        self
    }

    /// Enables `llms-ctx.txt` / `llms-full.txt` output.
    #[must_use]
    pub fn with_expander(mut self, expander: Arc<dyn ArtifactExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Replaces the symbol extraction strategy used for digests.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn SymbolExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// The run store.
    #[must_use]
    pub const fn store(&self) -> &Arc<RunStore> {
        &self.store
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accepts a run and starts it on a worker thread.
    ///
    /// The returned record is already in the store, so a status query for
    /// its id never misses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputDirNotAllowed`] before registering anything if
    /// the output directory escapes the allowed root, or an error if the
    /// worker thread cannot be spawned (the run is then marked failed).
    pub fn submit(self: &Arc<Self>, repo_url: &str) -> Result<RunRecord> {
        validate_output_dir(&self.config.output_dir, &self.config.allowed_root)?;

        let record = RunRecord::new();
        self.store.put_run(record.clone());
        info!("Accepted run {} for {}", record.run_id, repo_url);

        let this = Arc::clone(self);
        let run_id = record.run_id.clone();
        let url = repo_url.to_string();
        let spawned = thread::Builder::new()
            .name(format!("run-{}", &run_id[..8.min(run_id.len())]))
            .spawn(move || {
                // The outcome is recorded in the store.
                let _ = this.run_to_completion(&run_id, &url);
            });

        if let Err(e) = spawned {
            let err = Error::worker(&e);
            // Pending runs may only fail from processing.
            self.store
                .update_run(&record.run_id, RunUpdate::processing())?;
            self.mark_failed(&record.run_id, &err);
            return Err(err);
        }

        Ok(record)
    }

    /// Registers a run and executes it on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the error that failed the run. The failed record stays in
    /// the store.
    pub fn generate(&self, repo_url: &str) -> Result<RunRecord> {
        validate_output_dir(&self.config.output_dir, &self.config.allowed_root)?;

        let record = RunRecord::new();
        self.store.put_run(record.clone());
        self.run_to_completion(&record.run_id, repo_url)
    }

    /// Executes a registered run.
    ///
    /// Every failure marks the run failed before it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] for unknown ids,
    /// [`Error::InvalidTransition`] if the run already finished, or the
    /// error that failed the run.
    #[instrument(skip(self))]
    pub fn run_to_completion(&self, run_id: &str, repo_url: &str) -> Result<RunRecord> {
        self.store.update_run(run_id, RunUpdate::processing())?;

        match self.execute(repo_url) {
            Ok(artifacts) => {
                let record = self
                    .store
                    .update_run(run_id, RunUpdate::completed(artifacts))?;
                info!(
                    "Run {} completed with {} artifact(s)",
                    run_id,
                    record.artifacts.len()
                );
                Ok(record)
            }
            Err(e) => {
                self.mark_failed(run_id, &e);
                Err(e)
            }
        }
    }

    fn mark_failed(&self, run_id: &str, error: &Error) {
        warn!("Run {} failed: {}", run_id, error);
        if let Err(e) = self
            .store
            .update_run(run_id, RunUpdate::failed(error.to_string()))
        {
            warn!("Could not record failure of run {}: {}", run_id, e);
        }
    }

    fn execute(&self, repo_url: &str) -> Result<Vec<ArtifactRef>> {
        let (owner, repo) = owner_repo_from_url(repo_url)?;
        let output_root = validate_output_dir(&self.config.output_dir, &self.config.allowed_root)?;
        validate_output_dir(
            &artifact_dir(&output_root, &owner, &repo),
            &self.config.allowed_root,
        )?;
        let name = project_name(&repo);

        info!("Stage 1/3: Gathering repository material...");
        let material = self.source.fetch(repo_url)?;
        debug!(
            files = material.file_count(),
            readme_chars = material.readme_content.len(),
            "Fetched material"
        );

        info!("Stage 2/3: Generating llms.txt...");
        let generated = self.generate_with_retries(&material, &name)?;
        info!("Generated after {} attempt(s)", generated.attempts);

        info!("Stage 3/3: Writing artifacts...");
        let mut artifacts = self.write_artifacts(&output_root, &owner, &repo, &generated)?;
        if self.config.enable_repo_graph {
            artifacts.extend(self.write_graph(&output_root, &owner, &repo, &material, &name)?);
        }
        Ok(artifacts)
    }

    /// Budget, compact, digest and generate, stepping down the retry ladder
    /// on context-length and payload failures.
    ///
    /// A retry only shrinks material whose budget is still over the limit.
    /// Scaling keeps the ratio of estimate to available tokens, so material
    /// that was already approved is re-sent unchanged.
    fn generate_with_retries(
        &self,
        material: &RepositoryMaterial,
        project_name: &str,
    ) -> Result<Generated> {
        let mut budget = build_context_budget(&self.config, self.estimator.as_ref(), material);
        let mut working = material.clone();

        if !budget.is_approved() {
            working = compact_material(&working, &budget, &self.config);
            budget = build_context_budget(&self.config, self.estimator.as_ref(), &working);
            info!(
                "Compacted material: estimated={} available={} decision={:?}",
                budget.estimated_prompt_tokens, budget.available_tokens, budget.decision
            );
        }

        let settings = self.config.model_settings();
        let mut step = 0;
        loop {
            let digest = build_repo_digest(&working, project_name, self.extractor.as_ref());
            let prompt = self.engine.render_prompt(project_name, &working, &digest)?;
            let request = GenerationRequest {
                prompt: &prompt,
                project_name,
                material: &working,
                digest: &digest,
            };

            let attempt = self.lock.with_client(|client| {
                client.configure(&settings)?;
                client.generate(&request)
            });

            match attempt.map_err(Error::from) {
                Ok(output) => {
                    return Ok(Generated {
                        output,
                        material: working,
                        attempts: step + 1,
                    });
                }
                Err(Error::Generation { class, message }) if class.is_retryable() => {
                    let Some(next) = next_retry_budget(
                        &budget,
                        step,
                        &self.config.retry_reduction_steps,
                        self.config.compaction_factor,
                    ) else {
                        warn!("Retry budget exhausted after {} attempt(s)", step + 1);
                        return Err(Error::generation(class, message));
                    };
                    step += 1;
                    warn!(
                        "Generation failed ({}); retrying with reduced budget step={} estimated={} available={}",
                        class, step, next.estimated_prompt_tokens, next.available_tokens
                    );
                    working = compact_material(&working, &next, &self.config);
                    budget = next;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn write_artifacts(
        &self,
        output_root: &Path,
        owner: &str,
        repo: &str,
        generated: &Generated,
    ) -> Result<Vec<ArtifactRef>> {
        let sanitized = sanitize_final_output(&generated.output.text, true);
        if sanitized.was_modified {
            debug!("Removed reasoning from model output");
        }
        let llms_text = if sanitized.text.is_empty() {
            generated.output.text.as_str()
        } else {
            sanitized.text.as_str()
        };

        let path_for = |name| artifact_path(output_root, owner, repo, name);
        let mut written: Vec<(ArtifactName, PathBuf)> = Vec::new();

        let llms_path = path_for(ArtifactName::LlmsTxt);
        info!("Writing llms.txt to {}", llms_path.display());
        write_text_artifact(&llms_path, llms_text, self.config.stamp)?;
        written.push((ArtifactName::LlmsTxt, llms_path));

        if let Some(expander) = self.available_expander() {
            if self.config.enable_ctx {
                let path = path_for(ArtifactName::LlmsCtx);
                let ctx = expander.create_ctx(llms_text, &generated.material)?;
                write_text_artifact(&path, &ctx, self.config.stamp)?;
                written.push((ArtifactName::LlmsCtx, path));
            }
            if self.config.build_full {
                let path = path_for(ArtifactName::LlmsFull);
                let full = expander.build_full(llms_text, &generated.material)?;
                write_text_artifact(&path, &full, self.config.stamp)?;
                written.push((ArtifactName::LlmsFull, path));
            }
        }

        if let Some(payload) = &generated.output.payload {
            let path = path_for(ArtifactName::LlmsJson);
            write_json_artifact(&path, payload)?;
            info!("JSON payload written to {}", path.display());
            written.push((ArtifactName::LlmsJson, path));
        }

        written
            .iter()
            .map(|(name, path)| artifact_ref_from_path(*name, path))
            .collect()
    }

    /// Digest of the full material, so the graph does not depend on how
    /// far generation had to compact.
    fn write_graph(
        &self,
        output_root: &Path,
        owner: &str,
        repo: &str,
        material: &RepositoryMaterial,
        project_name: &str,
    ) -> Result<Vec<ArtifactRef>> {
        let digest = build_repo_digest(material, project_name, self.extractor.as_ref());
        let graph = build_repo_graph(&digest);
        let files = emit_graph_files(&graph, &graph_dir(output_root, owner, repo))?;
        info!(
            "Repository graph ({} nodes) written to {}",
            graph.nodes.len(),
            files.graph_json.display()
        );

        Ok(vec![
            artifact_ref_from_path(ArtifactName::RepoGraph, &files.graph_json)?,
            artifact_ref_from_path(ArtifactName::ForceGraph, &files.force_json)?,
        ])
    }

    fn available_expander(&self) -> Option<&Arc<dyn ArtifactExpander>> {
        let wanted = self.config.enable_ctx || self.config.build_full;
        match &self.expander {
            Some(expander) if wanted && expander.is_available() => Some(expander),
            Some(_) if wanted => {
                debug!("Artifact expander unavailable; skipping ctx/full output");
                None
            }
            _ => None,
        }
    }
}

/// The budget a run would start from, without generating anything.
///
/// Useful for previewing whether a repository needs compaction.
#[must_use]
pub fn preview_budget(config: &Config, material: &RepositoryMaterial) -> ContextBudget {
    build_context_budget(config, config.tokenizer.create().as_ref(), material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::GenerationError,
        config::ModelSettings,
        error::Error,
        retry::ErrorClass,
        runs::RunStatus,
    };
    use assert_fs::prelude::*;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use std::time::{Duration, Instant};

    const REPO_URL: &str = "https://github.com/acme/widgets";

    struct StaticSource;

    impl MaterialSource for StaticSource {
        fn fetch(&self, repo_url: &str) -> Result<RepositoryMaterial> {
            Ok(RepositoryMaterial {
                repo_url: repo_url.to_string(),
                file_tree: "README.md\nsrc/main.rs\nsrc/lib.rs\ndocs/guide.md".to_string(),
                readme_content: "# Widgets\n\nMakes widgets.".to_string(),
                package_files: "=== Cargo.toml ===\n[package]\nname = \"widgets\"".to_string(),
                default_branch: "main".to_string(),
                is_private: false,
            })
        }
    }

    /// README large enough to stay over a 500-token budget after compaction.
    struct LargeReadme;

    impl MaterialSource for LargeReadme {
        fn fetch(&self, repo_url: &str) -> Result<RepositoryMaterial> {
            Ok(RepositoryMaterial {
                readme_content: "widgets ".repeat(1_500),
                ..StaticSource.fetch(repo_url)?
            })
        }
    }

    /// Fails every call with `error`, counting calls.
    struct Failing {
        error: GenerationError,
        calls: Arc<AtomicUsize>,
    }

    impl LlmClient for Failing {
        fn configure(&mut self, _settings: &ModelSettings) -> std::result::Result<(), GenerationError> {
            Ok(())
        }

        fn generate(
            &mut self,
            _request: &GenerationRequest<'_>,
        ) -> std::result::Result<GenerationOutput, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    /// Fails the first `failures` calls with a context error, then answers.
    struct Recovering {
        failures: usize,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl LlmClient for Recovering {
        fn configure(&mut self, _settings: &ModelSettings) -> std::result::Result<(), GenerationError> {
            Ok(())
        }

        fn generate(
            &mut self,
            request: &GenerationRequest<'_>,
        ) -> std::result::Result<GenerationOutput, GenerationError> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.prompt.to_string());
            if prompts.len() <= self.failures {
                return Err(GenerationError::Failed("context_length_exceeded".into()));
            }
            Ok(GenerationOutput::text(format!(
                "<think>plan</think>\n# {}\n\n> Makes widgets.",
                request.project_name
            )))
        }
    }

    fn config(temp: &assert_fs::TempDir) -> Config {
        Config::builder()
            .output_dir(temp.path().join("out"))
            .allowed_root(temp.path())
            .build()
            .unwrap()
    }

    #[test]
    fn test_successful_run_writes_llms_txt() {
        let temp = assert_fs::TempDir::new().unwrap();
        let client = Recovering {
            failures: 0,
            prompts: Arc::default(),
        };
        let orchestrator = Orchestrator::new(config(&temp), Arc::new(StaticSource), client).unwrap();

        let record = orchestrator.generate(REPO_URL).unwrap();

        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.artifacts.len(), 1);
        let artifact = record.artifact(ArtifactName::LlmsTxt).unwrap();
        assert!(artifact.path.ends_with("acme/widgets/widgets-llms.txt"));

        let text = std::fs::read_to_string(&artifact.path).unwrap();
        assert_eq!(text, "# Widgets\n\n> Makes widgets.\n");
        assert_eq!(artifact.size_bytes, text.len() as u64);
    }

    #[test]
    fn test_retry_ladder_exhaustion_fails_run() {
        let temp = assert_fs::TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = Failing {
            error: GenerationError::Failed("context_length_exceeded".into()),
            calls: Arc::clone(&calls),
        };
        let orchestrator = Orchestrator::new(config(&temp), Arc::new(StaticSource), client).unwrap();

        let err = orchestrator.generate(REPO_URL).unwrap_err();

        assert!(matches!(
            err,
            Error::Generation {
                class: ErrorClass::ContextLength,
                ..
            }
        ));
        // One attempt plus one per reduction step.
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let runs = orchestrator.store().list_runs(10);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].error_message.as_deref().unwrap().contains("context_length_exceeded"));
    }

    #[test]
    fn test_retry_recovers_on_later_attempt() {
        let temp = assert_fs::TempDir::new().unwrap();
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let client = Recovering {
            failures: 1,
            prompts: Arc::clone(&prompts),
        };
        let orchestrator = Orchestrator::new(config(&temp), Arc::new(StaticSource), client).unwrap();

        let record = orchestrator.generate(REPO_URL).unwrap();

        assert_eq!(record.status, RunStatus::Completed);
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        // Material within budget is not shrunk by the reduced budget.
        assert_eq!(prompts[0], prompts[1]);
    }

    #[test]
    fn test_retry_shrinks_material_still_over_budget() {
        let temp = assert_fs::TempDir::new().unwrap();
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let client = Recovering {
            failures: 1,
            prompts: Arc::clone(&prompts),
        };
        let config = Config::builder()
            .output_dir(temp.path().join("out"))
            .allowed_root(temp.path())
            .max_context_tokens(1_000)
            .max_output_tokens(500)
            .context_headroom_ratio(0.0)
            .build()
            .unwrap();
        let orchestrator = Orchestrator::new(config, Arc::new(LargeReadme), client).unwrap();

        orchestrator.generate(REPO_URL).unwrap();

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].len() < prompts[0].len());
    }

    #[test]
    fn test_traversal_url_writes_nothing_outside_root() {
        let temp = assert_fs::TempDir::new().unwrap();
        let out = temp.path().join("out");
        let config = Config::builder().output_dir(&out).build().unwrap();
        let client = Recovering {
            failures: 0,
            prompts: Arc::default(),
        };
        let orchestrator = Orchestrator::new(config, Arc::new(StaticSource), client).unwrap();

        let err = orchestrator.generate("https://github.com/../escape").unwrap_err();

        assert!(matches!(err, Error::InvalidRepoUrl { .. }));
        assert!(!temp.path().join("escape").exists());
        assert!(!out.exists());
    }

    #[test]
    fn test_repo_graph_written_when_enabled() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder()
            .output_dir(temp.path().join("out"))
            .allowed_root(temp.path())
            .enable_repo_graph(true)
            .build()
            .unwrap();
        let client = Recovering {
            failures: 0,
            prompts: Arc::default(),
        };
        let orchestrator = Orchestrator::new(config, Arc::new(StaticSource), client).unwrap();

        let record = orchestrator.generate(REPO_URL).unwrap();

        let graph = record.artifact(ArtifactName::RepoGraph).unwrap();
        assert!(graph.path.ends_with("acme/widgets/graph/repo.graph.json"));
        assert!(record.artifact(ArtifactName::ForceGraph).is_some());

        let graph = crate::graph::load_graph(&graph.path).unwrap();
        assert_eq!(graph.topic, "Widgets");
        assert!(graph.node("moc").is_some());
        assert!(graph.node("src-main-rs").is_some());
        assert!(
            temp.path()
                .join("out/acme/widgets/graph/nodes/moc.md")
                .exists()
        );
    }

    #[test]
    fn test_connectivity_is_not_retried() {
        let temp = assert_fs::TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = Failing {
            error: GenerationError::Connectivity("connection refused".into()),
            calls: Arc::clone(&calls),
        };
        let orchestrator = Orchestrator::new(config(&temp), Arc::new(StaticSource), client).unwrap();

        let err = orchestrator.generate(REPO_URL).unwrap_err();

        assert!(matches!(err, Error::Connectivity { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rate_limit_is_not_retried() {
        let temp = assert_fs::TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = Failing {
            error: GenerationError::Failed("429 too many requests".into()),
            calls: Arc::clone(&calls),
        };
        let orchestrator = Orchestrator::new(config(&temp), Arc::new(StaticSource), client).unwrap();

        assert!(orchestrator.generate(REPO_URL).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disallowed_output_dir_rejected_before_registering() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder()
            .output_dir(temp.path().join("../escape"))
            .allowed_root(temp.path().join("root"))
            .build()
            .unwrap();
        let client = Recovering {
            failures: 0,
            prompts: Arc::default(),
        };
        let orchestrator = Orchestrator::new(config, Arc::new(StaticSource), client).unwrap();

        let err = orchestrator.generate(REPO_URL).unwrap_err();

        assert!(err.is_security_violation());
        assert!(orchestrator.store().is_empty());
        assert!(!temp.path().join("root").exists());
    }

    #[test]
    fn test_invalid_url_fails_run() {
        let temp = assert_fs::TempDir::new().unwrap();
        let client = Recovering {
            failures: 0,
            prompts: Arc::default(),
        };
        let orchestrator = Orchestrator::new(config(&temp), Arc::new(StaticSource), client).unwrap();

        let err = orchestrator.generate("not a url").unwrap_err();

        assert!(matches!(err, Error::InvalidRepoUrl { .. }));
        assert_eq!(
            orchestrator.store().list_runs(1)[0].status,
            RunStatus::Failed
        );
    }

    #[test]
    fn test_finished_run_cannot_be_rerun() {
        let temp = assert_fs::TempDir::new().unwrap();
        let client = Recovering {
            failures: 0,
            prompts: Arc::default(),
        };
        let orchestrator = Orchestrator::new(config(&temp), Arc::new(StaticSource), client).unwrap();
        let record = orchestrator.generate(REPO_URL).unwrap();

        let err = orchestrator
            .run_to_completion(&record.run_id, REPO_URL)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(
            orchestrator.store().get_run(&record.run_id).unwrap().status,
            RunStatus::Completed
        );
    }

    #[test]
    fn test_submit_registers_before_work() {
        let temp = assert_fs::TempDir::new().unwrap();
        let client = Recovering {
            failures: 0,
            prompts: Arc::default(),
        };
        let orchestrator =
            Arc::new(Orchestrator::new(config(&temp), Arc::new(StaticSource), client).unwrap());

        let record = orchestrator.submit(REPO_URL).unwrap();
        assert!(orchestrator.store().get_run(&record.run_id).is_ok());

        let deadline = Instant::now() + Duration::from_secs(10);
        let status = loop {
            let status = orchestrator.store().get_run(&record.run_id).unwrap().status;
            if status.is_terminal() || Instant::now() > deadline {
                break status;
            }
            thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(status, RunStatus::Completed);
    }

    #[test]
    fn test_preview_budget_small_material_is_approved() {
        let material = StaticSource.fetch(REPO_URL).unwrap();
        assert!(preview_budget(&Config::default(), &material).is_approved());
    }
}
