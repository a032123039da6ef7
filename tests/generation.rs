use assert_fs::prelude::*;
use llmstxt_engine::{
    ArtifactName, Config, GenerationError, GenerationOutput, GenerationRequest, HeuristicBackend,
    LinkStyle, LlmClient, LocalExpander, LocalMaterialSource, MaterialSource, ModelSettings,
    Orchestrator, RegexExtractor, RunStatus, artifacts, build_repo_digest,
};
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

const REPO_URL: &str = "https://github.com/acme/widgets";

fn checkout(temp: &assert_fs::TempDir) -> assert_fs::fixture::ChildPath {
    let repo = temp.child("repo");
    repo.child("README.md")
        .write_str("# Widgets\n\nMakes widgets fast.\n\n## Install\n\ncargo add widgets\n")
        .unwrap();
    repo.child("docs/getting-started.md")
        .write_str("Run `widgets new` to begin.")
        .unwrap();
    repo.child("docs/api/client.md")
        .write_str("The Client type talks to the widget server.")
        .unwrap();
    repo.child("Cargo.toml")
        .write_str("[package]\nname = \"widgets\"\n\n[dependencies]\nserde = \"1\"\n")
        .unwrap();
    repo.child("src/main.rs").write_str("fn main() {}").unwrap();
    repo.child("src/lib.rs").write_str("pub fn make() {}").unwrap();
    repo
}

fn config(temp: &assert_fs::TempDir) -> Config {
    Config::builder()
        .output_dir(temp.path().join("out"))
        .allowed_root(temp.path())
        .enable_ctx(true)
        .build()
        .unwrap()
}

fn orchestrator(temp: &assert_fs::TempDir) -> Orchestrator {
    let repo = checkout(temp);
    let source = Arc::new(LocalMaterialSource::new(repo.path()));
    let backend = HeuristicBackend::new(LinkStyle::Blob).unwrap();

    Orchestrator::new(config(temp), source, backend)
        .unwrap()
        .with_expander(Arc::new(LocalExpander::new(repo.path())))
}

#[test]
fn generates_all_artifacts_for_local_checkout() {
    let temp = assert_fs::TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp);

    let record = orchestrator.generate(REPO_URL).unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert!(record.error_message.is_none());
    assert_eq!(record.artifacts.len(), 4);

    let llms = record.artifact(ArtifactName::LlmsTxt).unwrap();
    let text = std::fs::read_to_string(&llms.path).unwrap();
    assert!(text.starts_with("<!-- Generated via fallback path (no LM). -->"));
    assert!(text.contains("# Widgets"));
    assert!(text.contains("> Makes widgets fast."));
    assert!(text.contains(
        "(https://github.com/acme/widgets/blob/main/docs/getting-started.md)"
    ));
    assert_eq!(llms.hash, artifacts::sha256_file(&llms.path).unwrap());

    let json = record.artifact(ArtifactName::LlmsJson).unwrap();
    let payload: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json.path).unwrap()).unwrap();
    assert_eq!(payload["project"]["name"], "Widgets");
    assert_eq!(payload["project"]["summary"], "Makes widgets fast.");

    let full = record.artifact(ArtifactName::LlmsFull).unwrap();
    let full = std::fs::read_to_string(&full.path).unwrap();
    assert!(full.contains("--- docs/getting-started.md ---\nRun `widgets new` to begin."));
    assert!(full.contains("--- docs/api/client.md ---"));

    let ctx = record.artifact(ArtifactName::LlmsCtx).unwrap();
    let ctx = std::fs::read_to_string(&ctx.path).unwrap();
    assert!(ctx.starts_with("<project title=\"Widgets\""));
    assert!(ctx.contains("The Client type talks to the widget server."));
}

#[test]
fn completed_artifacts_are_readable_through_the_store() {
    let temp = assert_fs::TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp);
    let record = orchestrator.generate(REPO_URL).unwrap();
    let store = orchestrator.store();

    let head =
        artifacts::read_artifact_chunk(store, &record.run_id, ArtifactName::LlmsTxt, 0, 4).unwrap();
    assert_eq!(head, "<!--");

    let size = usize::try_from(record.artifact(ArtifactName::LlmsTxt).unwrap().size_bytes).unwrap();
    let past_end =
        artifacts::read_artifact_chunk(store, &record.run_id, ArtifactName::LlmsTxt, size, 10)
            .unwrap();
    assert!(past_end.is_empty());

    let preview =
        artifacts::read_resource_text(store, &record.run_id, ArtifactName::LlmsTxt, 10).unwrap();
    assert!(preview.ends_with("\n... (content truncated)"));

    let scanned = artifacts::scan_artifacts(&temp.path().join("out"));
    let names: Vec<String> = scanned
        .iter()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(
        names,
        vec![
            "acme/widgets/widgets-llms-ctx.txt",
            "acme/widgets/widgets-llms-full.txt",
            "acme/widgets/widgets-llms.txt",
        ]
    );
}

struct Unreachable;

impl LlmClient for Unreachable {
    fn configure(&mut self, _settings: &ModelSettings) -> Result<(), GenerationError> {
        Err(GenerationError::Connectivity(
            "Could not connect to model server".to_string(),
        ))
    }

    fn generate(
        &mut self,
        _request: &GenerationRequest<'_>,
    ) -> Result<GenerationOutput, GenerationError> {
        unreachable!("configure always fails")
    }
}

#[test]
fn failed_run_reports_failure_on_read() {
    let temp = assert_fs::TempDir::new().unwrap();
    let repo = checkout(&temp);
    let orchestrator = Orchestrator::new(
        config(&temp),
        Arc::new(LocalMaterialSource::new(repo.path())),
        Unreachable,
    )
    .unwrap();

    let err = orchestrator.generate(REPO_URL).unwrap_err();
    assert!(err.to_string().contains("Could not connect"));

    let run = orchestrator.store().list_runs(1).remove(0);
    assert_eq!(run.status, RunStatus::Failed);

    let text =
        artifacts::read_resource_text(orchestrator.store(), &run.run_id, ArtifactName::LlmsTxt, 100)
            .unwrap();
    assert!(text.starts_with("Failed: "));
    assert!(text.contains("Could not connect"));
    assert!(!temp.path().join("out/acme").exists());
}

#[test]
fn concurrent_submissions_all_complete() {
    let temp = assert_fs::TempDir::new().unwrap();
    let orchestrator = Arc::new(orchestrator(&temp));

    let ids: Vec<String> = (0..4)
        .map(|_| orchestrator.submit(REPO_URL).unwrap().run_id)
        .collect();

    let deadline = Instant::now() + Duration::from_secs(30);
    while Instant::now() < deadline
        && !ids.iter().all(|id| {
            orchestrator
                .store()
                .get_run(id)
                .is_ok_and(|run| run.status.is_terminal())
        })
    {
        thread::sleep(Duration::from_millis(20));
    }

    for id in &ids {
        let run = orchestrator.store().get_run(id).unwrap();
        assert_eq!(run.status, RunStatus::Completed, "run {id}: {:?}", run.error_message);
    }
    assert_eq!(orchestrator.store().list_runs(10).len(), 4);
}

#[test]
fn digest_of_local_checkout_is_stable() {
    let temp = assert_fs::TempDir::new().unwrap();
    let repo = checkout(&temp);
    let source = LocalMaterialSource::new(repo.path());

    let material = source.fetch(REPO_URL).unwrap();
    let first = build_repo_digest(&material, "Widgets", &RegexExtractor);
    let second = build_repo_digest(&source.fetch(REPO_URL).unwrap(), "Widgets", &RegexExtractor);
    assert_eq!(first.digest_id, second.digest_id);

    let mut reversed = material.clone();
    reversed.file_tree = material.file_tree.lines().rev().collect::<Vec<_>>().join("\n");
    let third = build_repo_digest(&reversed, "Widgets", &RegexExtractor);
    assert_eq!(first.digest_id, third.digest_id);

    assert_eq!(first.entry_points, vec!["src/main.rs".to_string()]);
    assert_eq!(first.test_coverage_hint, "no_tests_detected");
}
