use crate::error::{Error, Result};
use crate::token::TokenizerKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MAX_CONTEXT_TOKENS: usize = 32_768;
const DEFAULT_MAX_OUTPUT_TOKENS: usize = 4_096;
const DEFAULT_HEADROOM_RATIO: f64 = 0.15;
const DEFAULT_MAX_FILE_TREE_LINES: usize = 1_200;
const DEFAULT_MAX_README_CHARS: usize = 24_000;
const DEFAULT_MAX_PACKAGE_CHARS: usize = 18_000;
const DEFAULT_RETRY_REDUCTION_STEPS: [f64; 2] = [0.70, 0.50];
const DEFAULT_COMPACTION_FACTOR: f64 = 2.0;
const DEFAULT_MAX_RUNS: usize = 200;
const DEFAULT_TTL_SECONDS: u64 = 60 * 60 * 24;
const DEFAULT_CLEANUP_INTERVAL_SECONDS: u64 = 300;
const DEFAULT_RESOURCE_MAX_CHARS: usize = 100_000;
const DEFAULT_OUTPUT_DIR: &str = "artifacts";
const DEFAULT_MODEL: &str = "qwen_qwen3-vl-4b-instruct";
const DEFAULT_API_BASE: &str = "http://localhost:1234/v1";
const DEFAULT_API_KEY: &str = "lm-studio";

/// How links in generated documents point at repository files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStyle {
    /// `https://github.com/<owner>/<repo>/blob/<ref>/<path>`
    #[default]
    Blob,
    /// `https://raw.githubusercontent.com/<owner>/<repo>/<ref>/<path>`
    Raw,
}

impl LinkStyle {
    /// URL of `path` at `git_ref` in `owner/repo`.
    #[must_use]
    pub fn file_url(self, owner: &str, repo: &str, git_ref: &str, path: &str) -> String {
        let path = path.trim_start_matches('/');
        match self {
            Self::Blob => format!("https://github.com/{owner}/{repo}/blob/{git_ref}/{path}"),
            Self::Raw => {
                format!("https://raw.githubusercontent.com/{owner}/{repo}/{git_ref}/{path}")
            }
        }
    }
}

/// Model connection settings handed to the LLM client on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model identifier
    pub model: String,
    /// API base URL
    pub api_base: String,
    /// API key (local servers accept any string)
    pub api_key: String,
    /// Tokens the model may emit
    pub max_output_tokens: usize,
}

/// Configuration for the generation engine.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Directory where artifacts are written (`<output_dir>/<owner>/<repo>/`)
    pub output_dir: PathBuf,

    /// Root every output directory must resolve inside
    pub allowed_root: PathBuf,

    /// Model context window in tokens
    pub max_context_tokens: usize,

    /// Tokens reserved for the model's answer
    pub max_output_tokens: usize,

    /// Fraction of the window kept free as a safety margin
    pub context_headroom_ratio: f64,

    /// File tree lines considered when estimating
    pub max_file_tree_lines: usize,

    /// README characters considered when estimating
    pub max_readme_chars: usize,

    /// Package manifest characters considered when estimating
    pub max_package_chars: usize,

    /// Budget ratios applied on successive context/payload retries
    pub retry_reduction_steps: Vec<f64>,

    /// Estimates up to `available * compaction_factor` are compacted rather than rejected
    pub compaction_factor: f64,

    /// Token estimator
    pub tokenizer: TokenizerKind,

    /// Maximum number of run records kept in memory
    pub max_runs: usize,

    /// Seconds a finished run is kept
    pub ttl_seconds: u64,

    /// Seconds between background eviction sweeps
    pub cleanup_interval_seconds: u64,

    /// Characters returned by whole-artifact reads before truncation
    pub resource_max_chars: usize,

    /// Model identifier
    pub model: String,

    /// Model API base URL
    pub api_base: String,

    /// Model API key
    pub api_key: String,

    /// Link style for generated documents
    pub link_style: LinkStyle,

    /// Emit `llms-ctx.txt` when a context expander is available
    pub enable_ctx: bool,

    /// Emit `llms-full.txt` when a full-text expander is available
    pub build_full: bool,

    /// Append a UTC generation stamp to written text artifacts
    pub stamp: bool,

    /// Emit the repository graph under `<owner>/<repo>/graph/`
    pub enable_repo_graph: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use llmstxt_engine::Config;
    ///
    /// let config = Config::builder()
    ///     .max_context_tokens(16_384)
    ///     .retry_reduction_steps(vec![0.8, 0.6, 0.4])
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The context window is zero or fully consumed by the output reserve
    /// - The headroom ratio is outside `[0, 1)`
    /// - A retry reduction step is outside `(0, 1)`
    /// - The compaction factor is below 1
    pub fn validate(&self) -> Result<()> {
        if self.max_context_tokens == 0 {
            return Err(Error::config("max_context_tokens must be greater than 0"));
        }

        if self.max_output_tokens >= self.max_context_tokens {
            return Err(Error::config(format!(
                "max_output_tokens ({}) must be less than max_context_tokens ({})",
                self.max_output_tokens, self.max_context_tokens
            )));
        }

        if !(0.0..1.0).contains(&self.context_headroom_ratio) {
            return Err(Error::config(format!(
                "context_headroom_ratio must be in [0, 1), got {}",
                self.context_headroom_ratio
            )));
        }

        if let Some(step) = self
            .retry_reduction_steps
            .iter()
            .find(|s| !(**s > 0.0 && **s < 1.0))
        {
            return Err(Error::config(format!(
                "retry_reduction_steps entries must be in (0, 1), got {step}"
            )));
        }

        if self.compaction_factor < 1.0 {
            return Err(Error::config(format!(
                "compaction_factor must be at least 1.0, got {}",
                self.compaction_factor
            )));
        }

        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }

        Ok(())
    }

    /// Settings handed to the LLM client before each generation.
    #[must_use]
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.model.clone(),
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// Sweep interval, `None` when the background sweeper is disabled.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Option<Duration> {
        if self.cleanup_interval_seconds == 0 || self.ttl_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.cleanup_interval_seconds))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            allowed_root: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            context_headroom_ratio: DEFAULT_HEADROOM_RATIO,
            max_file_tree_lines: DEFAULT_MAX_FILE_TREE_LINES,
            max_readme_chars: DEFAULT_MAX_README_CHARS,
            max_package_chars: DEFAULT_MAX_PACKAGE_CHARS,
            retry_reduction_steps: DEFAULT_RETRY_REDUCTION_STEPS.to_vec(),
            compaction_factor: DEFAULT_COMPACTION_FACTOR,
            tokenizer: TokenizerKind::Simple,
            max_runs: DEFAULT_MAX_RUNS,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            cleanup_interval_seconds: DEFAULT_CLEANUP_INTERVAL_SECONDS,
            resource_max_chars: DEFAULT_RESOURCE_MAX_CHARS,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            link_style: LinkStyle::Blob,
            enable_ctx: false,
            build_full: true,
            stamp: false,
            enable_repo_graph: false,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    output_dir: Option<PathBuf>,
    allowed_root: Option<PathBuf>,
    max_context_tokens: Option<usize>,
    max_output_tokens: Option<usize>,
    context_headroom_ratio: Option<f64>,
    max_file_tree_lines: Option<usize>,
    max_readme_chars: Option<usize>,
    max_package_chars: Option<usize>,
    retry_reduction_steps: Option<Vec<f64>>,
    compaction_factor: Option<f64>,
    tokenizer: Option<TokenizerKind>,
    max_runs: Option<usize>,
    ttl_seconds: Option<u64>,
    cleanup_interval_seconds: Option<u64>,
    resource_max_chars: Option<usize>,
    model: Option<String>,
    api_base: Option<String>,
    api_key: Option<String>,
    link_style: Option<LinkStyle>,
    enable_ctx: bool,
    build_full: Option<bool>,
    stamp: bool,
    enable_repo_graph: bool,
}

impl ConfigBuilder {
    /// Sets the artifact output directory.
    ///
    /// When no allowed root is given, the output directory becomes the root.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Sets the root that every output directory must resolve inside.
    #[must_use]
    pub fn allowed_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.allowed_root = Some(path.into());
        self
    }

    /// Sets the model context window.
    #[must_use]
    pub fn max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = Some(tokens);
        self
    }

    /// Sets the output token reserve.
    #[must_use]
    pub fn max_output_tokens(mut self, tokens: usize) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Sets the headroom ratio.
    #[must_use]
    pub fn context_headroom_ratio(mut self, ratio: f64) -> Self {
        self.context_headroom_ratio = Some(ratio);
        self
    }

    /// Sets the file tree line cap.
    #[must_use]
    pub fn max_file_tree_lines(mut self, lines: usize) -> Self {
        self.max_file_tree_lines = Some(lines);
        self
    }

    /// Sets the README character cap.
    #[must_use]
    pub fn max_readme_chars(mut self, chars: usize) -> Self {
        self.max_readme_chars = Some(chars);
        self
    }

    /// Sets the package manifest character cap.
    #[must_use]
    pub fn max_package_chars(mut self, chars: usize) -> Self {
        self.max_package_chars = Some(chars);
        self
    }

    /// Sets the retry reduction ladder.
    #[must_use]
    pub fn retry_reduction_steps(mut self, steps: Vec<f64>) -> Self {
        self.retry_reduction_steps = Some(steps);
        self
    }

    /// Sets the compaction factor boundary.
    #[must_use]
    pub fn compaction_factor(mut self, factor: f64) -> Self {
        self.compaction_factor = Some(factor);
        self
    }

    /// Sets the token estimator.
    #[must_use]
    pub fn tokenizer(mut self, kind: TokenizerKind) -> Self {
        self.tokenizer = Some(kind);
        self
    }

    /// Sets the run store capacity (0 disables the bound).
    #[must_use]
    pub fn max_runs(mut self, runs: usize) -> Self {
        self.max_runs = Some(runs);
        self
    }

    /// Sets the finished-run TTL (0 disables expiry).
    #[must_use]
    pub fn ttl_seconds(mut self, seconds: u64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }

    /// Sets the background sweep interval (0 disables the sweeper).
    #[must_use]
    pub fn cleanup_interval_seconds(mut self, seconds: u64) -> Self {
        self.cleanup_interval_seconds = Some(seconds);
        self
    }

    /// Sets the whole-artifact read limit.
    #[must_use]
    pub fn resource_max_chars(mut self, chars: usize) -> Self {
        self.resource_max_chars = Some(chars);
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the model API base URL.
    #[must_use]
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = Some(url.into());
        self
    }

    /// Sets the model API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the link style.
    #[must_use]
    pub fn link_style(mut self, style: LinkStyle) -> Self {
        self.link_style = Some(style);
        self
    }

    /// Enables `llms-ctx.txt` output.
    #[must_use]
    pub fn enable_ctx(mut self, enabled: bool) -> Self {
        self.enable_ctx = enabled;
        self
    }

    /// Enables or disables `llms-full.txt` output.
    #[must_use]
    pub fn build_full(mut self, enabled: bool) -> Self {
        self.build_full = Some(enabled);
        self
    }

    /// Enables the UTC generation stamp.
    #[must_use]
    pub fn stamp(mut self, enabled: bool) -> Self {
        self.stamp = enabled;
        self
    }

    /// Enables repository graph output.
    #[must_use]
    pub fn enable_repo_graph(mut self, enabled: bool) -> Self {
        self.enable_repo_graph = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();
        let output_dir = self.output_dir.unwrap_or(defaults.output_dir);
        let allowed_root = self.allowed_root.unwrap_or_else(|| output_dir.clone());

        let config = Config {
            output_dir,
            allowed_root,
            max_context_tokens: self
                .max_context_tokens
                .unwrap_or(defaults.max_context_tokens),
            max_output_tokens: self.max_output_tokens.unwrap_or(defaults.max_output_tokens),
            context_headroom_ratio: self
                .context_headroom_ratio
                .unwrap_or(defaults.context_headroom_ratio),
            max_file_tree_lines: self
                .max_file_tree_lines
                .unwrap_or(defaults.max_file_tree_lines),
            max_readme_chars: self.max_readme_chars.unwrap_or(defaults.max_readme_chars),
            max_package_chars: self.max_package_chars.unwrap_or(defaults.max_package_chars),
            retry_reduction_steps: self
                .retry_reduction_steps
                .unwrap_or(defaults.retry_reduction_steps),
            compaction_factor: self.compaction_factor.unwrap_or(defaults.compaction_factor),
            tokenizer: self.tokenizer.unwrap_or(defaults.tokenizer),
            max_runs: self.max_runs.unwrap_or(defaults.max_runs),
            ttl_seconds: self.ttl_seconds.unwrap_or(defaults.ttl_seconds),
            cleanup_interval_seconds: self
                .cleanup_interval_seconds
                .unwrap_or(defaults.cleanup_interval_seconds),
            resource_max_chars: self
                .resource_max_chars
                .unwrap_or(defaults.resource_max_chars),
            model: self.model.unwrap_or(defaults.model),
            api_base: self.api_base.unwrap_or(defaults.api_base),
            api_key: self.api_key.unwrap_or(defaults.api_key),
            link_style: self.link_style.unwrap_or(defaults.link_style),
            enable_ctx: self.enable_ctx,
            build_full: self.build_full.unwrap_or(defaults.build_full),
            stamp: self.stamp,
            enable_repo_graph: self.enable_repo_graph,
        };

        config.validate()?;
        Ok(config)
    }
}
