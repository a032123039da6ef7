use anyhow::Context;
use clap::Parser;
use llmstxt_engine::{
    Config, HeuristicBackend, LinkStyle, LocalExpander, LocalMaterialSource, Orchestrator,
    TokenizerKind,
};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "llmstxt",
    version,
    author,
    about = "Generate llms.txt artifacts for a repository",
    long_about = "Generate llms.txt documentation artifacts for a repository checkout.\n\n\
    The checkout is walked (respecting .gitignore), budgeted against the configured \
    context window, compacted if needed and rendered into llms.txt, llms.json and, \
    when enabled, llms-ctx.txt and llms-full.txt.\n\n\
    USAGE EXAMPLES:\n  \
      # Generate for the current directory\n  \
      llmstxt https://github.com/acme/widgets\n\n  \
      # Generate for another checkout into ./out\n  \
      llmstxt https://github.com/acme/widgets --dir ../widgets --out ./out --allowed-root .\n\n  \
      # Raw links, context file and a generation stamp\n  \
      llmstxt https://github.com/acme/widgets --link-style raw --ctx --stamp\n\n  \
      # Include the repository graph\n  \
      llmstxt https://github.com/acme/widgets --graph"
)]
struct Cli {
    /// GitHub URL of the repository (https or SSH form)
    #[arg(value_name = "REPO_URL")]
    repo_url: String,

    /// Local checkout of the repository
    #[arg(short, long, default_value = ".", value_name = "PATH")]
    dir: PathBuf,

    /// Output root; artifacts land in <out>/<owner>/<repo>/
    #[arg(short, long, env = "LLMSTXT_OUTPUT_DIR", default_value = "artifacts", value_name = "PATH")]
    out: PathBuf,

    /// Directory the output root must stay inside (defaults to --out)
    #[arg(long, env = "LLMSTXT_ALLOWED_ROOT", value_name = "PATH")]
    allowed_root: Option<PathBuf>,

    /// Default branch used in generated links
    #[arg(short, long, default_value = "main")]
    branch: String,

    /// Mark the repository as private
    #[arg(long)]
    private: bool,

    /// Model context window in tokens
    #[arg(long, env = "LLMSTXT_MAX_CONTEXT_TOKENS", default_value_t = 32_768)]
    max_context_tokens: usize,

    /// Tokens reserved for the answer
    #[arg(long, env = "LLMSTXT_MAX_OUTPUT_TOKENS", default_value_t = 4_096)]
    max_output_tokens: usize,

    /// Tokenizer to use
    #[arg(long, value_enum, default_value = "simple")]
    tokenizer: CliTokenizer,

    /// How links point at repository files
    #[arg(long, value_enum, default_value = "blob")]
    link_style: CliLinkStyle,

    /// Also write llms-ctx.txt
    #[arg(long)]
    ctx: bool,

    /// Skip llms-full.txt
    #[arg(long)]
    no_full: bool,

    /// Append a UTC generation stamp to text artifacts
    #[arg(long)]
    stamp: bool,

    /// Also write the repository graph under graph/
    #[arg(long)]
    graph: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliTokenizer {
    Simple,
    Enhanced,
}

impl From<CliTokenizer> for TokenizerKind {
    fn from(t: CliTokenizer) -> Self {
        match t {
            CliTokenizer::Simple => Self::Simple,
            CliTokenizer::Enhanced => Self::Enhanced,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliLinkStyle {
    Blob,
    Raw,
}

impl From<CliLinkStyle> for LinkStyle {
    fn from(s: CliLinkStyle) -> Self {
        match s {
            CliLinkStyle::Blob => Self::Blob,
            CliLinkStyle::Raw => Self::Raw,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let allowed_root = cli.allowed_root.unwrap_or_else(|| cli.out.clone());
    let link_style = LinkStyle::from(cli.link_style);

    let config = Config::builder()
        .output_dir(cli.out)
        .allowed_root(allowed_root)
        .max_context_tokens(cli.max_context_tokens)
        .max_output_tokens(cli.max_output_tokens)
        .tokenizer(cli.tokenizer.into())
        .link_style(link_style)
        .enable_ctx(cli.ctx)
        .build_full(!cli.no_full)
        .stamp(cli.stamp)
        .enable_repo_graph(cli.graph)
        .build()
        .context("Failed to build configuration")?;

    let source = LocalMaterialSource::new(&cli.dir)
        .default_branch(cli.branch)
        .private(cli.private);
    let backend = HeuristicBackend::new(link_style).context("Failed to create backend")?;

    let record = Orchestrator::new(config, Arc::new(source), backend)
        .context("Failed to create orchestrator")?
        .with_expander(Arc::new(LocalExpander::new(&cli.dir)))
        .generate(&cli.repo_url)
        .with_context(|| format!("Generation failed for {}", cli.repo_url))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("Failed to serialize run record")?
    );

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("llmstxt_engine=info"),
        1 => EnvFilter::new("llmstxt_engine=debug"),
        _ => EnvFilter::new("llmstxt_engine=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false).with_writer(std::io::stderr))
        .init();

    Ok(())
}
