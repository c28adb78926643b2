//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use depoindex_core::assembler::{assemble_artifacts, validate_run};
use depoindex_core::pipeline::{AnalyzeConfig, AnalyzeResult, ProgressReporter};
use depoindex_gemini::GeminiOptions;
use depoindex_shared::{
    AnalysisManifest, AnalyzeOptions, AppConfig, Toc, Topic, TopicCluster, expand_home,
    gemini_api_key, init_config, load_config,
};
use depoindex_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// DepoIndex — turn deposition transcripts into clustered tables of contents.
#[derive(Parser)]
#[command(
    name = "depoindex",
    version,
    about = "Analyze deposition transcripts into topic clusters and a page/line-referenced TOC.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Analyze a transcript and build its run directory.
    Analyze {
        /// Transcript file to analyze (.txt).
        input: PathBuf,

        /// Human-readable name for the run (defaults to the file stem).
        #[arg(short, long)]
        name: Option<String>,

        /// Output directory for the run (defaults to the configured output dir).
        #[arg(short, long)]
        out: Option<String>,

        /// Number of topic clusters.
        #[arg(short, long)]
        topics: Option<usize>,

        /// Lines per chunk.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Skip LLM enrichment even if an API key is configured.
        #[arg(long)]
        no_llm: bool,
    },

    /// Re-render markdown artifacts for an existing run.
    Export {
        /// Run directory path.
        #[arg(long)]
        run: PathBuf,
    },

    /// Print the topic table for an existing run.
    Topics {
        /// Run directory path.
        #[arg(long)]
        run: PathBuf,
    },

    /// List analysis runs under the output directory.
    List {
        /// Output directory to scan (defaults to the configured output dir).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "depoindex=info",
        1 => "depoindex=debug",
        _ => "depoindex=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Analyze {
            input,
            name,
            out,
            topics,
            chunk_size,
            no_llm,
        } => {
            cmd_analyze(
                input,
                name.as_deref(),
                out.as_deref(),
                topics,
                chunk_size,
                no_llm,
            )
            .await
        }
        Command::Export { run } => cmd_export(&run).await,
        Command::Topics { run } => cmd_topics(&run).await,
        Command::List { out } => cmd_list(out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

async fn cmd_analyze(
    input: PathBuf,
    name: Option<&str>,
    out: Option<&str>,
    topics: Option<usize>,
    chunk_size: Option<usize>,
    no_llm: bool,
) -> Result<()> {
    let config = load_config()?;

    if !input.exists() {
        return Err(eyre!("transcript file not found: {}", input.display()));
    }

    // Derive name from the file stem if not provided
    let run_name = name.map(String::from).unwrap_or_else(|| {
        input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "transcript".to_string())
    });

    let output_root = match out {
        Some(p) => PathBuf::from(p),
        None => expand_home(&config.defaults.output_dir),
    };

    // Merge CLI flags over config defaults
    let mut options = AnalyzeOptions::from(&config);
    if let Some(n) = topics {
        options.num_topics = n;
    }
    if let Some(n) = chunk_size {
        options.chunk_size = n;
    }
    options.use_llm = !no_llm;

    let gemini = build_gemini_options(&config, &mut options);

    let analyze_config = AnalyzeConfig {
        input,
        name: run_name.clone(),
        output_root,
        options,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        gemini,
    };

    info!(name = %run_name, "analyzing transcript");

    let reporter = CliProgress::new();
    let result = depoindex_core::pipeline::analyze(&analyze_config, &reporter).await?;

    println!();
    println!("  Analysis complete!");
    println!("  ID:       {}", result.run_id);
    println!("  Name:     {run_name}");
    println!("  Topics:   {}", result.topic_count);
    println!("  Clusters: {}", result.cluster_count);
    println!("  LLM:      {}", if result.used_llm { "yes" } else { "no" });
    println!("  Path:     {}", result.run_path.display());
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Resolve Gemini options from config + environment. Missing key downgrades
/// the run to offline instead of failing.
fn build_gemini_options(config: &AppConfig, options: &mut AnalyzeOptions) -> Option<GeminiOptions> {
    if !options.use_llm {
        return None;
    }

    match gemini_api_key(config) {
        Some(api_key) => Some(GeminiOptions {
            api_key,
            model: config.gemini.model.clone(),
            clustering_model: config.gemini.clustering_model.clone(),
            embed_model: config.embedding.model.clone(),
            embed_dimension: config.embedding.dimension,
            temperature: config.gemini.temperature,
            rate_limit_ms: config.gemini.rate_limit_ms,
            base_url: None,
        }),
        None => {
            warn!(
                env = %config.gemini.api_key_env,
                "no Gemini API key set, running offline analysis"
            );
            options.use_llm = false;
            None
        }
    }
}

// ---------------------------------------------------------------------------
// export
// ---------------------------------------------------------------------------

async fn cmd_export(run: &Path) -> Result<()> {
    let manifest = validate_run(run)?;

    let toc: Toc = read_json(&run.join("toc.json"))?;
    let topics: Vec<Topic> = read_json(&run.join("topics.json"))?;
    let clusters: Vec<TopicCluster> = read_json(&run.join("clusters.json"))?;

    let toc_md =
        depoindex_artifacts::generate_toc_md(&manifest.name, &toc, None, &manifest.tool_version);
    let annotated_md =
        depoindex_artifacts::generate_annotated_md(&manifest.name, &topics, &manifest.tool_version);
    let clusters_md = depoindex_artifacts::generate_clusters_md(
        &manifest.name,
        &clusters,
        &manifest.tool_version,
    );

    let files: Vec<(&str, &str)> = vec![
        ("toc.md", toc_md.as_str()),
        ("annotated_transcript.md", annotated_md.as_str()),
        ("clusters.md", clusters_md.as_str()),
    ];
    let metas = assemble_artifacts(run, &files, None)?;

    println!("  Re-rendered {} artifacts:", metas.len());
    for meta in metas {
        println!("    {} ({} bytes)", meta.filename, meta.size_bytes);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// topics
// ---------------------------------------------------------------------------

async fn cmd_topics(run: &Path) -> Result<()> {
    let manifest = validate_run(run)?;

    let storage = Storage::open(&run.join("indexes").join("depoindex.db")).await?;
    let topics = storage.list_topics(&manifest.id.to_string()).await?;

    if topics.is_empty() {
        println!("No topics stored for run {}", manifest.id);
        return Ok(());
    }

    println!();
    println!("  {:<6} {:<6} {:<40} {}", "Page", "Line", "Topic", "Cluster");
    for (topic, cluster) in topics {
        let marker = if topic.is_key_issue { "*" } else { " " };
        println!(
            "  {:<6} {:<6} {marker}{:<39} {}",
            topic.page,
            topic.line,
            truncate(&topic.title, 38),
            cluster.unwrap_or_default()
        );
    }
    println!();
    println!("  (* = key issue)");

    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

async fn cmd_list(out: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let output_root = match out {
        Some(p) => PathBuf::from(p),
        None => expand_home(&config.defaults.output_dir),
    };

    if !output_root.is_dir() {
        println!("No runs found under {}", output_root.display());
        return Ok(());
    }

    let mut manifests: Vec<AnalysisManifest> = Vec::new();
    for entry in std::fs::read_dir(&output_root)? {
        let path = entry?.path();
        let manifest_path = path.join("manifest.json");
        if !manifest_path.is_file() {
            continue;
        }
        match read_json::<AnalysisManifest>(&manifest_path) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => warn!(path = %manifest_path.display(), error = %e, "skipping unreadable manifest"),
        }
    }

    if manifests.is_empty() {
        println!("No runs found under {}", output_root.display());
        return Ok(());
    }

    manifests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    println!();
    println!("  {:<38} {:<24} {:<8} {}", "ID", "Name", "Topics", "Created");
    for m in manifests {
        println!(
            "  {:<38} {:<24} {:<8} {}",
            m.id,
            truncate(&m.name, 22),
            m.topic_count,
            m.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| eyre!("invalid JSON in {}: {e}", path.display()))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_progress(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {detail}"));
    }

    fn done(&self, _result: &AnalyzeResult) {
        self.spinner.finish_and_clear();
    }
}
