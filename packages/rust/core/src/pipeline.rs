//! End-to-end `analyze` pipeline: transcript → chunks → embeddings →
//! clusters → topics → TOC → assembled run directory.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use depoindex_engine::{HashEmbedder, LabeledChunk, TopicIndex};
use depoindex_gemini::{GeminiClient, GeminiOptions};
use depoindex_shared::{AnalyzeOptions, DepoIndexError, Result, RunId, Topic, TopicCluster};
use depoindex_storage::Storage;
use depoindex_transcript::{TranscriptLine, chunk_lines, detect_speaker_topics, parse, stats};

use crate::assembler::{AssembleConfig, EnrichmentMeta, assemble, assemble_artifacts};
use crate::enrichment::{self, EnrichmentProgress};
use crate::toc;

/// Configuration for the `analyze` pipeline.
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    /// Transcript file to analyze.
    pub input: PathBuf,
    /// Human-readable name (defaults to the input file stem).
    pub name: String,
    /// Output root directory for run storage.
    pub output_root: PathBuf,
    /// Merged analysis options.
    pub options: AnalyzeOptions,
    /// Tool version string.
    pub tool_version: String,
    /// Gemini connection options; `None` runs fully offline.
    pub gemini: Option<GeminiOptions>,
}

/// Result of the `analyze` pipeline.
#[derive(Debug)]
pub struct AnalyzeResult {
    /// Path to the assembled run directory.
    pub run_path: PathBuf,
    /// Run identifier.
    pub run_id: RunId,
    /// Number of topics in the final TOC.
    pub topic_count: usize,
    /// Number of clusters.
    pub cluster_count: usize,
    /// Whether LLM enrichment ran.
    pub used_llm: bool,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Item-level progress within the current phase.
    fn item_progress(&self, current: usize, total: usize, detail: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &AnalyzeResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_progress(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _result: &AnalyzeResult) {}
}

/// Run the full `analyze` pipeline.
///
/// 1. Parse the transcript
/// 2. Chunk
/// 3. Embed (Gemini when configured, deterministic local otherwise)
/// 4. Cluster + label, derive base topics
/// 5. LLM enrichment (optional, cached)
/// 6. Build TOC
/// 7. Assemble run directory + artifacts, persist topics
#[instrument(skip_all, fields(input = %config.input.display(), name = %config.name))]
pub async fn analyze(
    config: &AnalyzeConfig,
    progress: &dyn ProgressReporter,
) -> Result<AnalyzeResult> {
    let start = Instant::now();
    let run_id = RunId::new();

    info!(%run_id, input = %config.input.display(), "starting analyze pipeline");

    // --- Phase 1: Parse transcript ---
    progress.phase("Parsing transcript");
    let text = std::fs::read_to_string(&config.input)
        .map_err(|e| DepoIndexError::io(&config.input, e))?;

    let lines = parse(&text)?;
    let transcript_stats = stats(&lines);

    if transcript_stats.word_count < config.options.min_words {
        warn!(
            words = transcript_stats.word_count,
            minimum = config.options.min_words,
            "transcript is shorter than the recommended minimum"
        );
    }

    // --- Phase 2: Chunk ---
    progress.phase("Chunking transcript");
    let chunks = chunk_lines(&lines, config.options.chunk_size)?;

    // --- Phase 3: Storage ---
    progress.phase("Initializing storage");
    let db_path = config
        .output_root
        .join(run_id.to_string())
        .join("indexes")
        .join("depoindex.db");
    let storage = Storage::open(&db_path).await?;

    let options_json = serde_json::json!({
        "num_topics": config.options.num_topics,
        "chunk_size": config.options.chunk_size,
        "use_llm": config.options.use_llm,
    });
    storage
        .insert_run(
            &run_id.to_string(),
            &config.name,
            &config.input.to_string_lossy(),
            Some(&options_json.to_string()),
        )
        .await?;

    // --- Phase 4: Embed + cluster ---
    progress.phase("Embedding chunks");
    let client = match (&config.gemini, config.options.use_llm) {
        (Some(opts), true) => Some(GeminiClient::new(opts.clone())?),
        _ => None,
    };

    let chunk_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embed_chunks(client.as_ref(), &chunk_texts, progress).await;

    progress.phase("Clustering chunks");
    let index = TopicIndex::build(chunks, embeddings, config.options.num_topics)?;

    // --- Phase 5: Base topics ---
    progress.phase("Detecting topics");
    let base_topics = derive_base_topics(&lines, index.chunks());
    let local_clusters = derive_local_clusters(&index, &base_topics);

    // --- Phase 6: Enrichment ---
    let mut final_topics = base_topics.clone();
    let mut final_clusters = local_clusters;
    let mut llm_toc: Option<String> = None;
    let mut enrichment_meta: Option<EnrichmentMeta> = None;

    if let Some(client) = &client {
        progress.phase("Running LLM enrichment");
        let enrich_progress = PipelineEnrichmentProgress { inner: progress };
        let results = enrichment::run_enrichment(
            client,
            &run_id.to_string(),
            &text,
            config.options.num_topics,
            &base_topics,
            &storage,
            &enrich_progress,
        )
        .await?;

        if !results.topics.is_empty() {
            final_topics = merge_topics(results.topics.clone(), base_topics);
        }
        if !results.clusters.is_empty() {
            final_clusters = results.clusters.clone();
        }
        llm_toc = results.toc_markdown.clone();

        enrichment_meta = Some(EnrichmentMeta {
            model: results.model.clone(),
            total_tokens_in: results.usage.tokens_in,
            total_tokens_out: results.usage.tokens_out,
            cache_hits: results.cache_hits,
            cache_misses: results.cache_misses,
            completed_at: chrono::Utc::now().to_rfc3339(),
        });
    }

    final_topics.sort_by_key(Topic::position);

    // --- Phase 7: Build TOC ---
    progress.phase("Building table of contents");
    let toc = toc::build_toc(&final_topics, &final_clusters);

    // --- Phase 8: Assemble ---
    progress.phase("Assembling run directory");
    let assemble_config = AssembleConfig {
        run_id: run_id.clone(),
        name: config.name.clone(),
        source_path: config.input.to_string_lossy().to_string(),
        output_root: config.output_root.clone(),
        tool_version: config.tool_version.clone(),
        line_count: transcript_stats.line_count,
        page_count: transcript_stats.page_count,
        chunk_count: index.chunks().len(),
        config: Some(options_json),
    };

    let assemble_result = assemble(&assemble_config, &toc, &final_topics, &final_clusters)?;

    progress.phase("Writing artifacts");
    let toc_md = depoindex_artifacts::generate_toc_md(
        &config.name,
        &toc,
        llm_toc.as_deref(),
        &config.tool_version,
    );
    let annotated_md = depoindex_artifacts::generate_annotated_md(
        &config.name,
        &final_topics,
        &config.tool_version,
    );
    let clusters_md = depoindex_artifacts::generate_clusters_md(
        &config.name,
        &final_clusters,
        &config.tool_version,
    );

    let artifact_files: Vec<(&str, &str)> = vec![
        ("toc.md", toc_md.as_str()),
        ("annotated_transcript.md", annotated_md.as_str()),
        ("clusters.md", clusters_md.as_str()),
    ];
    assemble_artifacts(
        &assemble_result.run_path,
        &artifact_files,
        enrichment_meta.as_ref(),
    )?;

    // --- Phase 9: Persist topics ---
    progress.phase("Persisting topics");
    for topic in &final_topics {
        let cluster_name = final_clusters
            .iter()
            .find(|c| c.members.contains(&topic.title))
            .map(|c| c.name.as_str());
        storage
            .insert_topic(&run_id.to_string(), topic, cluster_name)
            .await?;
    }
    storage.touch_run(&run_id.to_string()).await?;

    let result = AnalyzeResult {
        run_path: assemble_result.run_path,
        run_id,
        topic_count: final_topics.len(),
        cluster_count: final_clusters.len(),
        used_llm: client.is_some(),
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        run_id = %result.run_id,
        topics = result.topic_count,
        clusters = result.cluster_count,
        used_llm = result.used_llm,
        elapsed_ms = result.elapsed.as_millis(),
        "analyze pipeline complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

/// Embed chunk texts, falling back to the local embedder when the API is
/// unavailable or misbehaves.
async fn embed_chunks(
    client: Option<&GeminiClient>,
    texts: &[String],
    progress: &dyn ProgressReporter,
) -> Vec<Vec<f32>> {
    if let Some(client) = client {
        progress.item_progress(0, texts.len(), "requesting Gemini embeddings");
        match client.embed_texts(texts).await {
            Ok(embeddings) => return embeddings,
            Err(e) => {
                warn!(error = %e, "remote embeddings failed, using local embedder");
            }
        }
    }

    HashEmbedder.embed(texts)
}

// ---------------------------------------------------------------------------
// Topic derivation
// ---------------------------------------------------------------------------

/// Derive base topics: speaker-line topics when the transcript has them,
/// otherwise one topic per chunk named after its cluster.
fn derive_base_topics(lines: &[TranscriptLine], chunks: &[LabeledChunk]) -> Vec<Topic> {
    let speaker_topics = detect_speaker_topics(lines);

    if !speaker_topics.is_empty() {
        return speaker_topics
            .into_iter()
            .map(|t| Topic::new(t.title, t.page, t.line, t.text))
            .collect();
    }

    chunks
        .iter()
        .map(|labeled| {
            Topic::new(
                labeled.topic_name.clone(),
                labeled.chunk.page,
                labeled.chunk.line,
                labeled.chunk.text.clone(),
            )
        })
        .collect()
}

/// Group base topics into clusters by their transcript position: a topic
/// belongs to the cluster of the chunk that contains its line.
fn derive_local_clusters(index: &TopicIndex, topics: &[Topic]) -> Vec<TopicCluster> {
    let chunks = index.chunks();
    let mut members: Vec<Vec<String>> = vec![Vec::new(); index.cluster_count()];

    for topic in topics {
        let cluster = containing_chunk(chunks, topic.position())
            .map(|c| c.cluster)
            .unwrap_or(0);
        if !members[cluster].contains(&topic.title) {
            members[cluster].push(topic.title.clone());
        }
    }

    index
        .labels()
        .iter()
        .enumerate()
        .filter_map(|(i, label)| {
            let member_titles = std::mem::take(&mut members[i]);
            if member_titles.is_empty() {
                return None;
            }
            Some(TopicCluster {
                name: label.clone(),
                members: member_titles,
                legal_theme: None,
                key_issues: Vec::new(),
                confidence: 0.7,
                representative_excerpt: chunks
                    .iter()
                    .find(|c| c.cluster == i)
                    .map(|c| truncate_excerpt(&c.chunk.text)),
            })
        })
        .collect()
}

/// The last chunk starting at or before `position`.
fn containing_chunk(chunks: &[LabeledChunk], position: (u32, u32)) -> Option<&LabeledChunk> {
    chunks
        .iter()
        .take_while(|c| (c.chunk.page, c.chunk.line) <= position)
        .last()
        .or_else(|| chunks.first())
}

fn truncate_excerpt(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

/// Merge LLM topics with heuristic ones: LLM entries win, heuristic entries
/// survive only at (page, line) references the LLM did not cover.
fn merge_topics(llm: Vec<Topic>, heuristic: Vec<Topic>) -> Vec<Topic> {
    let covered: Vec<(u32, u32)> = llm.iter().map(Topic::position).collect();

    let mut merged = llm;
    merged.extend(
        heuristic
            .into_iter()
            .filter(|t| !covered.contains(&t.position())),
    );
    merged.sort_by_key(Topic::position);
    merged
}

// ---------------------------------------------------------------------------
// Enrichment progress adapter
// ---------------------------------------------------------------------------

/// Adapts a `ProgressReporter` to the `EnrichmentProgress` interface.
struct PipelineEnrichmentProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl EnrichmentProgress for PipelineEnrichmentProgress<'_> {
    fn task(&self, current: usize, total: usize, detail: &str) {
        self.inner.item_progress(current, total, detail);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
