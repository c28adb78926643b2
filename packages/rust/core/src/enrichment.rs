//! LLM enrichment orchestrator.
//!
//! Runs the Gemini tasks (topic refinement, semantic clustering, enhanced
//! TOC) against the API client, caching each result in storage keyed by a
//! prompt hash so re-runs of an unchanged transcript skip the network.

use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use depoindex_gemini::GeminiClient;
use depoindex_shared::{Result, TokenUsage, Topic, TopicCluster};
use depoindex_storage::Storage;

/// Cache task identifiers.
const TASK_REFINE_TOPICS: &str = "refine_topics";
const TASK_CLUSTER_TOPICS: &str = "cluster_topics";
const TASK_GENERATE_TOC: &str = "generate_toc";

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Aggregated enrichment results for a run.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentResults {
    /// LLM-refined topics; empty when the task failed or returned nothing.
    pub topics: Vec<Topic>,
    /// Semantic clusters; empty when the task failed.
    pub clusters: Vec<TopicCluster>,
    /// Enhanced markdown TOC, when generated.
    pub toc_markdown: Option<String>,
    /// Total token usage across cache misses.
    pub usage: TokenUsage,
    /// Model used for generation tasks.
    pub model: String,
    /// Number of cache hits.
    pub cache_hits: usize,
    /// Number of cache misses (API calls made).
    pub cache_misses: usize,
}

/// Progress callback for enrichment operations.
pub trait EnrichmentProgress: Send + Sync {
    /// Called when entering a new task.
    fn task(&self, current: usize, total: usize, detail: &str);
}

/// No-op enrichment progress.
pub struct SilentEnrichmentProgress;

impl EnrichmentProgress for SilentEnrichmentProgress {
    fn task(&self, _current: usize, _total: usize, _detail: &str) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Run the enrichment tasks.
///
/// `base_topics` seed the clustering and TOC prompts when topic refinement
/// fails or returns nothing, so the run degrades to heuristic titles instead
/// of aborting.
#[instrument(skip_all, fields(run_id, num_topics, base = base_topics.len()))]
pub async fn run_enrichment(
    client: &GeminiClient,
    run_id: &str,
    transcript_text: &str,
    num_topics: usize,
    base_topics: &[Topic],
    storage: &Storage,
    progress: &dyn EnrichmentProgress,
) -> Result<EnrichmentResults> {
    let mut results = EnrichmentResults {
        model: client.model().to_string(),
        ..Default::default()
    };
    let total_tasks = 3;

    // --- Task 1: topic refinement ---
    progress.task(1, total_tasks, "Refining topics");
    let hash = prompt_hash(transcript_text, TASK_REFINE_TOPICS);

    match cached_json::<Vec<Topic>>(storage, run_id, TASK_REFINE_TOPICS, &hash, &results.model)
        .await?
    {
        Some(topics) => {
            results.topics = topics;
            results.cache_hits += 1;
        }
        None => match client.generate_topics(transcript_text, num_topics).await {
            Ok((topics, usage)) => {
                results.usage.add(usage);
                results.cache_misses += 1;
                store_json(storage, run_id, TASK_REFINE_TOPICS, &hash, &results.model, &topics)
                    .await;
                results.topics = topics;
            }
            Err(e) => {
                warn!(error = %e, "topic refinement failed, keeping heuristic topics");
            }
        },
    }

    // Cluster and TOC prompts run over whichever topic set survived.
    let working: &[Topic] = if results.topics.is_empty() {
        base_topics
    } else {
        &results.topics
    };

    // --- Task 2: semantic clustering ---
    progress.task(2, total_tasks, "Clustering topics");
    let titles_key = working
        .iter()
        .map(|t| t.title.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let hash = prompt_hash(&titles_key, TASK_CLUSTER_TOPICS);

    match cached_json::<Vec<TopicCluster>>(
        storage,
        run_id,
        TASK_CLUSTER_TOPICS,
        &hash,
        &results.model,
    )
    .await?
    {
        Some(clusters) => {
            results.clusters = clusters;
            results.cache_hits += 1;
        }
        None => match client.cluster_topics(working, num_topics).await {
            Ok((clusters, usage)) => {
                results.usage.add(usage);
                results.cache_misses += 1;
                store_json(
                    storage,
                    run_id,
                    TASK_CLUSTER_TOPICS,
                    &hash,
                    &results.model,
                    &clusters,
                )
                .await;
                results.clusters = clusters;
            }
            Err(e) => {
                warn!(error = %e, "semantic clustering failed, keeping local clusters");
            }
        },
    }

    // --- Task 3: enhanced TOC ---
    progress.task(3, total_tasks, "Generating table of contents");
    let topics_key =
        serde_json::to_string(working).unwrap_or_else(|_| titles_key.clone());
    let hash = prompt_hash(&topics_key, TASK_GENERATE_TOC);

    match storage
        .get_enrichment_cache(run_id, TASK_GENERATE_TOC, &hash, &results.model)
        .await?
    {
        Some(toc) => {
            results.toc_markdown = Some(toc);
            results.cache_hits += 1;
        }
        None => match client.generate_toc(working).await {
            Ok((toc, usage)) if !toc.trim().is_empty() => {
                results.usage.add(usage);
                results.cache_misses += 1;
                let _ = storage
                    .set_enrichment_cache(run_id, TASK_GENERATE_TOC, &hash, &results.model, &toc)
                    .await;
                results.toc_markdown = Some(toc);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "TOC generation failed, using structural TOC");
            }
        },
    }

    info!(
        cache_hits = results.cache_hits,
        cache_misses = results.cache_misses,
        tokens_in = results.usage.tokens_in,
        tokens_out = results.usage.tokens_out,
        "enrichment complete"
    );

    Ok(results)
}

// ---------------------------------------------------------------------------
// Cache helpers
// ---------------------------------------------------------------------------

/// Compute a prompt hash for cache keying.
pub(crate) fn prompt_hash(content: &str, task_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(task_type.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fetch and decode a cached JSON task result. A corrupt cache entry is
/// treated as a miss.
async fn cached_json<T: serde::de::DeserializeOwned>(
    storage: &Storage,
    run_id: &str,
    task_type: &str,
    hash: &str,
    model: &str,
) -> Result<Option<T>> {
    let Some(raw) = storage
        .get_enrichment_cache(run_id, task_type, hash, model)
        .await?
    else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(task_type, error = %e, "discarding corrupt cache entry");
            Ok(None)
        }
    }
}

/// Serialize and store a task result; cache failures only warn.
async fn store_json<T: serde::Serialize>(
    storage: &Storage,
    run_id: &str,
    task_type: &str,
    hash: &str,
    model: &str,
    value: &T,
) {
    match serde_json::to_string(value) {
        Ok(json) => {
            if let Err(e) = storage
                .set_enrichment_cache(run_id, task_type, hash, model, &json)
                .await
            {
                warn!(task_type, error = %e, "failed to cache enrichment result");
            }
        }
        Err(e) => warn!(task_type, error = %e, "failed to serialize enrichment result"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
