//! Async Gemini API client for topic generation, semantic clustering,
//! TOC generation, and text embedding.
//!
//! All calls go through a shared rate limiter (minimum interval between
//! requests) and surface token usage from the API's `usageMetadata`.

mod wire;

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use depoindex_shared::{DepoIndexError, Result, TokenUsage, Topic, TopicCluster};

use wire::{
    BatchEmbedRequest, BatchEmbedResponse, ClustersPayload, Content, EmbedRequest,
    GenerateRequest, GenerateResponse, GenerationConfig, Part, TopicsPayload,
    permissive_safety_settings,
};

/// Default API endpoint; overridable for tests.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Transcript text beyond this many chars is truncated before prompting.
const MAX_TRANSCRIPT_CHARS: usize = 10_000;

/// Clusters per level in hierarchical clustering.
const HIERARCHY_FANOUT: usize = 3;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Connection and model options for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiOptions {
    /// API key (from the configured env var).
    pub api_key: String,
    /// Model for topic generation and TOC tasks.
    pub model: String,
    /// Model for semantic clustering.
    pub clustering_model: String,
    /// Embedding model.
    pub embed_model: String,
    /// Embedding dimensionality requested from the API.
    pub embed_dimension: usize,
    /// Sampling temperature for generation tasks.
    pub temperature: f32,
    /// Minimum ms between API calls.
    pub rate_limit_ms: u64,
    /// Endpoint override (tests); `None` uses the public API.
    pub base_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Gemini REST client with request throttling.
pub struct GeminiClient {
    http: reqwest::Client,
    opts: GeminiOptions,
    base_url: String,
    last_call: Mutex<Option<Instant>>,
}

/// A node in a hierarchical cluster tree.
#[derive(Debug, Clone)]
pub struct ClusterNode {
    pub cluster: TopicCluster,
    pub children: Vec<ClusterNode>,
}

impl GeminiClient {
    /// Build a client. Fails if the HTTP client cannot be constructed.
    pub fn new(opts: GeminiOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("DepoIndex/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DepoIndexError::Network(format!("client build: {e}")))?;

        let base_url = opts
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            http,
            opts,
            base_url,
            last_call: Mutex::new(None),
        })
    }

    /// Model used for generation tasks.
    pub fn model(&self) -> &str {
        &self.opts.model
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Identify `num_topics` key topics in a transcript.
    #[instrument(skip_all, fields(chars = transcript.len(), num_topics))]
    pub async fn generate_topics(
        &self,
        transcript: &str,
        num_topics: usize,
    ) -> Result<(Vec<Topic>, TokenUsage)> {
        let prompt = topics_prompt(transcript, num_topics);
        let (text, usage) = self
            .generate(&self.opts.model, &prompt, true)
            .await?;

        let payload: TopicsPayload = parse_json_response(&text)?;
        let topics: Vec<Topic> = payload.topics.into_iter().map(Topic::from).collect();
        debug!(topics = topics.len(), "topic generation complete");
        Ok((topics, usage))
    }

    /// Group topics into at most `max_clusters` semantically meaningful
    /// clusters with legal context.
    #[instrument(skip_all, fields(topics = topics.len(), max_clusters))]
    pub async fn cluster_topics(
        &self,
        topics: &[Topic],
        max_clusters: usize,
    ) -> Result<(Vec<TopicCluster>, TokenUsage)> {
        if topics.is_empty() {
            return Ok((Vec::new(), TokenUsage::default()));
        }

        let prompt = clusters_prompt(topics, max_clusters);
        let (text, usage) = self
            .generate(&self.opts.clustering_model, &prompt, true)
            .await?;

        let payload: ClustersPayload = parse_json_response(&text)?;
        let clusters: Vec<TopicCluster> =
            payload.clusters.into_iter().map(TopicCluster::from).collect();
        debug!(clusters = clusters.len(), "clustering complete");
        Ok((clusters, usage))
    }

    /// Build a cluster tree by recursively clustering each cluster's members,
    /// `levels` deep with [`HIERARCHY_FANOUT`] clusters per level.
    pub async fn hierarchical_clusters(
        &self,
        topics: &[Topic],
        levels: usize,
    ) -> Result<(Vec<ClusterNode>, TokenUsage)> {
        let mut usage = TokenUsage::default();
        let nodes = self.cluster_level(topics, levels, &mut usage).await?;
        Ok((nodes, usage))
    }

    async fn cluster_level(
        &self,
        topics: &[Topic],
        levels: usize,
        usage: &mut TokenUsage,
    ) -> Result<Vec<ClusterNode>> {
        if topics.is_empty() || levels == 0 {
            return Ok(Vec::new());
        }

        let (clusters, level_usage) = self.cluster_topics(topics, HIERARCHY_FANOUT).await?;
        usage.add(level_usage);

        let mut nodes = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let members: Vec<Topic> = topics
                .iter()
                .filter(|t| cluster.members.contains(&t.title))
                .cloned()
                .collect();

            // A cluster of one cannot split further; recursing would just
            // echo it back each level.
            let children = if members.len() > 1 {
                Box::pin(self.cluster_level(&members, levels - 1, usage)).await?
            } else {
                Vec::new()
            };

            nodes.push(ClusterNode { cluster, children });
        }

        Ok(nodes)
    }

    /// Produce a markdown table of contents for the topics.
    #[instrument(skip_all, fields(topics = topics.len()))]
    pub async fn generate_toc(&self, topics: &[Topic]) -> Result<(String, TokenUsage)> {
        if topics.is_empty() {
            return Ok((String::new(), TokenUsage::default()));
        }

        let prompt = toc_prompt(topics)?;
        self.generate(&self.opts.model, &prompt, false).await
    }

    /// Embed a batch of texts via `batchEmbedContents`.
    #[instrument(skip_all, fields(texts = texts.len()))]
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model_path = format!("models/{}", self.opts.embed_model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: model_path.clone(),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                    output_dimensionality: self.opts.embed_dimension,
                })
                .collect(),
        };

        let url = format!(
            "{}/{}:batchEmbedContents?key={}",
            self.base_url, model_path, self.opts.api_key
        );

        self.throttle().await;
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DepoIndexError::Network(format!("batchEmbedContents: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DepoIndexError::Gemini(format!(
                "batchEmbedContents HTTP {status}: {}",
                truncate_for_log(&body)
            )));
        }

        let parsed: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|e| DepoIndexError::Gemini(format!("invalid embed response: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(DepoIndexError::Embedding(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    /// Low-level `generateContent` call. Returns the first candidate's text
    /// and token usage.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        json_mode: bool,
    ) -> Result<(String, TokenUsage)> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.opts.temperature,
                top_p: 0.95,
                response_mime_type: json_mode.then_some("application/json"),
            },
            safety_settings: permissive_safety_settings(),
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.opts.api_key
        );

        self.throttle().await;
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DepoIndexError::Network(format!("generateContent: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DepoIndexError::Gemini(format!(
                "generateContent HTTP {status}: {}",
                truncate_for_log(&body)
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| DepoIndexError::Gemini(format!("invalid response: {e}")))?;

        let usage = parsed
            .usage_metadata
            .map(|u| TokenUsage {
                tokens_in: u.prompt_token_count,
                tokens_out: u.candidates_token_count,
            })
            .unwrap_or_default();

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| DepoIndexError::Gemini("response has no candidates".into()))?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason != "STOP" && reason != "MAX_TOKENS" {
                warn!(reason, "candidate finished abnormally");
            }
        }

        let text = candidate
            .content
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| DepoIndexError::Gemini("candidate has no text parts".into()))?;

        Ok((text, usage))
    }

    /// Enforce the minimum interval between API calls.
    async fn throttle(&self) {
        let interval = Duration::from_millis(self.opts.rate_limit_ms);
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn topics_prompt(transcript: &str, num_topics: usize) -> String {
    let excerpt = truncate_chars(transcript, MAX_TRANSCRIPT_CHARS);
    format!(
        "Analyze this legal deposition transcript and identify {num_topics} key topics.\n\
         For each topic provide:\n\
         - A concise 3-5 word title\n\
         - Page and line references\n\
         - Whether it contains key legal issues\n\
         - Confidence score (0-1)\n\
         - Related legal concepts\n\
         \n\
         Return in this JSON format:\n\
         {{\"topics\": [{{\"title\": \"string\", \"page\": 1, \"line\": 1, \
         \"context\": \"string\", \"is_key_issue\": false, \"confidence\": 0.0, \
         \"related_topics\": [\"string\"]}}]}}\n\
         \n\
         Transcript:\n{excerpt}"
    )
}

fn clusters_prompt(topics: &[Topic], max_clusters: usize) -> String {
    let topic_list: String = topics
        .iter()
        .map(|t| {
            format!(
                "- {} (Page {}, Line {}): {}",
                t.title,
                t.page,
                t.line,
                truncate_chars(&t.excerpt, 100)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "As a legal AI expert, analyze these deposition topics and group them into \
         {max_clusters} semantically meaningful clusters based on:\n\
         1. Legal issues addressed\n\
         2. Factual patterns\n\
         3. Testimony type\n\
         4. Relevance to case theories\n\
         \n\
         For each cluster provide a concise name (3-5 words), the member topics, the \
         primary legal theme, 3-5 key issues covered, a confidence score (0-1), and a \
         representative excerpt.\n\
         \n\
         Topics:\n{topic_list}\n\
         \n\
         Return JSON format:\n\
         {{\"clusters\": [{{\"name\": \"string\", \"topics\": [\"list\"], \
         \"legal_theme\": \"string\", \"key_issues\": [\"list\"], \
         \"confidence\": 0.0, \"representative_excerpt\": \"string\"}}]}}"
    )
}

fn toc_prompt(topics: &[Topic]) -> Result<String> {
    let topics_json = serde_json::to_string_pretty(topics)
        .map_err(|e| DepoIndexError::Gemini(format!("topic serialization: {e}")))?;

    Ok(format!(
        "Create a professional table of contents for a legal deposition using these \
         topics:\n{topics_json}\n\
         \n\
         Include:\n\
         - Logical section grouping\n\
         - Page/line references\n\
         - Key issue markers\n\
         - Hierarchical structure\n\
         \n\
         Return in Markdown format with headings."
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a JSON task response, tolerating markdown code fences.
fn parse_json_response<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    let stripped = strip_code_fences(text);
    serde_json::from_str(stripped)
        .map_err(|e| DepoIndexError::Gemini(format!("malformed JSON response: {e}")))
}

/// Remove a surrounding ```json ... ``` fence if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Truncate to a char boundary at most `max_chars` in.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Shorten an error body for log/error messages.
fn truncate_for_log(body: &str) -> String {
    truncate_chars(body, 200)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> GeminiOptions {
        GeminiOptions {
            api_key: "test-key".into(),
            model: "gemini-1.5-flash".into(),
            clustering_model: "gemini-1.5-pro".into(),
            embed_model: "text-embedding-004".into(),
            embed_dimension: 384,
            temperature: 0.3,
            rate_limit_ms: 1500,
            base_url: None,
        }
    }

    #[test]
    fn client_builds() {
        let client = GeminiClient::new(options()).unwrap();
        assert_eq!(client.model(), "gemini-1.5-flash");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn base_url_override() {
        let mut opts = options();
        opts.base_url = Some("http://localhost:9000/v1beta".into());
        let client = GeminiClient::new(opts).unwrap();
        assert_eq!(client.base_url, "http://localhost:9000/v1beta");
    }

    #[test]
    fn topics_prompt_truncates_transcript() {
        let long = "x".repeat(MAX_TRANSCRIPT_CHARS + 500);
        let prompt = topics_prompt(&long, 5);
        assert!(prompt.len() < long.len());
        assert!(prompt.contains("identify 5 key topics"));
    }

    #[test]
    fn clusters_prompt_lists_topics() {
        let topics = vec![
            Topic::new("Braking distance", 2, 14, "I hit the brakes hard"),
            Topic::new("Road conditions", 3, 2, "It was raining"),
        ];
        let prompt = clusters_prompt(&topics, 3);
        assert!(prompt.contains("- Braking distance (Page 2, Line 14): I hit the brakes hard"));
        assert!(prompt.contains("group them into 3 semantically meaningful clusters"));
    }

    #[test]
    fn toc_prompt_embeds_topics_json() {
        let topics = vec![Topic::new("Impact", 1, 1, "the moment of impact")];
        let prompt = toc_prompt(&topics).unwrap();
        assert!(prompt.contains("\"title\": \"Impact\""));
        assert!(prompt.contains("Markdown format"));
    }

    #[test]
    fn strip_code_fences_variants() {
        assert_eq!(strip_code_fences(r#"{"a":1}"#), r#"{"a":1}"#);
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn parse_json_response_with_fences() {
        let payload: TopicsPayload =
            parse_json_response("```json\n{\"topics\": []}\n```").unwrap();
        assert!(payload.topics.is_empty());
    }

    #[test]
    fn parse_json_response_rejects_garbage() {
        let err = parse_json_response::<TopicsPayload>("not json").unwrap_err();
        assert!(err.to_string().contains("malformed JSON"));
    }

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }

    #[tokio::test]
    async fn empty_inputs_short_circuit() {
        let client = GeminiClient::new(options()).unwrap();

        let (clusters, usage) = client.cluster_topics(&[], 3).await.unwrap();
        assert!(clusters.is_empty());
        assert_eq!(usage, TokenUsage::default());

        let (toc, _) = client.generate_toc(&[]).await.unwrap();
        assert!(toc.is_empty());

        let embeddings = client.embed_texts(&[]).await.unwrap();
        assert!(embeddings.is_empty());

        let (tree, usage) = client.hierarchical_clusters(&[], 2).await.unwrap();
        assert!(tree.is_empty());
        assert_eq!(usage, TokenUsage::default());
    }
}
