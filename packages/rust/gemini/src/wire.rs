//! Wire types for the Gemini REST API (`v1beta` generateContent /
//! batchEmbedContents) and the JSON payloads our prompts ask the model to
//! return.

use serde::{Deserialize, Serialize};

use depoindex_shared::{Topic, TopicCluster};

// ---------------------------------------------------------------------------
// generateContent request
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Part {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

pub(crate) fn permissive_safety_settings() -> Vec<SafetySetting> {
    const CATEGORIES: [&str; 4] = [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ];
    CATEGORIES
        .into_iter()
        .map(|category| SafetySetting {
            category,
            threshold: "BLOCK_NONE",
        })
        .collect()
}

// ---------------------------------------------------------------------------
// generateContent response
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
}

// ---------------------------------------------------------------------------
// batchEmbedContents
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct BatchEmbedRequest {
    pub requests: Vec<EmbedRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EmbedRequest {
    pub model: String,
    pub content: Content,
    pub output_dimensionality: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchEmbedResponse {
    #[serde(default)]
    pub embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingValues {
    pub values: Vec<f32>,
}

// ---------------------------------------------------------------------------
// Task payloads (what our prompts ask the model to emit)
// ---------------------------------------------------------------------------

/// `{"topics": [...]}` from the topic-generation prompt.
#[derive(Debug, Deserialize)]
pub(crate) struct TopicsPayload {
    #[serde(default)]
    pub topics: Vec<TopicPayload>,
}

/// One topic as returned by the model; every field is optional so a sloppy
/// response degrades to defaults instead of failing the run.
#[derive(Debug, Deserialize)]
pub(crate) struct TopicPayload {
    pub title: Option<String>,
    pub page: Option<u32>,
    pub line: Option<u32>,
    pub context: Option<String>,
    pub is_key_issue: Option<bool>,
    pub confidence: Option<f32>,
    #[serde(default)]
    pub related_topics: Vec<String>,
    pub legal_significance: Option<String>,
}

impl From<TopicPayload> for Topic {
    fn from(p: TopicPayload) -> Self {
        Topic {
            title: p
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Unspecified Topic".to_string()),
            page: p.page.unwrap_or(1),
            line: p.line.unwrap_or(1),
            excerpt: p.context.unwrap_or_default(),
            is_key_issue: p.is_key_issue.unwrap_or(false),
            confidence: p.confidence.unwrap_or(0.7),
            related: p.related_topics,
            legal_significance: p.legal_significance,
        }
    }
}

/// `{"clusters": [...]}` from the clustering prompt.
#[derive(Debug, Deserialize)]
pub(crate) struct ClustersPayload {
    #[serde(default)]
    pub clusters: Vec<ClusterPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClusterPayload {
    pub name: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub legal_theme: Option<String>,
    #[serde(default)]
    pub key_issues: Vec<String>,
    pub confidence: Option<f32>,
    pub representative_excerpt: Option<String>,
}

impl From<ClusterPayload> for TopicCluster {
    fn from(p: ClusterPayload) -> Self {
        TopicCluster {
            name: p
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Unnamed Cluster".to_string()),
            members: p.topics,
            legal_theme: p.legal_theme,
            key_issues: p.key_issues,
            confidence: p.confidence.unwrap_or(0.7),
            representative_excerpt: p.representative_excerpt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_serializes_camel_case() {
        let req = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "hello".into(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.95,
                response_mime_type: Some("application/json"),
            },
            safety_settings: permissive_safety_settings(),
        };

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""generationConfig""#));
        assert!(json.contains(r#""responseMimeType":"application/json""#));
        assert!(json.contains(r#""safetySettings""#));
        assert!(json.contains(r#""threshold":"BLOCK_NONE""#));
    }

    #[test]
    fn plain_text_mode_omits_mime_type() {
        let config = GenerationConfig {
            temperature: 0.3,
            top_p: 0.95,
            response_mime_type: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("responseMimeType"));
    }

    #[test]
    fn response_deserializes_usage() {
        let json = r#"{
            "candidates": [{"content": {"parts": [{"text": "ok"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 35}
        }"#;
        let resp: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.candidates.len(), 1);
        let usage = resp.usage_metadata.unwrap();
        assert_eq!(usage.prompt_token_count, 120);
        assert_eq!(usage.candidates_token_count, 35);
    }

    #[test]
    fn topic_payload_defaults() {
        let json = r#"{"topics": [{"context": "some testimony"}]}"#;
        let payload: TopicsPayload = serde_json::from_str(json).unwrap();
        let topic: Topic = payload.topics.into_iter().next().unwrap().into();

        assert_eq!(topic.title, "Unspecified Topic");
        assert_eq!(topic.page, 1);
        assert_eq!(topic.line, 1);
        assert_eq!(topic.confidence, 0.7);
        assert_eq!(topic.excerpt, "some testimony");
    }

    #[test]
    fn cluster_payload_maps_members() {
        let json = r#"{"clusters": [{
            "name": "Accident Sequence",
            "topics": ["Braking", "Impact"],
            "legal_theme": "Negligence",
            "key_issues": ["speed", "visibility"],
            "confidence": 0.9,
            "representative_excerpt": "I hit the brakes"
        }]}"#;
        let payload: ClustersPayload = serde_json::from_str(json).unwrap();
        let cluster: TopicCluster = payload.clusters.into_iter().next().unwrap().into();

        assert_eq!(cluster.name, "Accident Sequence");
        assert_eq!(cluster.members, vec!["Braking", "Impact"]);
        assert_eq!(cluster.legal_theme.as_deref(), Some("Negligence"));
        assert_eq!(cluster.key_issues.len(), 2);
        assert_eq!(cluster.confidence, 0.9);
    }

    #[test]
    fn empty_payloads_tolerated() {
        let topics: TopicsPayload = serde_json::from_str("{}").unwrap();
        assert!(topics.topics.is_empty());
        let clusters: ClustersPayload = serde_json::from_str("{}").unwrap();
        assert!(clusters.clusters.is_empty());
    }
}
