//! Core domain types for DepoIndex analysis runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the run manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for analysis-run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// AnalysisManifest
// ---------------------------------------------------------------------------

/// The `manifest.json` structure stored at the root of each run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisManifest {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Unique identifier for this run.
    pub id: RunId,
    /// Human-readable name.
    pub name: String,
    /// Path to the source transcript file.
    pub source_path: String,
    /// Tool version that created this run.
    pub tool_version: String,
    /// When the run was first created.
    pub created_at: DateTime<Utc>,
    /// When the run was last updated.
    pub updated_at: DateTime<Utc>,
    /// Number of transcript lines parsed.
    pub line_count: usize,
    /// Number of transcript pages spanned.
    pub page_count: u32,
    /// Number of chunks the transcript was split into.
    pub chunk_count: usize,
    /// Number of topics in the final table of contents.
    pub topic_count: usize,
    /// Analysis configuration used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// Artifact metadata (populated after assembly).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<serde_json::Value>,
    /// Enrichment metadata (model, tokens, timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// A detected deposition topic anchored to a page/line reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Concise topic title.
    pub title: String,
    /// Transcript page the topic starts on.
    pub page: u32,
    /// Transcript line the topic starts on.
    pub line: u32,
    /// Excerpt of the testimony the topic was derived from.
    pub excerpt: String,
    /// Whether the topic covers a key legal issue.
    #[serde(default)]
    pub is_key_issue: bool,
    /// Detection confidence in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Related legal concepts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
    /// Legal significance note, if assessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_significance: Option<String>,
}

fn default_confidence() -> f32 {
    0.7
}

impl Topic {
    /// Build a topic with only the required fields; the rest take defaults.
    pub fn new(title: impl Into<String>, page: u32, line: u32, excerpt: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            page,
            line,
            excerpt: excerpt.into(),
            is_key_issue: false,
            confidence: default_confidence(),
            related: Vec::new(),
            legal_significance: None,
        }
    }

    /// Ordering key: topics sort by transcript position.
    pub fn position(&self) -> (u32, u32) {
        (self.page, self.line)
    }
}

// ---------------------------------------------------------------------------
// TopicCluster
// ---------------------------------------------------------------------------

/// A semantically related group of topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCluster {
    /// Concise cluster name.
    pub name: String,
    /// Titles of member topics.
    pub members: Vec<String>,
    /// Primary legal theme the cluster covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_theme: Option<String>,
    /// Key issues covered by the cluster.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_issues: Vec<String>,
    /// Clustering confidence in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// A representative testimony excerpt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representative_excerpt: Option<String>,
}

// ---------------------------------------------------------------------------
// Toc
// ---------------------------------------------------------------------------

/// A single entry in the table of contents (`toc.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Display title.
    pub title: String,
    /// Transcript page reference.
    pub page: u32,
    /// Transcript line reference.
    pub line: u32,
    /// Marked as a key legal issue.
    #[serde(default)]
    pub key_issue: bool,
    /// Nested child entries (cluster members).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocEntry>,
}

/// Root structure for `toc.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toc {
    /// Top-level sections.
    pub sections: Vec<TocEntry>,
}

// ---------------------------------------------------------------------------
// TokenUsage
// ---------------------------------------------------------------------------

/// Token accounting for a single LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub tokens_in: u64,
    pub tokens_out: u64,
}

impl TokenUsage {
    /// Accumulate another call's usage into this total.
    pub fn add(&mut self, other: TokenUsage) {
        self.tokens_in += other.tokens_in;
        self.tokens_out += other.tokens_out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn manifest_serialization() {
        let manifest = AnalysisManifest {
            schema_version: CURRENT_SCHEMA_VERSION,
            id: RunId::new(),
            name: "smith-deposition".into(),
            source_path: "data/smith_transcript.txt".into(),
            tool_version: "0.1.0".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            line_count: 120,
            page_count: 4,
            chunk_count: 40,
            topic_count: 5,
            config: None,
            artifacts: None,
            enrichment: None,
        };

        let json = serde_json::to_string_pretty(&manifest).expect("serialize");
        let parsed: AnalysisManifest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(parsed.name, "smith-deposition");
        assert_eq!(parsed.topic_count, 5);
    }

    #[test]
    fn topic_defaults_on_deserialize() {
        let json = r#"{"title":"Employment history","page":3,"line":14,"excerpt":"..."}"#;
        let topic: Topic = serde_json::from_str(json).expect("deserialize");
        assert!(!topic.is_key_issue);
        assert_eq!(topic.confidence, 0.7);
        assert!(topic.related.is_empty());
        assert!(topic.legal_significance.is_none());
    }

    #[test]
    fn topic_position_key() {
        let a = Topic::new("A", 2, 5, "");
        let b = Topic::new("B", 2, 9, "");
        let c = Topic::new("C", 1, 30, "");
        let mut topics = vec![a.clone(), b.clone(), c.clone()];
        topics.sort_by_key(Topic::position);
        assert_eq!(topics, vec![c, a, b]);
    }

    #[test]
    fn toc_entry_serialization() {
        let toc = Toc {
            sections: vec![TocEntry {
                title: "Accident / Scene / Vehicle".into(),
                page: 1,
                line: 1,
                key_issue: true,
                children: vec![TocEntry {
                    title: "Describe the intersection".into(),
                    page: 1,
                    line: 4,
                    key_issue: false,
                    children: vec![],
                }],
            }],
        };

        let json = serde_json::to_string(&toc).expect("serialize");
        let parsed: Toc = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.sections.len(), 1);
        assert_eq!(parsed.sections[0].children.len(), 1);
        assert!(parsed.sections[0].key_issue);
    }

    #[test]
    fn token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage {
            tokens_in: 100,
            tokens_out: 40,
        });
        total.add(TokenUsage {
            tokens_in: 50,
            tokens_out: 10,
        });
        assert_eq!(total.tokens_in, 150);
        assert_eq!(total.tokens_out, 50);
    }
}
