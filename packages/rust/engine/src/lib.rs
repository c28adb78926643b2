//! Clustering engine: embeddings, k-means, TF-IDF labels, and the topic index.
//!
//! The engine is synchronous and does no I/O. Callers supply chunk
//! embeddings (from the Gemini API or the local [`HashEmbedder`]) and get
//! back labeled clusters plus a nearest-neighbor topic lookup.

mod embedding;
mod keywords;
mod kmeans;

use tracing::{debug, instrument};

use depoindex_shared::{DepoIndexError, Result};
use depoindex_transcript::Chunk;

pub use embedding::{EMBEDDING_DIM, HashEmbedder, normalize};
pub use keywords::{cluster_labels, tokenize};
pub use kmeans::kmeans;

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// A chunk with its cluster assignment and topic name.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledChunk {
    pub chunk: Chunk,
    pub cluster: usize,
    pub topic_name: String,
}

/// Clustered, labeled chunks plus their embeddings, supporting
/// nearest-neighbor topic lookup for unseen text.
#[derive(Debug, Clone)]
pub struct TopicIndex {
    chunks: Vec<LabeledChunk>,
    embeddings: Vec<Vec<f32>>,
    labels: Vec<String>,
}

impl TopicIndex {
    /// Cluster `chunks` by their `embeddings` into at most `num_clusters`
    /// groups and label each group with TF-IDF keywords.
    #[instrument(skip_all, fields(chunks = chunks.len(), num_clusters))]
    pub fn build(
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        num_clusters: usize,
    ) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(DepoIndexError::Embedding(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        if chunks.is_empty() {
            return Err(DepoIndexError::validation("no chunks to cluster"));
        }

        let assignments = kmeans(&embeddings, num_clusters);
        let cluster_count = assignments.iter().max().map_or(0, |m| m + 1);

        // Concatenate member text per cluster for labeling.
        let mut cluster_texts = vec![String::new(); cluster_count];
        for (chunk, &label) in chunks.iter().zip(assignments.iter()) {
            if !cluster_texts[label].is_empty() {
                cluster_texts[label].push(' ');
            }
            cluster_texts[label].push_str(&chunk.text);
        }

        let labels = cluster_labels(&cluster_texts);
        debug!(clusters = cluster_count, "topic index built");

        let chunks = chunks
            .into_iter()
            .zip(assignments)
            .map(|(chunk, cluster)| LabeledChunk {
                topic_name: labels[cluster].clone(),
                chunk,
                cluster,
            })
            .collect();

        Ok(Self {
            chunks,
            embeddings,
            labels,
        })
    }

    /// Labeled chunks in transcript order.
    pub fn chunks(&self) -> &[LabeledChunk] {
        &self.chunks
    }

    /// Cluster labels, indexed by cluster id.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of clusters.
    pub fn cluster_count(&self) -> usize {
        self.labels.len()
    }

    /// Find the topic of the chunk most similar to `embedding`.
    ///
    /// Returns the topic name and the page/line reference of the matched
    /// chunk, or `None` on an empty index.
    pub fn nearest_topic(&self, embedding: &[f32]) -> Option<(&str, u32, u32)> {
        let (best, _) = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(e, embedding)))
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))?;

        let chunk = &self.chunks[best];
        Some((chunk.topic_name.as_str(), chunk.chunk.page, chunk.chunk.line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(text: &str, page: u32, line: u32) -> Chunk {
        Chunk {
            text: text.to_string(),
            page,
            line,
        }
    }

    fn accident_and_contract() -> (Vec<Chunk>, Vec<Vec<f32>>) {
        let chunks = vec![
            make_chunk("vehicle accident intersection braking skid", 1, 1),
            make_chunk("vehicle accident crosswalk braking collision", 1, 4),
            make_chunk("contract signature negotiation breach terms", 3, 1),
            make_chunk("contract signature amendment breach clause", 3, 4),
        ];
        let embedder = HashEmbedder;
        let embeddings = embedder.embed(&chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>());
        (chunks, embeddings)
    }

    #[test]
    fn build_groups_similar_chunks() {
        let (chunks, embeddings) = accident_and_contract();
        let index = TopicIndex::build(chunks, embeddings, 2).unwrap();

        let labeled = index.chunks();
        assert_eq!(labeled[0].cluster, labeled[1].cluster);
        assert_eq!(labeled[2].cluster, labeled[3].cluster);
        assert_ne!(labeled[0].cluster, labeled[2].cluster);
    }

    #[test]
    fn cluster_names_attach_to_chunks() {
        let (chunks, embeddings) = accident_and_contract();
        let index = TopicIndex::build(chunks, embeddings, 2).unwrap();

        for labeled in index.chunks() {
            assert_eq!(labeled.topic_name, index.labels()[labeled.cluster]);
            assert!(!labeled.topic_name.is_empty());
        }
    }

    #[test]
    fn nearest_topic_matches_vocabulary() {
        let (chunks, embeddings) = accident_and_contract();
        let index = TopicIndex::build(chunks, embeddings, 2).unwrap();

        let embedder = HashEmbedder;
        let probe = embedder.embed_one("braking before the accident at the intersection");
        let (topic, page, _line) = index.nearest_topic(&probe).unwrap();

        assert_eq!(page, 1);
        assert_eq!(topic, index.chunks()[0].topic_name);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let (chunks, _) = accident_and_contract();
        let err = TopicIndex::build(chunks, vec![vec![0.0; 4]], 2).unwrap_err();
        assert!(err.to_string().contains("embeddings"));
    }

    #[test]
    fn empty_input_rejected() {
        let err = TopicIndex::build(vec![], vec![], 2).unwrap_err();
        assert!(err.to_string().contains("no chunks"));
    }

    #[test]
    fn more_clusters_than_chunks_is_clamped() {
        let chunks = vec![make_chunk("damages award calculation", 1, 1)];
        let embedder = HashEmbedder;
        let embeddings = embedder.embed(&["damages award calculation".to_string()]);
        let index = TopicIndex::build(chunks, embeddings, 5).unwrap();
        assert_eq!(index.cluster_count(), 1);
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
