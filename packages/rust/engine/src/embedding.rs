//! Deterministic local embeddings.
//!
//! When no API key is configured (and in tests) chunks are embedded with a
//! hash-derived vector: token SHA-256 digests scattered into a fixed-size
//! vector, then L2-normalized. Texts sharing vocabulary land near each other,
//! which is enough for k-means to group repeated subject matter, and the
//! output is bit-stable across runs.

use sha2::{Digest, Sha256};

use crate::keywords::tokenize;

/// Embedding dimensionality shared by both providers.
pub const EMBEDDING_DIM: usize = 384;

/// Deterministic bag-of-tokens embedder.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    /// Embed a batch of texts.
    pub fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }

    /// Embed a single text into a normalized `EMBEDDING_DIM` vector.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            // Each 4-byte window votes for one dimension with a signed weight.
            for window in digest.chunks_exact(4) {
                let val = u32::from_le_bytes([window[0], window[1], window[2], window[3]]);
                let dim = (val as usize) % EMBEDDING_DIM;
                let sign = if val & 1 == 0 { 1.0 } else { -1.0 };
                vector[dim] += sign;
            }
        }

        normalize(&mut vector);
        vector
    }
}

/// L2-normalize in place; zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for v in vector.iter_mut() {
            *v /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosine_similarity;

    #[test]
    fn embeddings_have_fixed_dimension() {
        let embedder = HashEmbedder;
        let v = embedder.embed_one("the witness saw the vehicle");
        assert_eq!(v.len(), EMBEDDING_DIM);
    }

    #[test]
    fn embeddings_are_deterministic() {
        let embedder = HashEmbedder;
        let a = embedder.embed_one("skid marks on the pavement");
        let b = embedder.embed_one("skid marks on the pavement");
        assert_eq!(a, b);
    }

    #[test]
    fn embeddings_are_normalized() {
        let embedder = HashEmbedder;
        let v = embedder.embed_one("contract breach damages");
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_is_closer_than_disjoint() {
        let embedder = HashEmbedder;
        let a = embedder.embed_one("vehicle accident intersection braking");
        let b = embedder.embed_one("vehicle accident intersection skidding");
        let c = embedder.embed_one("contract signature negotiation breach");

        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn stopword_only_text_embeds_to_zero() {
        let embedder = HashEmbedder;
        let v = embedder.embed_one("the and for");
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn batch_matches_single() {
        let embedder = HashEmbedder;
        let batch = embedder.embed(&["one testimony".to_string(), "two exhibits".to_string()]);
        assert_eq!(batch[0], embedder.embed_one("one testimony"));
        assert_eq!(batch[1], embedder.embed_one("two exhibits"));
    }
}
