//! TF-IDF keyword labels for topic clusters.
//!
//! Each cluster's member chunks are concatenated into one document; terms are
//! scored with tf × idf across the cluster documents and the top three become
//! the cluster label (`"Accident / Vehicle / Intersection"`).

use std::collections::HashMap;

/// Terms shorter than this are ignored.
const MIN_TOKEN_LEN: usize = 3;

/// Keywords per cluster label.
const LABEL_KEYWORDS: usize = 3;

/// Label for clusters whose text yields no scorable terms.
const FALLBACK_LABEL: &str = "Miscellaneous";

/// Produce one label per cluster document.
///
/// `cluster_texts[i]` is the concatenated text of cluster `i`'s chunks.
pub fn cluster_labels(cluster_texts: &[String]) -> Vec<String> {
    let tokenized: Vec<Vec<String>> = cluster_texts.iter().map(|t| tokenize(t)).collect();

    // Document frequency of each term across cluster documents.
    let mut df: HashMap<&str, usize> = HashMap::new();
    for tokens in &tokenized {
        let mut seen: Vec<&str> = Vec::new();
        for token in tokens {
            if !seen.contains(&token.as_str()) {
                seen.push(token);
                *df.entry(token).or_insert(0) += 1;
            }
        }
    }

    let n_docs = tokenized.len() as f64;

    tokenized
        .iter()
        .map(|tokens| {
            if tokens.is_empty() {
                return FALLBACK_LABEL.to_string();
            }

            let mut tf: HashMap<&str, usize> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }

            let mut scored: Vec<(&str, f64)> = tf
                .iter()
                .map(|(term, &count)| {
                    let term_df = df.get(term).copied().unwrap_or(1) as f64;
                    let idf = (n_docs / term_df).ln() + 1.0;
                    (*term, count as f64 / tokens.len() as f64 * idf)
                })
                .collect();

            // Ties break alphabetically so labels stay deterministic.
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });

            scored
                .iter()
                .take(LABEL_KEYWORDS)
                .map(|(term, _)| title_case(term))
                .collect::<Vec<_>>()
                .join(" / ")
        })
        .collect()
}

/// Lowercase alphanumeric tokens, stopwords and short terms removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() >= MIN_TOKEN_LEN && !is_stopword(w))
        .collect()
}

/// Uppercase the first letter of a term.
fn title_case(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(c) => {
            let upper: String = c.to_uppercase().collect();
            format!("{upper}{}", chars.collect::<String>())
        }
        None => String::new(),
    }
}

/// English stopwords plus transcript boilerplate.
fn is_stopword(word: &str) -> bool {
    matches!(
        word,
        "the" | "and" | "for" | "that" | "this" | "with" | "from" | "have" | "has" | "are"
            | "was" | "were" | "been" | "did" | "you" | "your" | "not" | "but" | "his" | "her"
            | "they" | "them" | "then" | "than" | "what" | "when" | "where" | "who" | "how"
            | "would" | "could" | "can" | "will" | "about" | "there" | "which" | "witness"
            | "court" | "objection" | "question" | "answer"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_stopwords_and_short_terms() {
        let tokens = tokenize("The witness saw a red car at the intersection");
        assert_eq!(tokens, vec!["saw", "red", "car", "intersection"]);
    }

    #[test]
    fn labels_pick_distinctive_terms() {
        let texts = vec![
            "vehicle accident intersection vehicle braking skid accident".to_string(),
            "contract signature negotiation contract breach signature".to_string(),
        ];

        let labels = cluster_labels(&texts);
        assert_eq!(labels.len(), 2);
        assert!(labels[0].contains("Accident") || labels[0].contains("Vehicle"));
        assert!(labels[1].contains("Contract") || labels[1].contains("Signature"));
        // Labels are " / " joined title-cased terms
        assert_eq!(labels[0].split(" / ").count(), 3);
    }

    #[test]
    fn empty_cluster_gets_fallback_label() {
        let texts = vec!["the and for".to_string(), "damages award testimony".to_string()];
        let labels = cluster_labels(&texts);
        assert_eq!(labels[0], "Miscellaneous");
        assert_ne!(labels[1], "Miscellaneous");
    }

    #[test]
    fn labels_are_deterministic() {
        let texts = vec!["alpha beta gamma delta".to_string()];
        assert_eq!(cluster_labels(&texts), cluster_labels(&texts));
    }

    #[test]
    fn fewer_terms_than_keywords_still_labels() {
        let texts = vec!["damages".to_string()];
        let labels = cluster_labels(&texts);
        assert_eq!(labels[0], "Damages");
    }
}
