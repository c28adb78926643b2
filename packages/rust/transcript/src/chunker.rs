//! Fixed-size chunking of parsed transcript lines.
//!
//! Chunks are the unit fed to the embedding and clustering layers. Each chunk
//! keeps the page/line reference of its first member line so downstream
//! topics stay anchored to the transcript.

use serde::{Deserialize, Serialize};

use depoindex_shared::{DepoIndexError, Result};

use crate::TranscriptLine;

/// A group of consecutive transcript lines, joined into one text block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub page: u32,
    pub line: u32,
}

/// Group `lines` into chunks of `chunk_size` consecutive lines.
///
/// Text is joined with single spaces. Order is preserved and every line lands
/// in exactly one chunk; the final chunk may be short.
pub fn chunk_lines(lines: &[TranscriptLine], chunk_size: usize) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(DepoIndexError::validation("chunk_size must be at least 1"));
    }

    Ok(lines
        .chunks(chunk_size)
        .map(|group| Chunk {
            text: group
                .iter()
                .map(|l| l.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            page: group[0].page,
            line: group[0].line,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_lines(n: u32) -> Vec<TranscriptLine> {
        (1..=n)
            .map(|i| TranscriptLine {
                page: (i - 1) / 30 + 1,
                line: i,
                text: format!("line {i}"),
            })
            .collect()
    }

    #[test]
    fn chunks_carry_first_reference() {
        let lines = make_lines(7);
        let chunks = chunk_lines(&lines, 3).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "line 1 line 2 line 3");
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[0].line, 1);
        assert_eq!(chunks[1].line, 4);
        // Trailing partial chunk
        assert_eq!(chunks[2].text, "line 7");
        assert_eq!(chunks[2].line, 7);
    }

    #[test]
    fn every_line_lands_in_one_chunk() {
        let lines = make_lines(10);
        let chunks = chunk_lines(&lines, 4).unwrap();
        let total_words: usize = chunks
            .iter()
            .map(|c| c.text.split_whitespace().count())
            .sum();
        // Each line contributes two words ("line N").
        assert_eq!(total_words, 20);
    }

    #[test]
    fn empty_input_gives_no_chunks() {
        let chunks = chunk_lines(&[], 3).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let lines = make_lines(3);
        assert!(chunk_lines(&lines, 0).is_err());
    }
}
