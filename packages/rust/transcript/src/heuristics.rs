//! Speaker-based topic detection.
//!
//! A cheap, offline pass over the transcript: lines opening with a speaker
//! marker (examination questions, colloquy) tend to introduce new subject
//! matter, so they seed topic entries even without any model in the loop.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::TranscriptLine;

static SPEAKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(MR|MS|MRS|THE WITNESS|THE COURT|BY MR|BY MS)").expect("speaker regex")
});
static SPEAKER_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(MR|MS|MRS)\.?\s+\w+:?\s*").expect("speaker prefix regex")
});
static METADATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(Page|Line)\b").expect("metadata regex"));
static HAS_LETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z]").expect("letter regex"));
static NUMERIC_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9 .\-]+$").expect("numeric regex"));

/// Maximum words kept in a heuristic topic title.
const MAX_TITLE_WORDS: usize = 7;

/// A topic candidate derived from a speaker line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerTopic {
    pub title: String,
    pub page: u32,
    pub line: u32,
    pub text: String,
}

/// Scan transcript lines for speaker-introduced topics.
///
/// A line qualifies when it contains at least one letter, does not look like
/// page/line metadata, and opens with a speaker marker (`MR.`, `MS.`,
/// `THE WITNESS`, `THE COURT`, `BY MR.`, ...).
pub fn detect_speaker_topics(lines: &[TranscriptLine]) -> Vec<SpeakerTopic> {
    let mut topics = Vec::new();

    for entry in lines {
        let text = entry.text.trim();

        if !HAS_LETTER_RE.is_match(text) {
            continue;
        }
        if METADATA_RE.is_match(text) || NUMERIC_ONLY_RE.is_match(text) {
            continue;
        }
        if !SPEAKER_RE.is_match(text) {
            continue;
        }

        topics.push(SpeakerTopic {
            title: title_from_line(text, MAX_TITLE_WORDS),
            page: entry.page,
            line: entry.line,
            text: text.to_string(),
        });
    }

    debug!(candidates = topics.len(), "speaker topic scan complete");
    topics
}

/// Extract a short title from a transcript line.
///
/// Strips the speaker prefix (`MR. SMITH:`), drops punctuation, and keeps the
/// first `max_words` words. An empty result yields `"Untitled Topic"`.
pub fn title_from_line(text: &str, max_words: usize) -> String {
    let without_speaker = SPEAKER_PREFIX_RE.replace(text, "");
    let cleaned: String = without_speaker
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    let words: Vec<&str> = cleaned.split_whitespace().take(max_words).collect();
    if words.is_empty() {
        "Untitled Topic".to_string()
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(page: u32, n: u32, text: &str) -> TranscriptLine {
        TranscriptLine {
            page,
            line: n,
            text: text.to_string(),
        }
    }

    #[test]
    fn detects_speaker_lines_only() {
        let lines = vec![
            line(1, 1, "MR. SMITH: When did you first see the defendant?"),
            line(1, 2, "A. Around noon, I believe."),
            line(1, 3, "THE COURT: Sustained."),
            line(1, 4, "Exhibit 14 marked for identification"),
        ];

        let topics = detect_speaker_topics(&lines);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].page, 1);
        assert_eq!(topics[0].line, 1);
        assert_eq!(topics[1].line, 3);
    }

    #[test]
    fn skips_metadata_and_numeric_lines() {
        let lines = vec![
            line(1, 1, "Page 14 of 120"),
            line(1, 2, "14 - 3"),
            line(1, 3, "MS. JONES: Let's move to the contract."),
        ];

        let topics = detect_speaker_topics(&lines);
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].title, "Lets move to the contract");
    }

    #[test]
    fn title_strips_speaker_prefix() {
        let title = title_from_line("MR. SMITH: When did you sign the agreement?", 7);
        assert_eq!(title, "When did you sign the agreement");
    }

    #[test]
    fn title_caps_word_count() {
        let title = title_from_line(
            "THE WITNESS: I drove to the warehouse and then back home again that evening",
            7,
        );
        assert_eq!(title.split_whitespace().count(), 7);
    }

    #[test]
    fn title_falls_back_when_empty() {
        assert_eq!(title_from_line("MR. SMITH:", 7), "Untitled Topic");
    }

    #[test]
    fn case_insensitive_speaker_match() {
        let lines = vec![line(2, 40, "by mr. lee: turning to exhibit three")];
        let topics = detect_speaker_topics(&lines);
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].page, 2);
    }
}
