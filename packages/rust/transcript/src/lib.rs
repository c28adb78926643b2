//! Deposition transcript parsing and chunking.
//!
//! Transcripts arrive either in the explicit page/line format court reporters
//! produce:
//!
//! ```text
//! Page 1
//! Line 1: MR. SMITH: Good morning.
//! Line 2: THE WITNESS: Good morning.
//! Page 2
//! ...
//! ```
//!
//! or as plain text, in which case page/line references are synthesized
//! positionally ([`LINES_PER_PAGE`] lines to a page).

mod chunker;
mod heuristics;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use depoindex_shared::{DepoIndexError, Result};

pub use chunker::{Chunk, chunk_lines};
pub use heuristics::{SpeakerTopic, detect_speaker_topics, title_from_line};

/// Lines per page when synthesizing references for unstructured text.
pub const LINES_PER_PAGE: u32 = 30;

static PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Page\s+(\d+)\s*$").expect("page regex"));
static LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Line\s+(\d+):\s+(.*)$").expect("line regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single transcript line with its page/line reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub page: u32,
    pub line: u32,
    pub text: String,
}

/// Summary statistics over a parsed transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptStats {
    pub line_count: usize,
    pub page_count: u32,
    pub word_count: usize,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a transcript into page/line-referenced lines.
///
/// `Page N` markers set the current page and emit no line of their own;
/// `Line N: text` entries are taken verbatim. If the document contains no
/// explicit `Line` entries at all, every non-empty line is kept and
/// references are synthesized from its position in the raw text.
///
/// Returns `Validation` if no usable lines are found.
#[instrument(skip(text), fields(bytes = text.len()))]
pub fn parse(text: &str) -> Result<Vec<TranscriptLine>> {
    let mut parsed: Vec<TranscriptLine> = Vec::new();
    let mut current_page: u32 = 1;
    let mut saw_markers = false;

    for raw in text.lines() {
        let trimmed = raw.trim();

        if let Some(caps) = PAGE_RE.captures(trimmed) {
            saw_markers = true;
            // Invalid page numbers keep the previous page rather than failing the parse.
            if let Ok(page) = caps[1].parse::<u32>() {
                current_page = page;
            }
            continue;
        }

        if let Some(caps) = LINE_RE.captures(trimmed) {
            saw_markers = true;
            let line = caps[1]
                .parse::<u32>()
                .map_err(|e| DepoIndexError::parse(format!("bad line number: {e}")))?;
            parsed.push(TranscriptLine {
                page: current_page,
                line,
                text: caps[2].trim().to_string(),
            });
        }
    }

    if !saw_markers {
        parsed = parse_positional(text);
    }

    if parsed.is_empty() {
        return Err(DepoIndexError::validation(
            "transcript contains no usable lines",
        ));
    }

    debug!(lines = parsed.len(), structured = saw_markers, "transcript parsed");
    Ok(parsed)
}

/// Fallback for plain text: number every non-empty line positionally.
fn parse_positional(text: &str) -> Vec<TranscriptLine> {
    text.lines()
        .enumerate()
        .filter(|(_, raw)| !raw.trim().is_empty())
        .map(|(idx, raw)| TranscriptLine {
            page: idx as u32 / LINES_PER_PAGE + 1,
            line: idx as u32 + 1,
            text: raw.trim().to_string(),
        })
        .collect()
}

/// Compute line/page/word statistics for a parsed transcript.
pub fn stats(lines: &[TranscriptLine]) -> TranscriptStats {
    TranscriptStats {
        line_count: lines.len(),
        page_count: lines.iter().map(|l| l.page).max().unwrap_or(0),
        word_count: lines
            .iter()
            .map(|l| l.text.split_whitespace().count())
            .sum(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
