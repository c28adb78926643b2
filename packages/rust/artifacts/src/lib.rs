//! Markdown artifact rendering for analysis runs.
//!
//! Three artifacts are produced per run:
//! - `toc.md` — the clustered table of contents
//! - `annotated_transcript.md` — numbered topic sections with excerpts
//! - `clusters.md` — cluster themes, key issues, and representative excerpts
//!
//! Renderers are pure string builders; the assembler owns file writes.

use tracing::debug;

use depoindex_shared::{Toc, TocEntry, Topic, TopicCluster};

/// Render the table of contents artifact (`toc.md`).
///
/// When an LLM-generated TOC is available it becomes the body; otherwise the
/// structural TOC is rendered as nested bullet lists.
pub fn generate_toc_md(
    name: &str,
    toc: &Toc,
    llm_toc: Option<&str>,
    tool_version: &str,
) -> String {
    let mut out = String::new();
    out.push_str("# Deposition Topic Table of Contents\n\n");
    out.push_str(&format!("Deposition: {name}\n\n"));

    match llm_toc {
        Some(body) if !body.trim().is_empty() => {
            out.push_str(body.trim());
            out.push('\n');
        }
        _ => {
            for section in &toc.sections {
                render_toc_entry(&mut out, section, 0);
            }
        }
    }

    push_footer(&mut out, tool_version);
    debug!(bytes = out.len(), "rendered toc.md");
    out
}

fn render_toc_entry(out: &mut String, entry: &TocEntry, depth: usize) {
    let indent = "  ".repeat(depth);
    let marker = if entry.key_issue { " [key issue]" } else { "" };
    out.push_str(&format!(
        "{indent}- **{}** - Page {}, Line {}{marker}\n",
        entry.title, entry.page, entry.line
    ));
    for child in &entry.children {
        render_toc_entry(out, child, depth + 1);
    }
}

/// Render the annotated transcript artifact (`annotated_transcript.md`).
///
/// Topics must already be sorted by transcript position.
pub fn generate_annotated_md(name: &str, topics: &[Topic], tool_version: &str) -> String {
    let mut out = String::new();
    out.push_str("# Annotated Transcript\n\n");
    out.push_str(&format!("Deposition: {name}\n\n"));

    for (i, topic) in topics.iter().enumerate() {
        out.push_str(&format!("## {}. {}\n\n", i + 1, topic.title));
        out.push_str(&format!("*(Page {}, Line {})*\n\n", topic.page, topic.line));
        if !topic.excerpt.trim().is_empty() {
            out.push_str(topic.excerpt.trim());
            out.push_str("\n\n");
        }
        if !topic.related.is_empty() {
            out.push_str(&format!("Related: {}\n\n", topic.related.join(", ")));
        }
        if let Some(significance) = &topic.legal_significance {
            out.push_str(&format!("Legal significance: {significance}\n\n"));
        }
    }

    push_footer(&mut out, tool_version);
    debug!(topics = topics.len(), "rendered annotated_transcript.md");
    out
}

/// Render the cluster summary artifact (`clusters.md`).
pub fn generate_clusters_md(name: &str, clusters: &[TopicCluster], tool_version: &str) -> String {
    let mut out = String::new();
    out.push_str("# Topic Clusters\n\n");
    out.push_str(&format!("Deposition: {name}\n\n"));

    if clusters.is_empty() {
        out.push_str("No clusters were produced for this transcript.\n");
    }

    for cluster in clusters {
        out.push_str(&format!("## {}\n\n", cluster.name));
        if let Some(theme) = &cluster.legal_theme {
            out.push_str(&format!("Legal theme: {theme}\n\n"));
        }
        out.push_str(&format!("Confidence: {:.0}%\n\n", cluster.confidence * 100.0));

        if !cluster.key_issues.is_empty() {
            out.push_str("Key issues:\n\n");
            for issue in &cluster.key_issues {
                out.push_str(&format!("- {issue}\n"));
            }
            out.push('\n');
        }

        if !cluster.members.is_empty() {
            out.push_str("Member topics:\n\n");
            for member in &cluster.members {
                out.push_str(&format!("- {member}\n"));
            }
            out.push('\n');
        }

        if let Some(excerpt) = &cluster.representative_excerpt {
            out.push_str(&format!("> {}\n\n", excerpt.trim()));
        }
    }

    push_footer(&mut out, tool_version);
    out
}

fn push_footer(out: &mut String, tool_version: &str) {
    if !out.ends_with("\n\n") {
        out.push('\n');
    }
    out.push_str(&format!("---\nGenerated by DepoIndex v{tool_version}\n"));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
