//! TOC (Table of Contents) builder.
//!
//! Orders topics by transcript position and, when clusters are available,
//! groups them into cluster sections that map to `toc.json`.

use std::collections::HashSet;

use tracing::{debug, instrument};

use depoindex_shared::{Toc, TocEntry, Topic, TopicCluster};

/// Build a TOC from detected topics and optional clusters.
///
/// The builder:
/// 1. Drops topics with empty titles
/// 2. Sorts by (page, line), stable for equal references
/// 3. With clusters, emits one section per cluster (ordered by its earliest
///    member) with member topics as children; topics no cluster claims land
///    under a trailing `Other Topics` section
/// 4. Without clusters, emits a flat section list
#[instrument(skip_all, fields(topics = topics.len(), clusters = clusters.len()))]
pub fn build_toc(topics: &[Topic], clusters: &[TopicCluster]) -> Toc {
    let mut ordered: Vec<&Topic> = topics.iter().filter(|t| !t.title.trim().is_empty()).collect();
    ordered.sort_by_key(|t| t.position());

    if clusters.is_empty() {
        let sections = ordered.iter().map(|t| entry_from_topic(t)).collect();
        return Toc { sections };
    }

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut sections: Vec<TocEntry> = Vec::new();

    for cluster in clusters {
        let members: Vec<usize> = ordered
            .iter()
            .enumerate()
            .filter(|(i, t)| !claimed.contains(i) && cluster.members.contains(&t.title))
            .map(|(i, _)| i)
            .collect();

        if members.is_empty() {
            continue;
        }
        claimed.extend(members.iter().copied());

        let children: Vec<TocEntry> = members.iter().map(|&i| entry_from_topic(ordered[i])).collect();
        sections.push(TocEntry {
            title: cluster.name.clone(),
            page: children[0].page,
            line: children[0].line,
            key_issue: members.iter().any(|&i| ordered[i].is_key_issue),
            children,
        });
    }

    // Sections appear in transcript order regardless of cluster input order.
    sections.sort_by_key(|s| (s.page, s.line));

    let unclaimed: Vec<TocEntry> = ordered
        .iter()
        .enumerate()
        .filter(|(i, _)| !claimed.contains(i))
        .map(|(_, t)| entry_from_topic(t))
        .collect();

    if !unclaimed.is_empty() {
        sections.push(TocEntry {
            title: "Other Topics".to_string(),
            page: unclaimed[0].page,
            line: unclaimed[0].line,
            key_issue: unclaimed.iter().any(|e| e.key_issue),
            children: unclaimed,
        });
    }

    debug!(sections = sections.len(), "TOC built");
    Toc { sections }
}

fn entry_from_topic(topic: &Topic) -> TocEntry {
    TocEntry {
        title: topic.title.clone(),
        page: topic.page,
        line: topic.line,
        key_issue: topic.is_key_issue,
        children: vec![],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
