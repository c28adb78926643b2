//! Run directory assembler.
//!
//! Takes the analysis outputs (manifest data, TOC, topics, clusters) and
//! writes the final run directory structure to disk.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use depoindex_shared::{
    AnalysisManifest, CURRENT_SCHEMA_VERSION, DepoIndexError, Result, RunId, Toc, Topic,
    TopicCluster,
};

/// Output from a successful run assembly.
#[derive(Debug, Clone)]
pub struct AssembleResult {
    /// Absolute path to the assembled run directory.
    pub run_path: PathBuf,
    /// The manifest that was written.
    pub manifest: AnalysisManifest,
}

/// Configuration for run assembly.
#[derive(Debug, Clone)]
pub struct AssembleConfig {
    /// Run identifier.
    pub run_id: RunId,
    /// Human-readable name.
    pub name: String,
    /// Source transcript path.
    pub source_path: String,
    /// Root directory for run output.
    pub output_root: PathBuf,
    /// Tool version string.
    pub tool_version: String,
    /// Transcript statistics.
    pub line_count: usize,
    pub page_count: u32,
    pub chunk_count: usize,
    /// Analysis options echoed into the manifest.
    pub config: Option<serde_json::Value>,
}

/// Assemble a complete run directory structure.
///
/// Creates the following layout:
/// ```text
/// <output_root>/<run_id>/
/// ├── manifest.json
/// ├── toc.json
/// ├── topics.json
/// ├── clusters.json
/// ├── artifacts/       (populated by assemble_artifacts)
/// └── indexes/         (for the DB file)
/// ```
#[instrument(skip_all, fields(run_id = %config.run_id, name = %config.name, topics = topics.len()))]
pub fn assemble(
    config: &AssembleConfig,
    toc: &Toc,
    topics: &[Topic],
    clusters: &[TopicCluster],
) -> Result<AssembleResult> {
    let run_dir = config.output_root.join(config.run_id.to_string());

    info!(path = %run_dir.display(), "assembling run directory");

    create_dirs(&run_dir)?;

    let manifest = build_manifest(config, toc);
    write_json(&run_dir.join("manifest.json"), &manifest)?;
    write_json(&run_dir.join("toc.json"), toc)?;
    write_json(&run_dir.join("topics.json"), &topics)?;
    write_json(&run_dir.join("clusters.json"), &clusters)?;

    info!(path = %run_dir.display(), "run assembly complete");

    Ok(AssembleResult {
        run_path: run_dir,
        manifest,
    })
}

/// Verify that a run directory is well-formed.
pub fn validate_run(run_path: &Path) -> Result<AnalysisManifest> {
    let manifest_path = run_path.join("manifest.json");
    let toc_path = run_path.join("toc.json");

    if !manifest_path.exists() {
        return Err(DepoIndexError::validation("missing manifest.json"));
    }
    if !toc_path.exists() {
        return Err(DepoIndexError::validation("missing toc.json"));
    }

    let manifest_content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| DepoIndexError::io(&manifest_path, e))?;
    let manifest: AnalysisManifest = serde_json::from_str(&manifest_content)
        .map_err(|e| DepoIndexError::validation(format!("invalid manifest.json: {e}")))?;

    if manifest.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(DepoIndexError::validation(format!(
            "unsupported schema_version: {} (expected {})",
            manifest.schema_version, CURRENT_SCHEMA_VERSION
        )));
    }

    let toc_content =
        std::fs::read_to_string(&toc_path).map_err(|e| DepoIndexError::io(&toc_path, e))?;
    let _: Toc = serde_json::from_str(&toc_content)
        .map_err(|e| DepoIndexError::validation(format!("invalid toc.json: {e}")))?;

    // Artifact files listed in the manifest must exist on disk.
    if let Some(artifacts) = manifest.artifacts.as_ref().and_then(|a| a.as_array()) {
        for meta in artifacts {
            if let Some(filename) = meta.get("filename").and_then(|f| f.as_str()) {
                let path = run_path.join("artifacts").join(filename);
                if !path.exists() {
                    return Err(DepoIndexError::validation(format!(
                        "manifest lists missing artifact: {filename}"
                    )));
                }
            }
        }
    }

    Ok(manifest)
}

// ---------------------------------------------------------------------------
// Artifact assembly
// ---------------------------------------------------------------------------

/// Metadata for a single artifact file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArtifactMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Metadata about the enrichment run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EnrichmentMeta {
    pub model: String,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub completed_at: String,
}

/// Write artifact files to the run's artifacts directory and update the manifest.
///
/// Each entry in `artifacts` is a `(filename, content)` pair.
/// This function:
/// 1. Writes each artifact file atomically (write to temp, then rename)
/// 2. Updates `manifest.json` with artifact checksums and enrichment metadata
#[instrument(skip_all, fields(run_path = %run_path.display(), artifact_count = artifacts.len()))]
pub fn assemble_artifacts(
    run_path: &Path,
    artifacts: &[(&str, &str)],
    enrichment_meta: Option<&EnrichmentMeta>,
) -> Result<Vec<ArtifactMeta>> {
    let artifacts_dir = run_path.join("artifacts");
    std::fs::create_dir_all(&artifacts_dir).map_err(|e| DepoIndexError::io(&artifacts_dir, e))?;

    let mut metas = Vec::with_capacity(artifacts.len());

    for (filename, content) in artifacts {
        let target = artifacts_dir.join(filename);
        let temp = artifacts_dir.join(format!(".{filename}.tmp"));

        // Write to temp file first
        std::fs::write(&temp, content).map_err(|e| DepoIndexError::io(&temp, e))?;

        // Atomic rename
        std::fs::rename(&temp, &target).map_err(|e| DepoIndexError::io(&target, e))?;

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        debug!(file = %filename, size = content.len(), "wrote artifact");

        metas.push(ArtifactMeta {
            filename: (*filename).to_string(),
            sha256: hash,
            size_bytes: content.len(),
        });
    }

    update_manifest(run_path, &metas, enrichment_meta)?;

    info!(count = metas.len(), "artifact assembly complete");

    Ok(metas)
}

/// Update `manifest.json` with artifact and enrichment metadata.
fn update_manifest(
    run_path: &Path,
    artifacts: &[ArtifactMeta],
    enrichment_meta: Option<&EnrichmentMeta>,
) -> Result<()> {
    let manifest_path = run_path.join("manifest.json");

    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| DepoIndexError::io(&manifest_path, e))?;

    let mut manifest: AnalysisManifest = serde_json::from_str(&content)
        .map_err(|e| DepoIndexError::validation(format!("invalid manifest.json: {e}")))?;

    manifest.artifacts = Some(serde_json::to_value(artifacts).unwrap_or_default());
    if let Some(meta) = enrichment_meta {
        manifest.enrichment = Some(serde_json::to_value(meta).unwrap_or_default());
    }
    manifest.updated_at = Utc::now();

    write_json(&manifest_path, &manifest)?;
    debug!("manifest updated with artifact metadata");

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create the run directory structure.
fn create_dirs(run_dir: &Path) -> Result<()> {
    let dirs = [
        run_dir.to_path_buf(),
        run_dir.join("artifacts"),
        run_dir.join("indexes"),
    ];

    for dir in &dirs {
        std::fs::create_dir_all(dir).map_err(|e| DepoIndexError::io(dir, e))?;
    }

    debug!(path = %run_dir.display(), "directory structure created");
    Ok(())
}

/// Build the run manifest.
fn build_manifest(config: &AssembleConfig, toc: &Toc) -> AnalysisManifest {
    let now = Utc::now();
    let topic_count = toc
        .sections
        .iter()
        .map(|s| if s.children.is_empty() { 1 } else { s.children.len() })
        .sum();

    AnalysisManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        id: config.run_id.clone(),
        name: config.name.clone(),
        source_path: config.source_path.clone(),
        tool_version: config.tool_version.clone(),
        created_at: now,
        updated_at: now,
        line_count: config.line_count,
        page_count: config.page_count,
        chunk_count: config.chunk_count,
        topic_count,
        config: config.config.clone(),
        artifacts: None,
        enrichment: None,
    }
}

/// Write a JSON file (pretty-printed).
fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| DepoIndexError::validation(format!("JSON serialization failed: {e}")))?;
    std::fs::write(path, json).map_err(|e| DepoIndexError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use depoindex_shared::TocEntry;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("di-assembler-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn make_config(output_root: &Path) -> AssembleConfig {
        AssembleConfig {
            run_id: RunId::new(),
            name: "smith-depo".into(),
            source_path: "data/smith.txt".into(),
            output_root: output_root.into(),
            tool_version: "0.1.0-test".into(),
            line_count: 90,
            page_count: 3,
            chunk_count: 30,
            config: None,
        }
    }

    fn make_toc() -> Toc {
        Toc {
            sections: vec![
                TocEntry {
                    title: "Accident Sequence".into(),
                    page: 1,
                    line: 1,
                    key_issue: true,
                    children: vec![
                        TocEntry {
                            title: "Braking".into(),
                            page: 1,
                            line: 1,
                            key_issue: true,
                            children: vec![],
                        },
                        TocEntry {
                            title: "Impact".into(),
                            page: 1,
                            line: 12,
                            key_issue: false,
                            children: vec![],
                        },
                    ],
                },
                TocEntry {
                    title: "Damages".into(),
                    page: 3,
                    line: 4,
                    key_issue: false,
                    children: vec![],
                },
            ],
        }
    }

    fn make_topics() -> Vec<Topic> {
        vec![
            Topic::new("Braking", 1, 1, "I hit the brakes"),
            Topic::new("Impact", 1, 12, "the cars collided"),
            Topic::new("Damages", 3, 4, "the repair estimate"),
        ]
    }

    #[test]
    fn assemble_creates_directory_structure() {
        let tmp = temp_dir();
        let config = make_config(&tmp);

        let result = assemble(&config, &make_toc(), &make_topics(), &[]).unwrap();

        assert!(result.run_path.exists());
        assert!(result.run_path.join("artifacts").exists());
        assert!(result.run_path.join("indexes").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn assemble_writes_manifest_with_counts() {
        let tmp = temp_dir();
        let config = make_config(&tmp);

        let result = assemble(&config, &make_toc(), &make_topics(), &[]).unwrap();

        let manifest_path = result.run_path.join("manifest.json");
        let manifest: AnalysisManifest =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
        assert_eq!(manifest.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(manifest.name, "smith-depo");
        assert_eq!(manifest.line_count, 90);
        // 2 children in the first section + 1 flat section
        assert_eq!(manifest.topic_count, 3);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn assemble_writes_toc_topics_clusters() {
        let tmp = temp_dir();
        let config = make_config(&tmp);

        let result = assemble(&config, &make_toc(), &make_topics(), &[]).unwrap();

        let toc: Toc =
            serde_json::from_str(&std::fs::read_to_string(result.run_path.join("toc.json")).unwrap())
                .unwrap();
        assert_eq!(toc.sections.len(), 2);

        let topics: Vec<Topic> = serde_json::from_str(
            &std::fs::read_to_string(result.run_path.join("topics.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(topics.len(), 3);

        assert!(result.run_path.join("clusters.json").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn validate_run_accepts_assembled_dir() {
        let tmp = temp_dir();
        let config = make_config(&tmp);

        let result = assemble(&config, &make_toc(), &make_topics(), &[]).unwrap();
        let manifest = validate_run(&result.run_path).unwrap();
        assert_eq!(manifest.name, "smith-depo");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn validate_run_missing_manifest() {
        let tmp = temp_dir();
        std::fs::write(tmp.join("toc.json"), "{}").unwrap();

        let err = validate_run(&tmp).unwrap_err();
        assert!(err.to_string().contains("missing manifest.json"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn assemble_artifacts_writes_files_and_manifest() {
        let tmp = temp_dir();
        let config = make_config(&tmp);
        let result = assemble(&config, &make_toc(), &make_topics(), &[]).unwrap();

        let enrichment_meta = EnrichmentMeta {
            model: "gemini-1.5-flash".into(),
            total_tokens_in: 1000,
            total_tokens_out: 500,
            cache_hits: 2,
            cache_misses: 3,
            completed_at: "2025-01-01T00:00:00Z".into(),
        };

        let artifacts = vec![
            ("toc.md", "# Deposition Topic Table of Contents\n"),
            ("annotated_transcript.md", "# Annotated Transcript\n"),
        ];

        let metas =
            assemble_artifacts(&result.run_path, &artifacts, Some(&enrichment_meta)).unwrap();

        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].filename, "toc.md");
        assert_eq!(metas[0].sha256.len(), 64);
        assert!(result.run_path.join("artifacts/toc.md").exists());

        let manifest_json =
            std::fs::read_to_string(result.run_path.join("manifest.json")).unwrap();
        let manifest: AnalysisManifest = serde_json::from_str(&manifest_json).unwrap();
        assert!(manifest.artifacts.is_some());
        let enrich = manifest.enrichment.unwrap();
        assert_eq!(enrich["model"], "gemini-1.5-flash");
        assert_eq!(enrich["total_tokens_in"], 1000);

        // Validation now also checks artifact files exist
        validate_run(&result.run_path).unwrap();

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn assemble_artifacts_atomic_no_temp_files() {
        let tmp = temp_dir();
        let config = make_config(&tmp);
        let result = assemble(&config, &make_toc(), &make_topics(), &[]).unwrap();

        let artifacts = vec![("toc.md", "content")];
        assemble_artifacts(&result.run_path, &artifacts, None).unwrap();

        let artifacts_dir = result.run_path.join("artifacts");
        for entry in std::fs::read_dir(&artifacts_dir).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn validate_run_rejects_missing_listed_artifact() {
        let tmp = temp_dir();
        let config = make_config(&tmp);
        let result = assemble(&config, &make_toc(), &make_topics(), &[]).unwrap();

        assemble_artifacts(&result.run_path, &[("toc.md", "x")], None).unwrap();
        std::fs::remove_file(result.run_path.join("artifacts/toc.md")).unwrap();

        let err = validate_run(&result.run_path).unwrap_err();
        assert!(err.to_string().contains("missing artifact"));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
