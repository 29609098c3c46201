use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::RunManifest;
use crate::outputs::OutputLayout;

pub fn run(args: StatusArgs) -> Result<()> {
    let layout = OutputLayout::new(&args.output_dir);

    info!(output_dir = %layout.output_dir.display(), "status requested");

    match latest_manifest_path(&layout.manifest_dir)? {
        Some(path) => {
            let manifest = load_manifest(&path)?;
            info!(
                path = %path.display(),
                run_id = %manifest.run_id,
                mode = %manifest.mode,
                project = %manifest.project_title,
                status = %manifest.status,
                started_at = %manifest.started_at,
                updated_at = %manifest.updated_at,
                command = %manifest.command,
                "loaded run manifest"
            );
            info!(
                documents = manifest.counts.document_count,
                records = manifest.counts.record_count,
                speakers = manifest.counts.speaker_count,
                used_tags = manifest.counts.used_tag_count,
                vocabulary = manifest.counts.vocabulary_size,
                resolved = manifest.resolutions.resolved(),
                discarded = manifest.resolutions.discarded(),
                unresolved = manifest.unresolved_tags.len(),
                merge_issues = manifest.merge_issues.len(),
                warnings = manifest.warnings.len(),
                "last run summary"
            );
        }
        None => warn!(path = %layout.manifest_dir.display(), "no run manifests found"),
    }

    if layout.snapshot_path.exists() {
        info!(path = %layout.snapshot_path.display(), "snapshot present");
    } else {
        warn!(path = %layout.snapshot_path.display(), "snapshot missing");
    }

    if !layout.aggregates_path.exists() {
        warn!(path = %layout.aggregates_path.display(), "aggregates missing");
    }

    Ok(())
}

// Compact UTC timestamps sort lexically; a same-second rerun carries a
// numeric `_N` suffix that orders after the unsuffixed name.
fn latest_manifest_path(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.is_dir() {
        return Ok(None);
    }

    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;

    let mut latest: Option<((String, usize), PathBuf)> = None;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();
        let Some(key) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(manifest_sort_key)
        else {
            continue;
        };

        if latest.as_ref().is_none_or(|(current, _)| key > *current) {
            latest = Some((key, path));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

fn manifest_sort_key(name: &str) -> Option<(String, usize)> {
    let stem = name.strip_prefix("run_")?.strip_suffix(".json")?;
    match stem.rsplit_once('_') {
        Some((stamp, attempt)) => match attempt.parse() {
            Ok(attempt) => Some((stamp.to_string(), attempt)),
            Err(_) => Some((stem.to_string(), 1)),
        },
        None => Some((stem.to_string(), 1)),
    }
}

fn load_manifest(path: &Path) -> Result<RunManifest> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
