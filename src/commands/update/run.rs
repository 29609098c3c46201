use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::aggregate::aggregate;
use crate::cli::UpdateArgs;
use crate::commands::inventory::{discover_csv_files, source_entry};
use crate::config::load_project_config;
use crate::model::{RunCounts, RunManifest, RunPaths};
use crate::outputs::{
    OutputLayout, correction_entries, record_set_counts, write_outputs, write_run_manifest,
};
use crate::reconcile::{CorrectionCache, Reconciler};
use crate::snapshot::{
    MergeReport, Snapshot, canonicalize_snapshot_tags, load_snapshot, load_update_file,
    merge_updates,
};
use crate::util::{now_utc_string, utc_compact_string};
use crate::vocabulary::load_vocabulary;

pub fn run(args: UpdateArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));
    let layout = OutputLayout::new(&args.output_dir);
    let snapshot_path = args
        .snapshot
        .clone()
        .unwrap_or_else(|| layout.snapshot_path.clone());

    info!(
        output_dir = %layout.output_dir.display(),
        snapshot = %snapshot_path.display(),
        run_id = %run_id,
        "starting update"
    );

    let config = load_project_config(args.config.as_deref())?;
    let vocabulary = load_vocabulary(&args.codebook)?;
    let reconciler = Reconciler::new(&vocabulary, &config);
    let mut cache = CorrectionCache::seeded(&config.corrections, &vocabulary);

    let mut snapshot = load_snapshot(&snapshot_path)?;
    let cleanup = canonicalize_snapshot_tags(&mut snapshot, &vocabulary);
    let mut sources = vec![source_entry(&snapshot_path, None)?];

    let update_paths = discover_csv_files(&args.updates)?;
    if update_paths.is_empty() {
        info!("no update files given; rebuilding outputs from snapshot");
    }

    let report = apply_updates(&mut snapshot, &update_paths, &reconciler, &mut cache)?;
    for path in &update_paths {
        sources.push(source_entry(path, None)?);
    }

    let aggregates = aggregate(&snapshot.documents, &vocabulary);
    let files_written = write_outputs(&layout, &snapshot.documents, &aggregates)?;

    let mut warnings = Vec::new();
    if !report.issues.is_empty() {
        warn!(count = report.issues.len(), "some update rows did not match the snapshot");
        warnings.push(format!(
            "{} update rows did not match any snapshot record",
            report.issues.len()
        ));
    }
    if !cleanup.dropped.is_empty() {
        warnings.push(format!(
            "dropped snapshot tags not in the codebook: {}",
            cleanup.dropped.join(", ")
        ));
    }
    if report.malformed_rows > 0 {
        warnings.push(format!(
            "{} malformed update rows skipped",
            report.malformed_rows
        ));
    }

    let manifest = RunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        mode: "update".to_string(),
        project_title: config.project_title.clone(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_update_command(&args),
        paths: RunPaths {
            output_dir: layout.output_dir.display().to_string(),
            codebook_path: args.codebook.display().to_string(),
            config_path: args.config.as_ref().map(|path| path.display().to_string()),
            source_snapshot_path: Some(snapshot_path.display().to_string()),
            snapshot_path: layout.snapshot_path.display().to_string(),
            aggregates_path: layout.aggregates_path.display().to_string(),
        },
        counts: RunCounts {
            source_count: sources.len(),
            malformed_rows: report.malformed_rows,
            updates_applied: report.applied,
            updates_skipped: report.issues.len(),
            snapshot_tags_rewritten: cleanup.rewritten,
            snapshot_tags_dropped: cleanup.dropped.len(),
            ..record_set_counts(&vocabulary, &snapshot.documents, &aggregates)
        },
        resolutions: report.resolutions,
        sources,
        corrections: correction_entries(&cache),
        unresolved_tags: cache.unresolved(),
        merge_issues: report.issues,
        warnings,
    };
    write_run_manifest(&layout, started_ts, &manifest)?;

    info!(
        applied = manifest.counts.updates_applied,
        skipped = manifest.counts.updates_skipped,
        records = manifest.counts.record_count,
        files = files_written,
        "update completed"
    );

    Ok(())
}

/// Reads every update file, then overlays them onto the snapshot in order so
/// a later file wins for a record touched twice.
pub(super) fn apply_updates(
    snapshot: &mut Snapshot,
    update_paths: &[PathBuf],
    reconciler: &Reconciler<'_>,
    cache: &mut CorrectionCache,
) -> Result<MergeReport> {
    let updates = update_paths
        .iter()
        .map(|path| load_update_file(path).map(|rows| (path, rows)))
        .collect::<Result<Vec<_>>>()?;

    let mut report = MergeReport::default();
    for (path, parsed) in updates {
        let source = path.display().to_string();
        let mut merged = merge_updates(snapshot, &source, parsed.rows, reconciler, cache);
        merged.malformed_rows += parsed.malformed_rows;

        info!(
            source = %source,
            applied = merged.applied,
            skipped = merged.issues.len(),
            "merged update file"
        );
        report.absorb(merged);
    }

    Ok(report)
}

pub(super) fn render_update_command(args: &UpdateArgs) -> String {
    let mut command = vec![
        "codebook".to_string(),
        "update".to_string(),
        "--output-dir".to_string(),
        args.output_dir.display().to_string(),
        "--codebook".to_string(),
        args.codebook.display().to_string(),
    ];

    if let Some(path) = &args.config {
        command.push("--config".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.snapshot {
        command.push("--snapshot".to_string());
        command.push(path.display().to_string());
    }
    command.extend(args.updates.iter().map(|path| path.display().to_string()));

    command.join(" ")
}
