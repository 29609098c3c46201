use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::aggregate::aggregate;
use crate::cli::{ExtractArgs, TranscriptFormat};
use crate::commands::inventory::{discover_csv_files, source_entry};
use crate::config::load_project_config;
use crate::model::{Document, RunCounts, RunManifest, RunPaths, SourceEntry};
use crate::outputs::{
    OutputLayout, correction_entries, record_set_counts, write_outputs, write_run_manifest,
};
use crate::reconcile::{CorrectionCache, Reconciler};
use crate::transcript::{IngestStats, SpeakerSplitter, document_title, ingest_transcript};
use crate::util::{now_utc_string, utc_compact_string};
use crate::vocabulary::load_vocabulary;

pub fn run(args: ExtractArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));
    let layout = OutputLayout::new(&args.output_dir);

    info!(
        output_dir = %layout.output_dir.display(),
        run_id = %run_id,
        format = args.format.as_str(),
        "starting extract"
    );

    let config = load_project_config(args.config.as_deref())?;
    let vocabulary = load_vocabulary(&args.codebook)?;
    let reconciler = Reconciler::new(&vocabulary, &config);
    let mut cache = CorrectionCache::seeded(&config.corrections, &vocabulary);
    let splitter = SpeakerSplitter::new()?;

    let transcript_paths = discover_csv_files(&args.transcripts)?;
    if transcript_paths.is_empty() {
        bail!("no transcripts found in the given inputs");
    }

    let extraction = extract_documents(
        &transcript_paths,
        args.format,
        !args.no_header,
        &splitter,
        &reconciler,
        &mut cache,
    )?;

    let aggregates = aggregate(&extraction.documents, &vocabulary);
    let files_written = write_outputs(&layout, &extraction.documents, &aggregates)?;

    let unresolved_tags = cache.unresolved();
    if !unresolved_tags.is_empty() {
        warn!(count = unresolved_tags.len(), "some raw tags matched no codebook entry");
    }

    let stats = &extraction.stats;
    let manifest = RunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        mode: "extract".to_string(),
        project_title: config.project_title.clone(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_extract_command(&args),
        paths: RunPaths {
            output_dir: layout.output_dir.display().to_string(),
            codebook_path: args.codebook.display().to_string(),
            config_path: args.config.as_ref().map(|path| path.display().to_string()),
            source_snapshot_path: None,
            snapshot_path: layout.snapshot_path.display().to_string(),
            aggregates_path: layout.aggregates_path.display().to_string(),
        },
        counts: RunCounts {
            source_count: extraction.sources.len(),
            rows_read: stats.rows_read,
            blank_rows: stats.blank_rows,
            malformed_rows: stats.malformed_rows,
            dropped_rows: stats.dropped_rows,
            ..record_set_counts(&vocabulary, &extraction.documents, &aggregates)
        },
        resolutions: stats.resolutions.clone(),
        sources: extraction.sources,
        corrections: correction_entries(&cache),
        unresolved_tags,
        merge_issues: Vec::new(),
        warnings: extraction.warnings,
    };
    write_run_manifest(&layout, started_ts, &manifest)?;

    info!(
        documents = manifest.counts.document_count,
        records = manifest.counts.record_count,
        files = files_written,
        "extract completed"
    );

    Ok(())
}

pub(super) struct Extraction {
    pub documents: Vec<Document>,
    pub sources: Vec<SourceEntry>,
    pub stats: IngestStats,
    pub warnings: Vec<String>,
}

pub(super) fn extract_documents(
    paths: &[PathBuf],
    format: TranscriptFormat,
    has_header: bool,
    splitter: &SpeakerSplitter,
    reconciler: &Reconciler<'_>,
    cache: &mut CorrectionCache,
) -> Result<Extraction> {
    let mut extraction = Extraction {
        documents: Vec::with_capacity(paths.len()),
        sources: Vec::with_capacity(paths.len()),
        stats: IngestStats::default(),
        warnings: Vec::new(),
    };
    let mut seen_titles = HashSet::new();

    for path in paths {
        let title = document_title(path);
        if title.is_empty() {
            warn!(path = %path.display(), "skipping transcript without a usable title");
            extraction
                .warnings
                .push(format!("skipped {}: empty document title", path.display()));
            extraction.sources.push(source_entry(path, None)?);
            continue;
        }

        if !seen_titles.insert(title.clone()) {
            warn!(path = %path.display(), document = %title, "skipping transcript with duplicate document title");
            extraction.warnings.push(format!(
                "skipped {}: document {title} already ingested",
                path.display()
            ));
            extraction.sources.push(source_entry(path, None)?);
            continue;
        }

        let ingested = ingest_transcript(path, format, has_header, splitter, reconciler, cache)?;
        if ingested.document.records.is_empty() {
            warn!(path = %path.display(), document = %title, "transcript produced no records");
        }

        extraction.sources.push(source_entry(path, Some(&title))?);
        extraction.stats.absorb(&ingested.stats);
        extraction.documents.push(ingested.document);
    }

    Ok(extraction)
}

pub(super) fn render_extract_command(args: &ExtractArgs) -> String {
    let mut command = vec![
        "codebook".to_string(),
        "extract".to_string(),
        "--output-dir".to_string(),
        args.output_dir.display().to_string(),
        "--codebook".to_string(),
        args.codebook.display().to_string(),
        "--format".to_string(),
        args.format.as_str().to_string(),
    ];

    if let Some(path) = &args.config {
        command.push("--config".to_string());
        command.push(path.display().to_string());
    }
    if args.no_header {
        command.push("--no-header".to_string());
    }
    command.extend(
        args.transcripts
            .iter()
            .map(|path| path.display().to_string()),
    );

    command.join(" ")
}
