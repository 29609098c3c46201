use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cli::TranscriptFormat;
use crate::model::{Document, Record};
use crate::normalize::{normalize, strip_quotes_space};
use crate::reconcile::{CorrectionCache, Reconciler, ResolutionTally};

mod delimited;
mod raw;

pub use delimited::{format_delimited_line, parse_delimited_lines};
pub use raw::{SpeakerSplitter, parse_raw_rows};

/// One quote as written in a source file, before speaker carry-forward and
/// tag resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteLine {
    pub speaker: String,
    pub text: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRow {
    Blank,
    Malformed { line: usize, reason: String },
    Quote(QuoteLine),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub rows_read: usize,
    pub blank_rows: usize,
    pub malformed_rows: usize,
    pub dropped_rows: usize,
    pub records_emitted: usize,
    pub resolutions: ResolutionTally,
}

impl IngestStats {
    pub fn absorb(&mut self, other: &IngestStats) {
        self.rows_read += other.rows_read;
        self.blank_rows += other.blank_rows;
        self.malformed_rows += other.malformed_rows;
        self.dropped_rows += other.dropped_rows;
        self.records_emitted += other.records_emitted;
        self.resolutions.absorb(&other.resolutions);
    }
}

#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub document: Document,
    pub stats: IngestStats,
}

pub fn document_title(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    normalize(&stem)
}

pub fn read_transcript_rows(
    path: &Path,
    format: TranscriptFormat,
    has_header: bool,
    splitter: &SpeakerSplitter,
) -> Result<Vec<ParsedRow>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open transcript {}", path.display()))?;

    let rows = match format {
        TranscriptFormat::Raw => parse_raw_rows(file, has_header, splitter),
        TranscriptFormat::Delimited => parse_delimited_lines(BufReader::new(file)),
    };

    rows.with_context(|| format!("failed to read transcript {}", path.display()))
}

pub fn ingest_transcript(
    path: &Path,
    format: TranscriptFormat,
    has_header: bool,
    splitter: &SpeakerSplitter,
    reconciler: &Reconciler<'_>,
    cache: &mut CorrectionCache,
) -> Result<IngestedDocument> {
    let title = document_title(path);
    let rows = read_transcript_rows(path, format, has_header, splitter)?;
    let ingested = build_document(&title, rows, reconciler, cache);

    info!(
        path = %path.display(),
        document = %title,
        records = ingested.stats.records_emitted,
        malformed = ingested.stats.malformed_rows,
        dropped = ingested.stats.dropped_rows,
        "ingested transcript"
    );

    Ok(ingested)
}

pub fn build_document(
    title: &str,
    rows: Vec<ParsedRow>,
    reconciler: &Reconciler<'_>,
    cache: &mut CorrectionCache,
) -> IngestedDocument {
    let mut document = Document::new(title);
    let mut stats = IngestStats::default();
    let mut last_speaker = String::new();
    let mut next_record_id = 1_u32;

    for row in rows {
        stats.rows_read += 1;
        let quote = match row {
            ParsedRow::Blank => {
                stats.blank_rows += 1;
                continue;
            }
            ParsedRow::Malformed { line, reason } => {
                warn!(document = %title, line, reason = %reason, "skipping malformed row");
                stats.malformed_rows += 1;
                continue;
            }
            ParsedRow::Quote(quote) => quote,
        };

        let mut speaker = strip_quotes_space(&quote.speaker);
        if speaker.is_empty() {
            speaker = last_speaker.clone();
        } else {
            last_speaker = speaker.clone();
        }

        let text = strip_quotes_space(&quote.text);
        if normalize(&speaker).is_empty() || text.is_empty() {
            stats.dropped_rows += 1;
            continue;
        }

        let tags = resolve_tags(&quote.tags, reconciler, cache, &mut stats.resolutions);
        document.records.push(Record {
            document: title.to_string(),
            record_id: next_record_id,
            speaker,
            text,
            tags,
        });
        next_record_id += 1;
        stats.records_emitted += 1;
    }

    IngestedDocument { document, stats }
}

/// Resolves every raw tag, dropping discards and repeated tags.
pub fn resolve_tags(
    raw_tags: &[String],
    reconciler: &Reconciler<'_>,
    cache: &mut CorrectionCache,
    tally: &mut ResolutionTally,
) -> Vec<String> {
    let mut tags = Vec::with_capacity(raw_tags.len());
    for raw in raw_tags {
        let resolution = reconciler.resolve(raw, cache);
        tally.record(&resolution);
        if let Some(canonical) = resolution.canonical() {
            if tags.iter().all(|tag: &String| tag != canonical) {
                tags.push(canonical.to_string());
            }
        }
    }
    tags
}
