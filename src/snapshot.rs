use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{Document, Record};
use crate::normalize::{normalize, strip_quotes_space, tag_key};
use crate::reconcile::{CorrectionCache, Reconciler, ResolutionTally};
use crate::transcript::resolve_tags;
use crate::vocabulary::Vocabulary;

pub const SNAPSHOT_HEADER: [&str; 4] = ["document", "record_id", "speaker", "text"];

/// One row of a snapshot or update file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub line: usize,
    pub document: String,
    pub record_id: u32,
    pub speaker: String,
    pub text: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn document_mut(&mut self, title: &str) -> Option<&mut Document> {
        self.documents
            .iter_mut()
            .find(|document| document.title == title)
    }

    pub fn record_count(&self) -> usize {
        self.documents
            .iter()
            .map(|document| document.records.len())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeIssue {
    UnknownDocument {
        source: String,
        line: usize,
        document: String,
        record_id: u32,
    },
    UnknownRecord {
        source: String,
        line: usize,
        document: String,
        record_id: u32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub applied: usize,
    pub malformed_rows: usize,
    pub issues: Vec<MergeIssue>,
    pub resolutions: ResolutionTally,
}

impl MergeReport {
    pub fn absorb(&mut self, other: MergeReport) {
        self.applied += other.applied;
        self.malformed_rows += other.malformed_rows;
        self.issues.extend(other.issues);
        self.resolutions.absorb(&other.resolutions);
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotRows {
    pub rows: Vec<SnapshotRow>,
    pub malformed_rows: usize,
}

pub fn write_snapshot<W: Write>(documents: &[Document], writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);
    csv_writer
        .write_record(SNAPSHOT_HEADER)
        .context("failed to write snapshot header")?;

    for document in documents {
        for record in &document.records {
            write_record_row(&mut csv_writer, record)?;
        }
    }

    csv_writer.flush().context("failed to flush snapshot")?;
    Ok(())
}

pub fn write_record_row<W: Write>(csv_writer: &mut csv::Writer<W>, record: &Record) -> Result<()> {
    let record_id = record.record_id.to_string();
    let mut row = vec![
        record.document.as_str(),
        record_id.as_str(),
        record.speaker.as_str(),
        record.text.as_str(),
    ];
    row.extend(record.tags.iter().map(String::as_str));
    csv_writer.write_record(&row).with_context(|| {
        format!(
            "failed to write row for {} record {}",
            record.document, record.record_id
        )
    })
}

pub fn read_snapshot_rows<R: Read>(reader: R) -> Result<SnapshotRows> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut parsed = SnapshotRows::default();
    for (index, record) in csv_reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(row = index + 1, error = %err, "skipping unreadable snapshot row");
                parsed.malformed_rows += 1;
                continue;
            }
        };
        // Header occupies line 1.
        let line = record
            .position()
            .map(|position| position.line() as usize)
            .unwrap_or(index + 2);

        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        if record.len() < SNAPSHOT_HEADER.len() {
            warn!(line, fields = record.len(), "skipping snapshot row with missing fields");
            parsed.malformed_rows += 1;
            continue;
        }

        let document = normalize(&record[0]);
        let record_id = match record[1].trim().parse::<u32>() {
            Ok(record_id) if !document.is_empty() => record_id,
            _ => {
                warn!(
                    line,
                    document = &record[0],
                    record_id = &record[1],
                    "skipping snapshot row without a valid key"
                );
                parsed.malformed_rows += 1;
                continue;
            }
        };

        parsed.rows.push(SnapshotRow {
            line,
            document,
            record_id,
            speaker: record[2].to_string(),
            text: record[3].to_string(),
            tags: record
                .iter()
                .skip(SNAPSHOT_HEADER.len())
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
        });
    }

    Ok(parsed)
}

pub fn snapshot_from_rows(rows: Vec<SnapshotRow>) -> (Snapshot, usize) {
    let mut snapshot = Snapshot::default();
    let mut seen = HashSet::new();
    let mut duplicates = 0;

    for row in rows {
        if !seen.insert((row.document.clone(), row.record_id)) {
            warn!(
                line = row.line,
                document = %row.document,
                record_id = row.record_id,
                "skipping duplicate snapshot record"
            );
            duplicates += 1;
            continue;
        }

        let record = Record {
            document: row.document.clone(),
            record_id: row.record_id,
            speaker: row.speaker,
            text: row.text,
            tags: row.tags,
        };
        match snapshot.document_mut(&row.document) {
            Some(document) => document.records.push(record),
            None => {
                let mut document = Document::new(row.document);
                document.records.push(record);
                snapshot.documents.push(document);
            }
        }
    }

    (snapshot, duplicates)
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let file =
        File::open(path).with_context(|| format!("failed to open snapshot {}", path.display()))?;
    let parsed = read_snapshot_rows(file)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let (snapshot, duplicates) = snapshot_from_rows(parsed.rows);

    info!(
        path = %path.display(),
        documents = snapshot.documents.len(),
        records = snapshot.record_count(),
        malformed = parsed.malformed_rows,
        duplicates,
        "loaded snapshot"
    );

    Ok(snapshot)
}

pub fn load_update_file(path: &Path) -> Result<SnapshotRows> {
    let file = File::open(path)
        .with_context(|| format!("failed to open update file {}", path.display()))?;
    let parsed = read_snapshot_rows(file)
        .with_context(|| format!("failed to read update file {}", path.display()))?;

    info!(
        path = %path.display(),
        rows = parsed.rows.len(),
        malformed = parsed.malformed_rows,
        "loaded update file"
    );

    Ok(parsed)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCleanup {
    pub rewritten: usize,
    pub dropped: Vec<String>,
}

/// Brings tags loaded from a snapshot back onto the codebook. Tags are keyed
/// with `tag_key`; keys outside the vocabulary are dropped and reported.
pub fn canonicalize_snapshot_tags(snapshot: &mut Snapshot, vocabulary: &Vocabulary) -> TagCleanup {
    let mut cleanup = TagCleanup::default();

    for document in &mut snapshot.documents {
        for record in &mut document.records {
            let mut tags: Vec<String> = Vec::with_capacity(record.tags.len());
            for raw in &record.tags {
                let key = tag_key(raw);
                if !vocabulary.contains(&key) {
                    warn!(
                        document = %record.document,
                        record_id = record.record_id,
                        tag = %raw,
                        "dropping snapshot tag not in the codebook"
                    );
                    cleanup.dropped.push(raw.clone());
                    continue;
                }
                if key != *raw {
                    cleanup.rewritten += 1;
                }
                if !tags.contains(&key) {
                    tags.push(key);
                }
            }
            record.tags = tags;
        }
    }

    cleanup.dropped.sort();
    cleanup.dropped.dedup();
    if cleanup.rewritten > 0 || !cleanup.dropped.is_empty() {
        info!(
            rewritten = cleanup.rewritten,
            dropped = cleanup.dropped.len(),
            "canonicalized snapshot tags"
        );
    }
    cleanup
}

/// Overlays update rows onto the snapshot. Matching records get speaker, text
/// and tags replaced wholesale; rows whose document or record is unknown are
/// reported and leave the snapshot untouched.
pub fn merge_updates(
    snapshot: &mut Snapshot,
    source: &str,
    rows: Vec<SnapshotRow>,
    reconciler: &Reconciler<'_>,
    cache: &mut CorrectionCache,
) -> MergeReport {
    let mut report = MergeReport::default();

    for row in rows {
        let speaker = strip_quotes_space(&row.speaker);
        let text = strip_quotes_space(&row.text);
        if normalize(&speaker).is_empty() || text.is_empty() {
            warn!(
                source = %source,
                line = row.line,
                document = %row.document,
                record_id = row.record_id,
                "skipping update row without speaker or text"
            );
            report.malformed_rows += 1;
            continue;
        }

        let Some(document) = snapshot.document_mut(&row.document) else {
            warn!(source = %source, line = row.line, document = %row.document, "unknown document in update");
            report.issues.push(MergeIssue::UnknownDocument {
                source: source.to_string(),
                line: row.line,
                document: row.document,
                record_id: row.record_id,
            });
            continue;
        };

        let Some(record) = document.record_mut(row.record_id) else {
            warn!(
                source = %source,
                line = row.line,
                document = %row.document,
                record_id = row.record_id,
                "unknown record in update"
            );
            report.issues.push(MergeIssue::UnknownRecord {
                source: source.to_string(),
                line: row.line,
                document: row.document,
                record_id: row.record_id,
            });
            continue;
        };

        record.speaker = speaker;
        record.text = text;
        record.tags = resolve_tags(&row.tags, reconciler, cache, &mut report.resolutions);
        report.applied += 1;
    }

    report
}
