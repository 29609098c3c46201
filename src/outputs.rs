use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::aggregate::Aggregates;
use crate::model::{CorrectionEntry, Document, Record, RunCounts, RunManifest};
use crate::normalize::normalize;
use crate::reconcile::CorrectionCache;
use crate::snapshot::{SNAPSHOT_HEADER, write_record_row, write_snapshot};
use crate::util::{
    create_output_file, ensure_directory, utc_compact_string, write_json_pretty,
    write_json_pretty_new,
};
use crate::vocabulary::Vocabulary;

pub const CODE_COUNTS_HEADER: [&str; 4] =
    ["code", "document_count", "record_count", "speaker_count"];

#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub output_dir: PathBuf,
    pub snapshot_path: PathBuf,
    pub codes_dir: PathBuf,
    pub documents_dir: PathBuf,
    pub code_counts_path: PathBuf,
    pub aggregates_path: PathBuf,
    pub manifest_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(output_dir: &Path) -> Self {
        let csv_dir = output_dir.join("csv");
        Self {
            output_dir: output_dir.to_path_buf(),
            snapshot_path: output_dir.join("master.csv"),
            codes_dir: csv_dir.join("codes"),
            documents_dir: csv_dir.join("documents"),
            code_counts_path: csv_dir.join("code_counts.csv"),
            aggregates_path: output_dir.join("aggregates.json"),
            manifest_dir: output_dir.join("manifests"),
        }
    }

    // Runs started within the same second get `_2`, `_3`, ... suffixes.
    pub fn manifest_path(&self, started_ts: DateTime<Utc>, attempt: usize) -> PathBuf {
        let stamp = utc_compact_string(started_ts);
        let name = if attempt <= 1 {
            format!("run_{stamp}.json")
        } else {
            format!("run_{stamp}_{attempt}.json")
        };
        self.manifest_dir.join(name)
    }
}

const MAX_MANIFEST_ATTEMPTS: usize = 1000;

/// Writes the run manifest under a name no earlier run has taken.
pub fn write_run_manifest(
    layout: &OutputLayout,
    started_ts: DateTime<Utc>,
    manifest: &RunManifest,
) -> Result<PathBuf> {
    for attempt in 1..=MAX_MANIFEST_ATTEMPTS {
        let path = layout.manifest_path(started_ts, attempt);
        if write_json_pretty_new(&path, manifest)? {
            info!(path = %path.display(), "wrote run manifest");
            return Ok(path);
        }
    }

    bail!(
        "no free run manifest name in {}",
        layout.manifest_dir.display()
    )
}

/// Writes every derived artifact for a finished record set. Returns the number
/// of files written.
pub fn write_outputs(
    layout: &OutputLayout,
    documents: &[Document],
    aggregates: &Aggregates,
) -> Result<usize> {
    ensure_directory(&layout.output_dir)?;

    let mut snapshot_file = create_output_file(&layout.snapshot_path)?;
    write_snapshot(documents, &mut snapshot_file)
        .with_context(|| format!("failed to write {}", layout.snapshot_path.display()))?;
    snapshot_file
        .flush()
        .with_context(|| format!("failed to flush {}", layout.snapshot_path.display()))?;
    info!(path = %layout.snapshot_path.display(), "wrote snapshot");

    let code_files = write_code_listings(&layout.codes_dir, documents, aggregates)?;
    let document_files = write_document_listings(&layout.documents_dir, documents)?;
    write_code_counts(&layout.code_counts_path, aggregates)?;

    write_json_pretty(&layout.aggregates_path, aggregates)?;
    info!(path = %layout.aggregates_path.display(), "wrote aggregates");

    Ok(code_files + document_files + 3)
}

fn write_code_listings(
    codes_dir: &Path,
    documents: &[Document],
    aggregates: &Aggregates,
) -> Result<usize> {
    ensure_directory(codes_dir)?;

    let mut written = 0;
    for tag in aggregates.codes.keys() {
        let Some(file_name) = listing_file_name(tag) else {
            warn!(tag = %tag, "skipping code listing without a usable file name");
            continue;
        };

        let records = documents
            .iter()
            .flat_map(|document| document.records.iter())
            .filter(|record| record.has_tag(tag));
        write_listing(&codes_dir.join(file_name), records)?;
        written += 1;
    }

    info!(dir = %codes_dir.display(), files = written, "wrote code listings");
    Ok(written)
}

fn write_document_listings(documents_dir: &Path, documents: &[Document]) -> Result<usize> {
    ensure_directory(documents_dir)?;

    let mut written = 0;
    for document in documents {
        let Some(file_name) = listing_file_name(&document.title) else {
            warn!(document = %document.title, "skipping document listing without a usable file name");
            continue;
        };

        write_listing(&documents_dir.join(file_name), document.records.iter())?;
        written += 1;
    }

    info!(dir = %documents_dir.display(), files = written, "wrote document listings");
    Ok(written)
}

fn write_listing<'a>(path: &Path, records: impl Iterator<Item = &'a Record>) -> Result<()> {
    let file = create_output_file(path)?;
    let mut csv_writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
    csv_writer
        .write_record(SNAPSHOT_HEADER)
        .with_context(|| format!("failed to write header to {}", path.display()))?;

    for record in records {
        write_record_row(&mut csv_writer, record)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    csv_writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))
}

fn write_code_counts(path: &Path, aggregates: &Aggregates) -> Result<()> {
    let file = create_output_file(path)?;
    let mut csv_writer = csv::Writer::from_writer(file);
    csv_writer
        .write_record(CODE_COUNTS_HEADER)
        .with_context(|| format!("failed to write header to {}", path.display()))?;

    for (tag, stats) in aggregates.codes_by_frequency() {
        csv_writer
            .write_record([
                tag.clone(),
                stats.documents.len().to_string(),
                stats.record_count.to_string(),
                stats.speakers.len().to_string(),
            ])
            .with_context(|| format!("failed to write {tag} to {}", path.display()))?;
    }

    csv_writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    info!(path = %path.display(), "wrote code counts");
    Ok(())
}

fn listing_file_name(key: &str) -> Option<String> {
    let stem = normalize(key).replace('\\', "_");
    if stem.is_empty() || stem.chars().all(|ch| ch == '.') {
        return None;
    }
    Some(format!("{stem}.csv"))
}

pub fn correction_entries(cache: &CorrectionCache) -> Vec<CorrectionEntry> {
    cache
        .entries()
        .map(|(raw, canonical)| CorrectionEntry {
            raw: raw.to_string(),
            canonical: canonical.map(ToOwned::to_owned),
        })
        .collect()
}

pub fn record_set_counts(
    vocabulary: &Vocabulary,
    documents: &[Document],
    aggregates: &Aggregates,
) -> RunCounts {
    RunCounts {
        vocabulary_size: vocabulary.len(),
        document_count: documents.len(),
        record_count: documents.iter().map(|document| document.records.len()).sum(),
        speaker_count: aggregates.speakers.len(),
        used_tag_count: aggregates.used_codes().count(),
        ..RunCounts::default()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::aggregate::aggregate;

    fn documents() -> Vec<Document> {
        vec![
            Document {
                title: "Interview_1".to_string(),
                records: vec![
                    Record {
                        document: "Interview_1".to_string(),
                        record_id: 1,
                        speaker: "Jones".to_string(),
                        text: "I trust it, mostly".to_string(),
                        tags: vec!["trust".to_string(), "privacy".to_string()],
                    },
                    Record {
                        document: "Interview_1".to_string(),
                        record_id: 2,
                        speaker: "Jones".to_string(),
                        text: "Not always".to_string(),
                        tags: vec!["privacy".to_string()],
                    },
                ],
            },
            Document {
                title: "Interview_2".to_string(),
                records: vec![Record {
                    document: "Interview_2".to_string(),
                    record_id: 1,
                    speaker: "Smith".to_string(),
                    text: "Never".to_string(),
                    tags: vec!["privacy".to_string()],
                }],
            },
        ]
    }

    #[test]
    fn write_outputs_lays_out_listings_and_counts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = OutputLayout::new(&dir.path().join("out"));
        let documents = documents();
        let vocabulary = Vocabulary::from_entries(["privacy", "trust", "unused"]);
        let aggregates = aggregate(&documents, &vocabulary);

        let written = write_outputs(&layout, &documents, &aggregates).expect("write outputs");
        assert_eq!(written, 3 + 2 + 3);

        let privacy = fs::read_to_string(layout.codes_dir.join("privacy.csv")).expect("privacy");
        assert_eq!(privacy.lines().count(), 4);
        assert!(privacy.contains("Interview_1,1,Jones,\"I trust it, mostly\",trust,privacy"));

        let unused = fs::read_to_string(layout.codes_dir.join("unused.csv")).expect("unused");
        assert_eq!(unused, "document,record_id,speaker,text\n");

        let second = fs::read_to_string(layout.documents_dir.join("Interview_2.csv"))
            .expect("document listing");
        assert_eq!(
            second,
            "document,record_id,speaker,text\nInterview_2,1,Smith,Never,privacy\n"
        );

        let counts = fs::read_to_string(&layout.code_counts_path).expect("code counts");
        assert_eq!(
            counts,
            "code,document_count,record_count,speaker_count\nprivacy,2,3,2\ntrust,1,1,1\n"
        );

        let aggregates_json: serde_json::Value = serde_json::from_slice(
            &fs::read(&layout.aggregates_path).expect("aggregates json"),
        )
        .expect("parse aggregates");
        assert_eq!(aggregates_json["codes"]["privacy"]["record_count"], 3);
        assert_eq!(aggregates_json["speakers"]["Jones"]["tag_counts"]["privacy"], 2);
    }

    #[test]
    fn written_snapshot_reloads_to_same_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = OutputLayout::new(dir.path());
        let documents = documents();
        let aggregates = aggregate(&documents, &Vocabulary::default());

        write_outputs(&layout, &documents, &aggregates).expect("write outputs");
        let snapshot = crate::snapshot::load_snapshot(&layout.snapshot_path).expect("reload");
        assert_eq!(snapshot.documents, documents);
    }

    #[test]
    fn listing_file_name_rejects_unusable_keys() {
        assert_eq!(listing_file_name("privacy"), Some("privacy.csv".to_string()));
        assert_eq!(listing_file_name("a/b"), Some("a_b.csv".to_string()));
        assert_eq!(listing_file_name("%%"), None);
        assert_eq!(listing_file_name(".."), None);
    }

    #[test]
    fn manifest_path_uses_compact_timestamp() {
        let layout = OutputLayout::new(Path::new("out"));
        let ts = DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        assert_eq!(
            layout.manifest_path(ts, 1),
            Path::new("out").join("manifests").join("run_20240305T070809Z.json")
        );
        assert_eq!(
            layout.manifest_path(ts, 3),
            Path::new("out").join("manifests").join("run_20240305T070809Z_3.json")
        );
    }

    #[test]
    fn correction_entries_dump_cache_in_key_order() {
        let vocabulary = Vocabulary::from_entries(["privacy"]);
        let config = crate::config::ProjectConfig::default();
        let reconciler = crate::reconcile::Reconciler::new(&vocabulary, &config);
        let mut cache = CorrectionCache::new();
        reconciler.resolve("privacy concerns", &mut cache);
        reconciler.resolve("Privacy", &mut cache);

        let entries = correction_entries(&cache);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].raw, "Privacy");
        assert_eq!(entries[1].raw, "privacy concerns");
        assert_eq!(entries[1].canonical.as_deref(), Some("privacy"));
    }
}
