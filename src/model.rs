use serde::{Deserialize, Serialize};

use crate::reconcile::ResolutionTally;
use crate::snapshot::MergeIssue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub document: String,
    pub record_id: u32,
    pub speaker: String,
    pub text: String,
    pub tags: Vec<String>,
}

impl Record {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|value| value == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub records: Vec<Record>,
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            records: Vec::new(),
        }
    }

    pub fn record_mut(&mut self, record_id: u32) -> Option<&mut Record> {
        self.records
            .iter_mut()
            .find(|record| record.record_id == record_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub path: String,
    pub document: Option<String>,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPaths {
    pub output_dir: String,
    pub codebook_path: String,
    pub config_path: Option<String>,
    pub source_snapshot_path: Option<String>,
    pub snapshot_path: String,
    pub aggregates_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub vocabulary_size: usize,
    pub source_count: usize,
    pub document_count: usize,
    pub record_count: usize,
    pub speaker_count: usize,
    pub used_tag_count: usize,
    pub rows_read: usize,
    pub blank_rows: usize,
    pub malformed_rows: usize,
    pub dropped_rows: usize,
    pub updates_applied: usize,
    pub updates_skipped: usize,
    pub snapshot_tags_rewritten: usize,
    pub snapshot_tags_dropped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionEntry {
    pub raw: String,
    pub canonical: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub mode: String,
    pub project_title: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub paths: RunPaths,
    pub counts: RunCounts,
    pub resolutions: ResolutionTally,
    pub sources: Vec<SourceEntry>,
    pub corrections: Vec<CorrectionEntry>,
    pub unresolved_tags: Vec<String>,
    pub merge_issues: Vec<MergeIssue>,
    pub warnings: Vec<String>,
}
