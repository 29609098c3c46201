use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::Document;
use crate::normalize::normalize;
use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeStats {
    pub documents: BTreeSet<String>,
    pub speakers: BTreeSet<String>,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd, Serialize)]
pub struct RecordRef {
    pub document: String,
    pub record_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpeakerProfile {
    pub name: String,
    pub documents: BTreeSet<String>,
    pub records: Vec<RecordRef>,
    pub tag_counts: BTreeMap<String, usize>,
}

/// Derived view over a complete record set. Always rebuilt from scratch so the
/// numbers match the records that produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Aggregates {
    pub codes: BTreeMap<String, CodeStats>,
    pub speakers: BTreeMap<String, SpeakerProfile>,
    pub document_tag_counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl Aggregates {
    pub fn used_codes(&self) -> impl Iterator<Item = (&String, &CodeStats)> {
        self.codes.iter().filter(|(_, stats)| stats.record_count > 0)
    }

    // Most widely spread tags first; ties broken by record count, then name.
    pub fn codes_by_frequency(&self) -> Vec<(&String, &CodeStats)> {
        let mut codes = self.used_codes().collect::<Vec<_>>();
        codes.sort_by(|(left_tag, left), (right_tag, right)| {
            right
                .documents
                .len()
                .cmp(&left.documents.len())
                .then(right.record_count.cmp(&left.record_count))
                .then(left_tag.cmp(right_tag))
        });
        codes
    }
}

pub fn aggregate(documents: &[Document], vocabulary: &Vocabulary) -> Aggregates {
    let mut aggregates = Aggregates::default();
    for tag in vocabulary.entries() {
        aggregates.codes.entry(tag.clone()).or_default();
    }

    for document in documents {
        let document_counts = aggregates
            .document_tag_counts
            .entry(document.title.clone())
            .or_default();

        for record in &document.records {
            let speaker_key = normalize(&record.speaker);
            let mut profile = if speaker_key.is_empty() {
                None
            } else {
                let profile = aggregates
                    .speakers
                    .entry(speaker_key.clone())
                    .or_insert_with(|| SpeakerProfile {
                        name: record.speaker.clone(),
                        ..SpeakerProfile::default()
                    });
                profile.documents.insert(document.title.clone());
                profile.records.push(RecordRef {
                    document: document.title.clone(),
                    record_id: record.record_id,
                });
                Some(profile)
            };

            let distinct_tags = record.tags.iter().collect::<BTreeSet<&String>>();
            for tag in distinct_tags {
                let stats = aggregates.codes.entry(tag.clone()).or_default();
                stats.documents.insert(document.title.clone());
                stats.record_count += 1;
                if !speaker_key.is_empty() {
                    stats.speakers.insert(speaker_key.clone());
                }

                *document_counts.entry(tag.clone()).or_default() += 1;
                if let Some(profile) = profile.as_mut() {
                    *profile.tag_counts.entry(tag.clone()).or_default() += 1;
                }
            }
        }
    }

    aggregates
}
