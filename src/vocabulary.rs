use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::normalize::tag_key;

/// The codebook: canonical tags in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    entries: Vec<String>,
    members: HashSet<String>,
}

impl Vocabulary {
    #[cfg(test)]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabulary = Self::default();
        for entry in entries {
            vocabulary.push(entry.as_ref());
        }
        vocabulary
    }

    fn push(&mut self, raw: &str) -> bool {
        let key = tag_key(raw);
        if key.is_empty() || self.members.contains(&key) {
            return false;
        }
        self.members.insert(key.clone());
        self.entries.push(key);
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.members.contains(tag)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn load_vocabulary(path: &Path) -> Result<Vocabulary> {
    let file = File::open(path)
        .with_context(|| format!("failed to open codebook {}", path.display()))?;
    let vocabulary = read_vocabulary(file)
        .with_context(|| format!("failed to read codebook {}", path.display()))?;

    if vocabulary.is_empty() {
        warn!(path = %path.display(), "codebook contains no tags; every tag will be discarded");
    }
    info!(path = %path.display(), tags = vocabulary.len(), "loaded codebook");

    Ok(vocabulary)
}

pub fn read_vocabulary<R: Read>(reader: R) -> Result<Vocabulary> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut vocabulary = Vocabulary::default();
    let mut duplicates = 0_usize;
    for (index, row) in csv_reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!(row = index + 1, error = %err, "skipping unparseable codebook row");
                continue;
            }
        };
        let Some(first) = row.get(0) else {
            continue;
        };
        if tag_key(first).is_empty() {
            continue;
        }
        if !vocabulary.push(first) {
            duplicates += 1;
        }
    }

    if duplicates > 0 {
        warn!(duplicates, "collapsed duplicate codebook tags");
    }

    Ok(vocabulary)
}
