use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::model::SourceEntry;
use crate::util::sha256_file;

/// Expands the given inputs into a sorted list of CSV files. Files are taken
/// as given; directories are searched recursively for `*.csv`.
pub fn discover_csv_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        let metadata = fs::metadata(input)
            .with_context(|| format!("failed to inspect input {}", input.display()))?;

        if metadata.is_dir() {
            let before = files.len();
            collect_csv_files(input, &mut files)?;
            debug!(dir = %input.display(), found = files.len() - before, "scanned input directory");
        } else {
            files.push(input.clone());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn collect_csv_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?;

        if file_type.is_dir() {
            collect_csv_files(&path, files)?;
            continue;
        }

        if file_type.is_file() && is_csv(&path) {
            files.push(path);
        }
    }

    Ok(())
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

pub fn source_entry(path: &Path, document: Option<&str>) -> Result<SourceEntry> {
    Ok(SourceEntry {
        path: path.display().to_string(),
        document: document.map(ToOwned::to_owned),
        sha256: sha256_file(path)?,
    })
}
