use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn create_output_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let file = File::create(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;
    Ok(BufWriter::new(file))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = json_pretty_bytes(path, value)?;
    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    write_json_bytes(path, &mut file, &data)
}

/// Like `write_json_pretty`, but never replaces an existing file. Returns
/// `false` when `path` already exists.
pub fn write_json_pretty_new<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    let data = json_pretty_bytes(path, value)?;
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to create json file: {}", path.display()));
        }
    };
    write_json_bytes(path, &mut file, &data)?;
    Ok(true)
}

fn json_pretty_bytes<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))
}

fn write_json_bytes(path: &Path, file: &mut File, data: &[u8]) -> Result<()> {
    file.write_all(data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}
