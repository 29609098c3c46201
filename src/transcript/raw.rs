use std::io::Read;

use anyhow::{Context, Result};
use regex::Regex;

use super::{ParsedRow, QuoteLine};
use crate::normalize::strip_quotes_space;

#[derive(Debug)]
pub struct SpeakerSplitter {
    prefix: Regex,
}

impl SpeakerSplitter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            prefix: Regex::new(r"(?s)^([^:]*):(.*)$")
                .context("failed to compile speaker prefix regex")?,
        })
    }

    /// Splits `Speaker: text` at the first colon. A quote without a colon has
    /// no speaker of its own.
    pub fn split(&self, quote: &str) -> (String, String) {
        match self.prefix.captures(quote) {
            Some(captures) => {
                let speaker = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                let text = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
                (strip_quotes_space(speaker), strip_quotes_space(text))
            }
            None => (String::new(), strip_quotes_space(quote)),
        }
    }
}

pub fn parse_raw_rows<R: Read>(
    reader: R,
    has_header: bool,
    splitter: &SpeakerSplitter,
) -> Result<Vec<ParsedRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut tag_columns = None;
    let mut header_pending = has_header;

    for (index, record) in csv_reader.records().enumerate() {
        let line = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                rows.push(ParsedRow::Malformed {
                    line,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let fields = record.iter().collect::<Vec<&str>>();
        if fields.iter().all(|field| field.trim().is_empty()) {
            rows.push(ParsedRow::Blank);
            continue;
        }

        if header_pending {
            header_pending = false;
            tag_columns = Some(fields.len().saturating_sub(1)).filter(|count| *count > 0);
            continue;
        }

        rows.push(parse_raw_fields(&fields, tag_columns, line, splitter));
    }

    Ok(rows)
}

// When the header declares N tag columns, the last N fields are tags and any
// surplus leading fields belong to an unquoted quote containing commas.
fn parse_raw_fields(
    fields: &[&str],
    tag_columns: Option<usize>,
    line: usize,
    splitter: &SpeakerSplitter,
) -> ParsedRow {
    let split_at = match tag_columns {
        Some(count) if fields.len() > count + 1 => fields.len() - count,
        _ => 1,
    };

    let quote = strip_quotes_space(&fields[..split_at].join(","));
    if quote.is_empty() {
        return ParsedRow::Malformed {
            line,
            reason: "tags present without a quote".to_string(),
        };
    }

    let (speaker, text) = splitter.split(&quote);
    let tags = fields[split_at..]
        .iter()
        .map(|field| strip_quotes_space(field))
        .filter(|field| !field.is_empty())
        .collect();

    ParsedRow::Quote(QuoteLine {
        speaker,
        text,
        tags,
    })
}
