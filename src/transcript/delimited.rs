use std::io::BufRead;

use anyhow::{Context, Result};

use super::{ParsedRow, QuoteLine};
use crate::normalize::strip_quotes_space;

pub const DELIMITER: &str = "=DELIM=";

pub fn parse_delimited_lines<R: BufRead>(mut reader: R) -> Result<Vec<ParsedRow>> {
    let mut rows = Vec::new();
    let mut buf = Vec::new();
    let mut line_number = 0;

    loop {
        buf.clear();
        let count = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("failed to read line {}", line_number + 1))?;
        if count == 0 {
            break;
        }
        line_number += 1;

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }

        match std::str::from_utf8(&buf) {
            Ok(line) => rows.push(parse_delimited_line(line, line_number)),
            Err(err) => rows.push(ParsedRow::Malformed {
                line: line_number,
                reason: format!("invalid UTF-8: {err}"),
            }),
        }
    }

    Ok(rows)
}

fn parse_delimited_line(line: &str, line_number: usize) -> ParsedRow {
    if line.trim().is_empty() {
        return ParsedRow::Blank;
    }

    let fields = line.split(DELIMITER).collect::<Vec<&str>>();
    if fields.len() != 3 {
        return ParsedRow::Malformed {
            line: line_number,
            reason: format!("expected 3 delimited fields, found {}", fields.len()),
        };
    }

    let tags = fields[2]
        .split(',')
        .map(strip_quotes_space)
        .filter(|tag| !tag.is_empty())
        .collect();

    ParsedRow::Quote(QuoteLine {
        speaker: strip_quotes_space(fields[0]),
        text: strip_quotes_space(fields[1]),
        tags,
    })
}

pub fn format_delimited_line(quote: &QuoteLine) -> String {
    let mut line = format!(
        "{} {DELIMITER} {} {DELIMITER} ",
        single_line(&quote.speaker),
        single_line(&quote.text)
    );
    for tag in &quote.tags {
        line.push_str(&single_line(tag).replace(',', ";"));
        line.push_str(", ");
    }
    line
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ").replace(DELIMITER, " ")
}
