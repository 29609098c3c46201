use std::collections::HashSet;
use std::io::Write;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::{ReformatArgs, TranscriptFormat};
use crate::commands::inventory::discover_csv_files;
use crate::transcript::{
    ParsedRow, SpeakerSplitter, document_title, format_delimited_line, read_transcript_rows,
};
use crate::util::{create_output_file, ensure_directory};

pub fn run(args: ReformatArgs) -> Result<()> {
    info!(
        input_dir = %args.input_dir.display(),
        output_dir = %args.output_dir.display(),
        "starting reformat"
    );

    let splitter = SpeakerSplitter::new()?;
    let inputs = discover_csv_files(std::slice::from_ref(&args.input_dir))?;
    if inputs.is_empty() {
        bail!("no transcripts found in {}", args.input_dir.display());
    }

    let mut converted = Vec::with_capacity(inputs.len());
    let mut seen_titles = HashSet::new();
    for path in &inputs {
        let title = document_title(path);
        if title.is_empty() || !seen_titles.insert(title.clone()) {
            warn!(path = %path.display(), document = %title, "skipping transcript with unusable or duplicate title");
            continue;
        }

        let rows = read_transcript_rows(path, TranscriptFormat::Raw, !args.no_header, &splitter)?;
        converted.push((path, title, render_delimited(&rows)));
    }

    ensure_directory(&args.output_dir)?;
    for (source, title, lines) in &converted {
        let output_path = args.output_dir.join(format!("{title}.csv"));
        let mut file = create_output_file(&output_path)?;
        file.write_all(lines.as_bytes())
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush {}", output_path.display()))?;

        info!(
            source = %source.display(),
            path = %output_path.display(),
            lines = lines.lines().count(),
            "reformatted transcript"
        );
    }

    info!(files = converted.len(), "reformat completed");
    Ok(())
}

fn render_delimited(rows: &[ParsedRow]) -> String {
    let mut output = String::new();
    for row in rows {
        match row {
            ParsedRow::Quote(quote) => {
                output.push_str(&format_delimited_line(quote));
                output.push('\n');
            }
            ParsedRow::Malformed { line, reason } => {
                warn!(line, reason = %reason, "dropping malformed row from reformatted output");
            }
            ParsedRow::Blank => {}
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::transcript::parse_delimited_lines;

    #[test]
    fn reformat_writes_delimited_files_that_parse_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input_dir = dir.path().join("raw");
        fs::create_dir_all(&input_dir).expect("input dir");
        fs::write(
            input_dir.join("Focus Group 1.csv"),
            "Quote,Code 1,Code 2\n\
             Jones: I use it, mostly,privacy,\n\
             ,,\n\
             and then some,trust,privacy\n",
        )
        .expect("write raw transcript");

        let output_dir = dir.path().join("delimited");
        run(ReformatArgs {
            input_dir,
            output_dir: output_dir.clone(),
            no_header: false,
        })
        .expect("reformat");

        let written = fs::read_to_string(output_dir.join("Focus_Group_1.csv")).expect("output");
        assert_eq!(written.lines().count(), 2);

        let rows = parse_delimited_lines(written.as_bytes()).expect("parse back");
        assert!(matches!(
            &rows[0],
            ParsedRow::Quote(quote) if quote.speaker == "Jones"
                && quote.text == "I use it, mostly"
                && quote.tags == vec!["privacy".to_string()]
        ));
        assert!(matches!(
            &rows[1],
            ParsedRow::Quote(quote) if quote.speaker.is_empty() && quote.tags.len() == 2
        ));
    }

    #[test]
    fn reformat_fails_for_empty_input_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run(ReformatArgs {
            input_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("out"),
            no_header: false,
        })
        .expect_err("no transcripts");
        assert!(err.to_string().contains("no transcripts found"));
    }
}
