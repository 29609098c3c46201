use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "codebook",
    version,
    about = "Reconcile coded interview transcripts against a codebook"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest transcripts from scratch and write the snapshot and aggregates.
    Extract(ExtractArgs),
    /// Apply edited rows to an existing snapshot and rebuild the aggregates.
    Update(UpdateArgs),
    /// Convert raw transcripts into the delimited line format.
    Reformat(ReformatArgs),
    /// Summarize the most recent run recorded in an output directory.
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TranscriptFormat {
    Raw,
    Delimited,
}

impl TranscriptFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Delimited => "delimited",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub codebook: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = TranscriptFormat::Raw)]
    pub format: TranscriptFormat,

    #[arg(long, default_value_t = false)]
    pub no_header: bool,

    #[arg(required = true)]
    pub transcripts: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub codebook: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Snapshot to update; defaults to master.csv in the output directory.
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    pub updates: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReformatArgs {
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = false)]
    pub no_header: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::Cli;

    #[test]
    fn every_subcommand_has_help_text() {
        let command = Cli::command();
        command.clone().debug_assert();
        for subcommand in command.get_subcommands() {
            assert!(
                subcommand.get_about().is_some(),
                "{} has no help text",
                subcommand.get_name()
            );
        }
        assert!(command.find_subcommand("status").is_some());
    }
}
