use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "markusmoss",
    version,
    about = "Assemble per-case similarity reports from MOSS results and MarkUs submissions"
)]
pub struct Cli {
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run pipeline stages in order (all of them when no --stage is given).
    Run(RunArgs),
    /// Print the match records parsed from the downloaded MOSS index.
    Matches(MatchesArgs),
    /// Report which working-directory artifacts are present.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, default_value = "markusmossrc")]
    pub config: PathBuf,

    #[arg(long)]
    pub workdir: Option<PathBuf>,

    #[arg(long)]
    pub assignment: Option<String>,

    #[arg(long)]
    pub moss_report_url: Option<String>,

    #[arg(long)]
    pub language: Option<String>,

    #[arg(long)]
    pub file_glob: Option<String>,

    #[arg(long = "group")]
    pub groups: Vec<String>,

    #[arg(short, long, default_value_t = false)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long = "stage", value_enum)]
    pub stages: Vec<Stage>,
}

#[derive(Args, Debug, Clone)]
pub struct MatchesArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, ValueEnum)]
pub enum Stage {
    Pdf,
    Fetch,
    Assemble,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Pdf, Stage::Fetch, Stage::Assemble];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Fetch => "fetch",
            Self::Assemble => "assemble",
        }
    }

    /// Canonical execution order for a caller-supplied subset.
    pub fn plan(requested: &[Stage]) -> Vec<Stage> {
        if requested.is_empty() {
            return Self::ALL.to_vec();
        }
        let mut stages = requested.to_vec();
        stages.sort();
        stages.dedup();
        stages
    }
}
