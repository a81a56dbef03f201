use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::formats::Direction;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Base URL of the extraction backend (overrides WEBTEXTEXTRACT_BACKEND_URL).
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Directory holding history and the last URL (overrides WEBTEXTEXTRACT_DATA_DIR).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the chapter pattern detected in a URL.
    Detect(DetectArgs),
    /// Extract the text of a page.
    Extract(ExtractArgs),
    /// Extract the chapter after the current one.
    Next(ExtractArgs),
    /// Extract the chapter before the current one.
    Prev(ExtractArgs),
    /// Move several chapters at once.
    Step(StepArgs),
    /// Let the backend find the sibling page and extract it.
    Follow(FollowArgs),
    /// Show or clear recently visited URLs.
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    /// List saved extractions, newest first.
    Saved,
    /// Read URLs from stdin and extract each once input settles.
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    #[arg(long)]
    pub url: String,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Page URL (default: the last URL used).
    #[arg(long)]
    pub url: Option<String>,

    /// Skip pattern validation and scrape directly.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct StepArgs {
    /// Chapters to move; negative goes back.
    #[arg(long, allow_hyphen_values = true)]
    pub delta: i64,

    #[command(flatten)]
    pub extract: ExtractArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FollowDirection {
    Next,
    Previous,
}

impl From<FollowDirection> for Direction {
    fn from(value: FollowDirection) -> Self {
        match value {
            FollowDirection::Next => Self::Next,
            FollowDirection::Previous => Self::Previous,
        }
    }
}

#[derive(Debug, Args)]
pub struct FollowArgs {
    #[arg(long, value_enum)]
    pub direction: FollowDirection,

    #[command(flatten)]
    pub extract: ExtractArgs,
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    List,
    Clear,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[arg(long)]
    pub force: bool,
}
