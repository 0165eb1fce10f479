use std::path::PathBuf;

use clap::Parser;

use crate::application::data::LogLevel;

/// Polls a directory tree and prints what was created, modified or deleted.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Directory to watch [default: .]
    pub root: Option<PathBuf>,

    /// Config file [default: ./pollwatch.yaml when present]
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    /// Milliseconds between two polls [default: 1000]
    #[clap(long, short, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: Option<u64>,

    /// Where to keep the baseline between runs
    #[clap(long, short)]
    pub state_file: Option<PathBuf>,

    /// Poll a single time and exit
    #[clap(long)]
    pub once: bool,

    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,
}
