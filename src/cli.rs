use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the syncpoint daemon
#[derive(Parser, Debug)]
#[clap(name = "syncpointd")]
#[clap(about = "File coordination engine for concurrent agents", long_about = None)]
pub struct Args {
    /// Path to the JSON config file
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base directory to serve (repeatable; overrides the config file)
    #[clap(long = "base-dir", value_name = "DIR")]
    pub base_dirs: Vec<PathBuf>,

    /// Enable snapshot persistence regardless of the config file
    #[clap(long)]
    pub persist: bool,

    /// Disable the filesystem watcher regardless of the config file
    #[clap(long)]
    pub no_watcher: bool,
}
