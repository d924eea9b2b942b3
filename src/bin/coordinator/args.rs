use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about, long_about = None, version)]
pub struct Args {
    /// Path to the coordinator's YAML configuration file.
    #[arg(short, long)]
    pub config: PathBuf,
    /// Enables human-friendly logging.
    #[arg(short, long, default_value_t)]
    pub debug: bool,
}
