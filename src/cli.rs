use std::path::PathBuf;

use clap::Parser;

use crate::types::{LogLevel, SyncTarget};

#[derive(Parser, Debug)]
#[command(
    name = "icloud-mirror",
    about = "Mirror iCloud Drive and iCloud Photos onto a local filesystem"
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long, env = "ICLOUD_MIRROR_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Log level (overrides app.logger.level; RUST_LOG overrides both)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Run one pass of each enabled taxonomy and exit
    #[arg(long)]
    pub once: bool,

    /// Only sync the given taxonomy
    #[arg(long, value_enum)]
    pub only: Option<SyncTarget>,

    /// List the albums of the photo library and exit
    #[arg(short = 'l', long)]
    pub list_albums: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

impl Cli {
    pub fn wants(&self, target: SyncTarget) -> bool {
        self.only.map_or(true, |only| only == target)
    }
}
