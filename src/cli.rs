use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hevcq")]
#[command(about = "Queue-driven HEVC re-encoder for a media library", long_about = None)]
pub struct Cli {
    /// Root directory to scan for video files (overrides config)
    #[arg(value_name = "DIRECTORY")]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file to load instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum conversions this run (0 or negative means no cap)
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub batch: Option<String>,

    /// Keep the queue in a durable database across runs
    #[arg(long, global = true)]
    pub persist: bool,

    /// Durable queue location (implies --persist)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Schema file applied when the queue is opened
    #[arg(long, global = true, value_name = "PATH")]
    pub schema: Option<PathBuf>,

    /// Only fix title/comment tags, do not re-encode
    #[arg(long, global = true)]
    pub no_transcode: bool,

    /// Replace originals after a successful conversion
    #[arg(long, global = true)]
    pub delete: bool,

    /// Re-attempt failed conversions after the batch
    #[arg(long, global = true)]
    pub retry_failed: bool,

    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Also append log output to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan, queue and convert a batch (default)
    Run,

    /// Scan and classify files without touching the queue
    Scan,

    /// Show ffmpeg commands for the batch that would run
    DryRun,

    /// Show status counts of the durable queue
    Status {
        /// Print counts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one retry pass over failed records in the durable queue
    Retry,

    /// Classify a single file
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Check that ffmpeg, ffprobe and exiftool are installed
    CheckTools,

    /// Write the default config file, or show where it is
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
