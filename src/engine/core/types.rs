use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Lifecycle state of a queue record.
///
/// `queued` records are converted, passing through `active` to `done` or
/// `failed`. `skipped` and `unknown` are assigned at scan time and never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Queued,
    Active,
    Done,
    Failed,
    Skipped,
    Unknown,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Queued,
        Status::Active,
        Status::Done,
        Status::Failed,
        Status::Skipped,
        Status::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Active => "active",
            Status::Done => "done",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::Unknown => "unknown",
        }
    }

    /// No automatic transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Done | Status::Skipped | Status::Unknown)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Status::Queued),
            "active" => Ok(Status::Active),
            "done" => Ok(Status::Done),
            "failed" => Ok(Status::Failed),
            "skipped" => Ok(Status::Skipped),
            "unknown" => Ok(Status::Unknown),
            other => Err(format!("unrecognised status '{}'", other)),
        }
    }
}

/// Whether a record is a transcode candidate (`Y`) or not (`N`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConvertFlag {
    #[serde(rename = "Y")]
    Yes,
    #[serde(rename = "N")]
    No,
}

impl ConvertFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConvertFlag::Yes => "Y",
            ConvertFlag::No => "N",
        }
    }
}

impl fmt::Display for ConvertFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConvertFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Y" => Ok(ConvertFlag::Yes),
            "N" => Ok(ConvertFlag::No),
            other => Err(format!("unrecognised convert flag '{}'", other)),
        }
    }
}

/// The `(convert, status)` pair assigned to a file when it is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
    pub convert: ConvertFlag,
    pub status: Status,
}

impl Disposition {
    /// Needs converting.
    pub const QUEUED: Disposition = Disposition {
        convert: ConvertFlag::Yes,
        status: Status::Queued,
    };

    /// Already in the target codec.
    pub const SKIPPED: Disposition = Disposition {
        convert: ConvertFlag::No,
        status: Status::Skipped,
    };

    /// Not readable as a video, or an unrecognised container.
    pub const UNKNOWN: Disposition = Disposition {
        convert: ConvertFlag::No,
        status: Status::Unknown,
    };
}

/// A file found by the directory scan, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscoveredFile {
    /// Absolute directory containing the file.
    pub path: String,
    pub filename: String,
}

impl DiscoveredFile {
    pub fn new(path: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filename: filename.into(),
        }
    }

    pub fn full_path(&self) -> PathBuf {
        PathBuf::from(&self.path).join(&self.filename)
    }

    pub fn into_record(self, disposition: Disposition) -> QueueRecord {
        QueueRecord {
            path: self.path,
            filename: self.filename,
            convert: disposition.convert,
            status: disposition.status,
        }
    }
}

/// One row of the queue table, keyed by `(path, filename)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub path: String,
    pub filename: String,
    pub convert: ConvertFlag,
    pub status: Status,
}

impl QueueRecord {
    pub fn full_path(&self) -> PathBuf {
        PathBuf::from(&self.path).join(&self.filename)
    }
}

/// Parser for ffmpeg progress output (key=value format)
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub frame: Option<u64>,
    pub out_time: Option<String>,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub total_size: Option<u64>,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single line of ffmpeg progress output.
    /// Returns true when the line closes a progress block.
    pub fn parse_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.split_once('=') else {
            return false;
        };
        let value = value.trim();
        match key.trim() {
            "frame" => {
                if let Ok(f) = value.parse::<u64>() {
                    self.frame = Some(f);
                }
            }
            "out_time" => {
                self.out_time = Some(value.to_string());
            }
            "fps" => {
                if let Ok(f) = value.parse::<f64>() {
                    self.fps = Some(f);
                }
            }
            "speed" => {
                // "1.23x"
                if let Ok(s) = value.trim_end_matches('x').parse::<f64>() {
                    self.speed = Some(s);
                }
            }
            "bitrate" => {
                // "123.4kbits/s"
                if let Ok(b) = value.trim_end_matches("kbits/s").parse::<f64>() {
                    self.bitrate_kbps = Some(b);
                }
            }
            "total_size" => {
                if let Ok(size) = value.parse::<u64>() {
                    self.total_size = Some(size);
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
                return true;
            }
            _ => {}
        }
        false
    }

    /// One-line operator view of the latest progress block.
    pub fn summary_line(&self, filename: &str) -> String {
        // ffmpeg reports out_time with microseconds; two decimals is plenty
        let time = self
            .out_time
            .as_deref()
            .map(|t| match t.split_once('.') {
                Some((whole, frac)) => {
                    format!("{}.{}", whole, frac.chars().take(2).collect::<String>())
                }
                None => t.to_string(),
            })
            .unwrap_or_else(|| "-".to_string());
        format!(
            "File={} Frame={} FPS={} Size={}B Time={} Bitrate={}kb/s Speed={}x",
            filename,
            self.frame.unwrap_or(0),
            self.fps.map(|f| f as u64).unwrap_or(0),
            self.total_size.unwrap_or(0),
            time,
            self.bitrate_kbps.unwrap_or(0.0),
            self.speed.unwrap_or(0.0),
        )
    }
}
