// Layered configuration: defaults < TOML file < environment < command line

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::EncoderSettings;
use crate::engine::probe::{MetadataProbe, ProbeTool, probe_for};
use crate::engine::retag::ExiftoolTagWriter;

/// File name of the persistent queue when no `db_path` is configured
pub const DEFAULT_DB_NAME: &str = "queue.db";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Mount point scanned for media files
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Keep the queue across runs instead of rebuilding it every time
    #[serde(default)]
    pub persist: bool,

    /// Location of the persistent queue (defaults to the user data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,

    /// Maximum conversions per run; 0, negative or non-numeric means no cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchSetting>,

    /// Re-attempt failed conversions after the main batch
    #[serde(default)]
    pub retry_failed: bool,
}

/// Batch cap as written by the user, integer or text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchSetting {
    Number(i64),
    Text(String),
}

impl BatchSetting {
    /// Raw text handed to the batch planner
    pub fn as_text(&self) -> String {
        match self {
            BatchSetting::Number(n) => n.to_string(),
            BatchSetting::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Re-encode queued files; when false only the metadata pass runs
    #[serde(default = "default_true")]
    pub transcode: bool,

    /// Replace originals after a successful conversion
    #[serde(default)]
    pub delete_originals: bool,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_codec_tag")]
    pub codec_tag: String,

    /// Extra ffmpeg arguments, split like a shell would
    #[serde(default)]
    pub extra_args: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub tool: ProbeTool,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    #[serde(default = "default_exiftool")]
    pub exiftool: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

fn default_root() -> PathBuf {
    PathBuf::from("/mnt")
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("schema.sql")
}

fn default_true() -> bool {
    true
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_video_codec() -> String {
    "libx265".to_string()
}

fn default_codec_tag() -> String {
    "hvc1".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_exiftool() -> String {
    "exiftool".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            persist: false,
            db_path: None,
            schema_path: default_schema_path(),
            batch: None,
            retry_failed: false,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            transcode: true,
            delete_originals: false,
            ffmpeg: default_ffmpeg(),
            video_codec: default_video_codec(),
            codec_tag: default_codec_tag(),
            extra_args: String::new(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            tool: ProbeTool::default(),
            ffprobe: default_ffprobe(),
            exiftool: default_exiftool(),
        }
    }
}

/// Parse a boolean environment value: true/false, 1/0, yes/no, on/off
pub fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("{} must be true or false, got '{}'", name, other),
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("hevcq");
        Ok(config_dir.join("config.toml"))
    }

    /// Load config from `path`, or from the default location.
    ///
    /// A missing file yields the built-in defaults; nothing is written.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            if path.is_some() {
                bail!("Config file not found: {}", config_path.display());
            }
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Overlay values from the process environment
    pub fn apply_env_vars(&mut self) -> Result<()> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Overlay values from an environment lookup.
    ///
    /// `TRANSCODE` takes precedence over its alias `CONVERT`. `BATCH` is kept
    /// as text for the batch planner and never rejected here.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let flag = |name: &str| -> Result<Option<bool>> {
            lookup(name).map(|v| parse_flag(name, &v)).transpose()
        };

        let transcode = match flag("TRANSCODE")? {
            Some(value) => Some(value),
            None => flag("CONVERT")?,
        };
        if let Some(transcode) = transcode {
            self.encoder.transcode = transcode;
        }
        if let Some(debug) = flag("DEBUG")? {
            self.logging.debug = debug;
        }
        if let Some(delete) = flag("DELETE")? {
            self.encoder.delete_originals = delete;
        }
        if let Some(persist) = flag("PERSIST")? {
            self.queue.persist = persist;
        }
        if let Some(retry) = flag("RETRY_FAILED")? {
            self.queue.retry_failed = retry;
        }
        if let Some(batch) = lookup("BATCH") {
            self.queue.batch = Some(BatchSetting::Text(batch));
        }
        Ok(())
    }

    /// Persistent queue location, falling back to the user data directory
    pub fn db_path(&self) -> PathBuf {
        if let Some(path) = &self.queue.db_path {
            return path.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("hevcq").join(DEFAULT_DB_NAME))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_NAME))
    }

    /// Batch value as text, if one was configured
    pub fn batch_text(&self) -> Option<String> {
        self.queue.batch.as_ref().map(BatchSetting::as_text)
    }

    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            ffmpeg: self.encoder.ffmpeg.clone(),
            video_codec: self.encoder.video_codec.clone(),
            codec_tag: self.encoder.codec_tag.clone(),
            extra_args: self.encoder.extra_args.clone(),
        }
    }

    pub fn metadata_probe(&self) -> Box<dyn MetadataProbe> {
        probe_for(self.probe.tool, &self.probe.ffprobe, &self.probe.exiftool)
    }

    pub fn tag_writer(&self) -> ExiftoolTagWriter {
        ExiftoolTagWriter {
            binary: self.probe.exiftool.clone(),
        }
    }
}
