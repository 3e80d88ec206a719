// Codec classification using an external metadata probe

use crate::engine::core::{DiscoveredFile, Disposition, MediaKind, QueueRecord};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::{error, info, warn};

/// Container name reported for Matroska files
pub const MATROSKA: &str = "matroska";

/// Reads codec and container tags from a media file.
///
/// Returned strings are lowercased and trimmed; an empty string means the tool
/// ran but had nothing to report. `Err` means the tool could not read the file.
pub trait MetadataProbe {
    /// Codec identifier of the first video stream (e.g. `hvc1`, `avc1`)
    fn codec_tag(&self, path: &Path) -> Result<String>;

    /// Container / document type (e.g. `matroska`)
    fn container_type(&self, path: &Path) -> Result<String>;
}

/// Which external tool backs the probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeTool {
    #[default]
    Ffprobe,
    Exiftool,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_tag_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

fn normalize_tag(raw: &str) -> String {
    let tag = raw.trim().to_ascii_lowercase();
    // ffprobe prints an all-zero fourcc when the container stores no tag
    if tag == "[0][0][0][0]" { String::new() } else { tag }
}

/// Extract the first video stream's codec tag from ffprobe JSON
pub fn parse_ffprobe_codec_tag(json: &str) -> Result<String> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON output")?;
    Ok(probe
        .streams
        .first()
        .and_then(|s| s.codec_tag_string.as_deref())
        .map(normalize_tag)
        .unwrap_or_default())
}

/// Extract the container format name from ffprobe JSON
pub fn parse_ffprobe_format_name(json: &str) -> Result<String> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON output")?;
    Ok(probe
        .format
        .and_then(|f| f.format_name)
        .map(|name| name.trim().to_ascii_lowercase())
        .unwrap_or_default())
}

fn run_probe(mut cmd: Command, tool: &str, path: &Path) -> Result<String> {
    let output = cmd
        .output()
        .with_context(|| format!("Failed to execute {}. Is it installed and in PATH?", tool))?;

    if !output.status.success() {
        anyhow::bail!(
            "{} failed for {}: {}",
            tool,
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Probe backed by `ffprobe`
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    pub binary: String,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            binary: "ffprobe".to_string(),
        }
    }
}

impl MetadataProbe for FfprobeProbe {
    fn codec_tag(&self, path: &Path) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_tag_string",
            "-of",
            "json",
        ])
        .arg(path);
        parse_ffprobe_codec_tag(&run_probe(cmd, "ffprobe", path)?)
    }

    fn container_type(&self, path: &Path) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-v", "error", "-show_entries", "format=format_name", "-of", "json"])
            .arg(path);
        parse_ffprobe_format_name(&run_probe(cmd, "ffprobe", path)?)
    }
}

/// Probe backed by `exiftool`
#[derive(Debug, Clone)]
pub struct ExiftoolProbe {
    pub binary: String,
}

impl Default for ExiftoolProbe {
    fn default() -> Self {
        Self {
            binary: "exiftool".to_string(),
        }
    }
}

impl MetadataProbe for ExiftoolProbe {
    fn codec_tag(&self, path: &Path) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-api", "largefilesupport", "-s3", "-CompressorID"])
            .arg(path);
        Ok(normalize_tag(&run_probe(cmd, "exiftool", path)?))
    }

    fn container_type(&self, path: &Path) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-s3", "-DocType"]).arg(path);
        Ok(run_probe(cmd, "exiftool", path)?.trim().to_ascii_lowercase())
    }
}

/// Build the configured probe backend
pub fn probe_for(tool: ProbeTool, ffprobe: &str, exiftool: &str) -> Box<dyn MetadataProbe> {
    match tool {
        ProbeTool::Ffprobe => Box::new(FfprobeProbe {
            binary: ffprobe.to_string(),
        }),
        ProbeTool::Exiftool => Box::new(ExiftoolProbe {
            binary: exiftool.to_string(),
        }),
    }
}

fn is_matroska(container: &str) -> bool {
    container.split(',').any(|name| name.trim() == MATROSKA)
}

/// Classify a file whose codec tag came back empty, using its container type.
fn classify_by_container(probe: &dyn MetadataProbe, path: &Path) -> Disposition {
    match probe.container_type(path) {
        Ok(container) if is_matroska(&container) => {
            warn!(
                "'{}' is Matroska, not MP4. Queued for conversion.",
                path.display()
            );
            Disposition::QUEUED
        }
        Ok(container) => {
            error!(
                "'{}' is '{}' type. Status is unknown.",
                path.display(),
                container
            );
            Disposition::UNKNOWN
        }
        Err(e) => {
            error!(error = %e, "'{}' container type could not be read.", path.display());
            Disposition::UNKNOWN
        }
    }
}

/// Decide a file's disposition from its extension and, when needed, its codec tag.
///
/// The always-convert container is queued without probing. Anything else is
/// skipped when it already carries `target_tag`, queued for any other tag, and
/// falls back to a container check when the tag is empty.
pub fn classify(file: &DiscoveredFile, probe: &dyn MetadataProbe, target_tag: &str) -> Disposition {
    let path = file.full_path();
    if MediaKind::from_filename(&file.filename) == Some(MediaKind::AlwaysConvert) {
        return Disposition::QUEUED;
    }

    let tag = match probe.codec_tag(&path) {
        Ok(tag) => tag,
        Err(e) => {
            error!(
                error = %e,
                "'{}' is not a video file. Verify file type.",
                path.display()
            );
            return Disposition::UNKNOWN;
        }
    };

    if tag.eq_ignore_ascii_case(target_tag) {
        info!("'{}' is already converted.", path.display());
        Disposition::SKIPPED
    } else if tag.is_empty() {
        warn!(
            "'{}' returned an empty codec tag. Verifying video integrity.",
            path.display()
        );
        classify_by_container(probe, &path)
    } else {
        info!("'{}' needs to be converted ({}).", path.display(), tag);
        Disposition::QUEUED
    }
}

/// Classify every discovered file into a queue record
pub fn classify_all(
    files: Vec<DiscoveredFile>,
    probe: &dyn MetadataProbe,
    target_tag: &str,
) -> Vec<QueueRecord> {
    files
        .into_iter()
        .map(|file| {
            let disposition = classify(&file, probe, target_tag);
            file.into_record(disposition)
        })
        .collect()
}
