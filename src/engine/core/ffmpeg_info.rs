use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

fn first_line_of(binary: &str, version_arg: &str) -> Result<String> {
    let output = Command::new(binary)
        .arg(version_arg)
        .output()
        .with_context(|| {
            format!(
                "Failed to execute {}. Is {} installed and in PATH?",
                binary, binary
            )
        })?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", binary, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.trim().to_string())
}

/// Check if ffmpeg is available and return its version
pub fn ffmpeg_version(binary: &str) -> Result<String> {
    first_line_of(binary, "-version")
}

/// Check if ffprobe is available and return its version
pub fn ffprobe_version(binary: &str) -> Result<String> {
    first_line_of(binary, "-version")
}

/// Check if exiftool is available and return its version
pub fn exiftool_version(binary: &str) -> Result<String> {
    first_line_of(binary, "-ver")
}

/// Size of a file in bytes
pub fn file_size(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read size of '{}'", path.display()))?;
    Ok(metadata.len())
}
