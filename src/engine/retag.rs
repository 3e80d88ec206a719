// Metadata-only pass: fix title/comment tags without re-encoding

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::{error, info, warn};

use super::core::{MediaKind, QueueRecord, display_title};

/// Rewrites container tags in place.
pub trait TagWriter {
    /// Set the title tag and clear the comment tag.
    fn retag(&self, path: &Path, title: &str) -> Result<()>;
}

/// Tag writer backed by `exiftool -overwrite_original`
#[derive(Debug, Clone)]
pub struct ExiftoolTagWriter {
    pub binary: String,
}

impl Default for ExiftoolTagWriter {
    fn default() -> Self {
        Self {
            binary: "exiftool".to_string(),
        }
    }
}

impl TagWriter for ExiftoolTagWriter {
    fn retag(&self, path: &Path, title: &str) -> Result<()> {
        let output = Command::new(&self.binary)
            .arg("-overwrite_original")
            .arg(format!("-title={}", title))
            .arg("-comment=")
            .arg(path)
            .output()
            .context("Failed to execute exiftool. Is exiftool installed and in PATH?")?;

        if !output.status.success() {
            anyhow::bail!(
                "exiftool failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Totals for a metadata-only pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetagReport {
    pub updated: usize,
    pub failed: usize,
    pub not_mp4: usize,
}

/// Update the title/comment tags of every MP4 in `records`.
///
/// Other containers are left alone with a warning; they get their tags when
/// converted. Per-file failures are logged and never stop the pass.
pub fn retag_records(records: &[QueueRecord], writer: &dyn TagWriter) -> RetagReport {
    let mut report = RetagReport::default();
    for record in records {
        let path = record.full_path();
        if MediaKind::from_filename(&record.filename) != Some(MediaKind::ProbeRequired) {
            warn!(
                "'{}' is not MP4. Convert to update the metadata.",
                path.display()
            );
            report.not_mp4 += 1;
            continue;
        }

        match writer.retag(&path, &display_title(&path)) {
            Ok(()) => {
                info!("Updated metadata for '{}'.", path.display());
                report.updated += 1;
            }
            Err(e) => {
                error!(
                    error = %e,
                    "Invalid MP4 file type for '{}'. Convert to update the metadata.",
                    path.display()
                );
                report.failed += 1;
            }
        }
    }
    report
}
