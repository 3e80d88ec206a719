use super::media::MediaKind;
use super::types::DiscoveredFile;
use anyhow::{Context, Result, bail};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Check if a path has a recognised media extension
pub fn is_media_file(path: &Path) -> bool {
    MediaKind::from_path(path).is_some()
}

/// Scan a directory recursively for media files and invoke a callback for each file found
pub fn scan_streaming<F>(root: &Path, mut on_file: F) -> Result<()>
where
    F: FnMut(DiscoveredFile),
{
    let root = root
        .canonicalize()
        .with_context(|| format!("Scan root '{}' is not accessible", root.display()))?;
    if !root.is_dir() {
        bail!("Scan root '{}' is not a directory", root.display());
    }

    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_media_file(entry.path()) {
            continue;
        }

        let (Some(dir), Some(filename)) = (
            entry.path().parent().and_then(|p| p.to_str()),
            entry.file_name().to_str(),
        ) else {
            warn!(path = %entry.path().display(), "skipping file with a non UTF-8 name");
            continue;
        };

        info!("Found '{}/{}'.", dir, filename);
        on_file(DiscoveredFile::new(dir, filename));
    }

    Ok(())
}

/// Scan a directory recursively for media files.
///
/// An unreachable root or an empty result is an error: it almost always means
/// the media volume is not mounted.
pub fn scan(root: &Path) -> Result<Vec<DiscoveredFile>> {
    info!("Beginning scan of '{}'...", root.display());
    let mut files = Vec::new();
    scan_streaming(root, |file| files.push(file))?;
    info!("Scan complete. Found {} video file(s).", files.len());

    if files.is_empty() {
        bail!(
            "Empty scan results under '{}'. Is the volume mounted?",
            root.display()
        );
    }
    Ok(files)
}
