use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Container that is always converted, without probing
pub const ALWAYS_CONVERT_EXT: &str = "mkv";
/// Target container; files with this extension may already be converted
pub const TARGET_EXT: &str = "mp4";
/// Output extension used while a target-container file is re-encoded next to itself
pub const INTERMEDIATE_EXT: &str = "h265";

/// How a file's extension drives classification, output naming and cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Matroska source: always queued, converted to `<stem>.mp4`, original deleted
    AlwaysConvert,
    /// MP4 source: probed first, converted to `<stem>.h265`, then swapped over the original
    ProbeRequired,
}

/// What `replace_original` did to the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl MediaKind {
    /// Recognise a media file by extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            ALWAYS_CONVERT_EXT => Some(MediaKind::AlwaysConvert),
            TARGET_EXT => Some(MediaKind::ProbeRequired),
            _ => None,
        }
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        Self::from_path(Path::new(filename))
    }

    pub fn output_extension(&self) -> &'static str {
        match self {
            MediaKind::AlwaysConvert => TARGET_EXT,
            MediaKind::ProbeRequired => INTERMEDIATE_EXT,
        }
    }

    /// Encoder output path: same directory and base name, kind-specific extension
    pub fn output_path(&self, input: &Path) -> PathBuf {
        input.with_extension(self.output_extension())
    }

    /// Put the conversion result in place of the original input.
    pub fn replace_original(&self, input: &Path, output: &Path) -> io::Result<Replacement> {
        match self {
            MediaKind::AlwaysConvert => {
                // the .mp4 output already stands in for the source
                fs::remove_file(input)?;
                Ok(Replacement::Deleted(input.to_path_buf()))
            }
            MediaKind::ProbeRequired => {
                fs::rename(output, input)?;
                Ok(Replacement::Renamed {
                    from: output.to_path_buf(),
                    to: input.to_path_buf(),
                })
            }
        }
    }
}

/// Title tag for a converted file: the filename without its extension
pub fn display_title(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}
