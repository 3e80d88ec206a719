mod batch;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod log;
mod media;
mod scan;
mod store;
mod types;

pub use batch::resolve_batch_limit;
pub use ffmpeg_cmd::{
    Encoder, EncoderSettings, FfmpegEncoder, OUTPUT_FORMAT, TranscodeJob, build_transcode_cmd,
    cmd_to_string,
};
pub use ffmpeg_info::{exiftool_version, ffmpeg_version, ffprobe_version, file_size};
pub use log::{default_filter, init_logging};
pub use media::{
    ALWAYS_CONVERT_EXT, INTERMEDIATE_EXT, MediaKind, Replacement, TARGET_EXT, display_title,
};
pub use scan::{is_media_file, scan, scan_streaming};
pub use store::{EPHEMERAL_DB_NAME, InsertReport, QueueStore, StoreError, StoreResult};
pub use types::{ConvertFlag, DiscoveredFile, Disposition, ProgressParser, QueueRecord, Status};
