use super::media::{MediaKind, display_title};
use super::types::{ProgressParser, QueueRecord};
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Container format passed to ffmpeg with `-f`
pub const OUTPUT_FORMAT: &str = "mp4";

/// Encoder settings that shape the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub ffmpeg: String,
    pub video_codec: String,
    pub codec_tag: String,
    /// Extra arguments inserted before the metadata options, shell-quoted
    pub extra_args: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            video_codec: "libx265".to_string(),
            codec_tag: "hvc1".to_string(),
            extra_args: String::new(),
        }
    }
}

/// One file's conversion: where it comes from, where it goes, how it is titled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub title: String,
    pub kind: MediaKind,
    /// Something was already at `output_path` when the job was derived
    pub output_existed: bool,
}

impl TranscodeJob {
    /// Derive the job for a queue record; `None` when the extension is not a media kind.
    pub fn for_record(record: &QueueRecord) -> Option<Self> {
        let kind = MediaKind::from_filename(&record.filename)?;
        let input_path = record.full_path();
        let output_path = kind.output_path(&input_path);
        Some(Self {
            output_existed: output_path.exists(),
            output_path,
            title: display_title(&input_path),
            input_path,
            kind,
        })
    }
}

/// Runs the conversion of a single file.
///
/// `Ok` means the output file was written completely; any `Err` is an encoder
/// failure and may leave a partial file at `job.output_path`.
pub trait Encoder {
    fn encode(&self, job: &TranscodeJob) -> Result<()>;

    /// Human-readable command line, for dry runs and logs
    fn describe(&self, job: &TranscodeJob) -> String;
}

fn apply_additional_args(cmd: &mut Command, additional_args: &str) {
    let additional_args = additional_args.trim();
    if additional_args.is_empty() {
        return;
    }

    // Use shlex for shell-style parsing (respects quotes)
    if let Some(args) = shlex::split(additional_args) {
        cmd.args(args);
    } else {
        // If shlex fails to parse (unbalanced quotes), fall back to simple whitespace split
        cmd.args(additional_args.split_whitespace());
    }
}

/// Build the ffmpeg command converting `job` to HEVC in an MP4 container.
///
/// Video is re-encoded with the configured codec and tag, audio is copied,
/// the title tag becomes the base filename and the comment tag is cleared.
pub fn build_transcode_cmd(job: &TranscodeJob, settings: &EncoderSettings) -> Command {
    let mut cmd = Command::new(&settings.ffmpeg);
    cmd.arg("-hide_banner")
        .arg("-y")
        .arg("-i")
        .arg(&job.input_path)
        .args(["-progress", "-", "-nostats"])
        .arg("-c:v")
        .arg(&settings.video_codec)
        .arg("-tag:v")
        .arg(&settings.codec_tag)
        .args(["-c:a", "copy"]);

    apply_additional_args(&mut cmd, &settings.extra_args);

    cmd.arg("-metadata")
        .arg(format!("title={}", job.title))
        .arg("-metadata")
        .arg("comment=")
        .arg("-f")
        .arg(OUTPUT_FORMAT)
        .arg(&job.output_path);
    cmd
}

/// Render a command the way a shell would accept it
pub fn cmd_to_string(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|arg| {
            let arg = arg.to_string_lossy();
            shlex::try_quote(&arg)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| arg.into_owned())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn tail_lines(text: &str, n: usize) -> Cow<'_, str> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() > n {
        Cow::Owned(lines[lines.len() - n..].join("\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Encoder that shells out to ffmpeg
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    pub settings: EncoderSettings,
}

impl FfmpegEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&self, job: &TranscodeJob) -> Result<()> {
        let mut cmd = build_transcode_cmd(job, &self.settings);
        debug!(command = %cmd_to_string(&cmd), "starting ffmpeg");

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().context("Failed to spawn ffmpeg")?;

        let stderr = child.stderr.take().context("Failed to capture stderr")?;
        let stderr_thread = std::thread::spawn(move || {
            let mut stderr_output = String::new();
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                stderr_output.push_str(&line);
                stderr_output.push('\n');
            }
            stderr_output
        });

        let stdout = child.stdout.take().context("Failed to capture stdout")?;
        let reader = BufReader::new(stdout);
        let mut parser = ProgressParser::new();
        for line in reader.lines().map_while(Result::ok) {
            if parser.parse_line(&line) {
                debug!("{}", parser.summary_line(&job.title));
            }
        }

        let status = child.wait().context("Failed to wait for ffmpeg")?;
        let stderr_output = stderr_thread
            .join()
            .unwrap_or_else(|_| "Failed to capture stderr".to_string());

        if !status.success() {
            anyhow::bail!(
                "ffmpeg exited with {}\n{}",
                status,
                tail_lines(&stderr_output, 10)
            );
        }
        if !job.output_path.exists() {
            anyhow::bail!(
                "ffmpeg reported success but '{}' was not created",
                job.output_path.display()
            );
        }

        info!(
            frames = parser.frame.unwrap_or(0),
            complete = parser.is_complete,
            "ffmpeg finished '{}'",
            job.output_path.display()
        );
        Ok(())
    }

    fn describe(&self, job: &TranscodeJob) -> String {
        cmd_to_string(&build_transcode_cmd(job, &self.settings))
    }
}
