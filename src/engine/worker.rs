// Sequential conversion of queue records

use std::fs;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

use super::core::{
    Encoder, QueueRecord, QueueStore, Replacement, Status, StoreResult, TranscodeJob, file_size,
};
use crate::summary::format_bytes;

/// Terminal result of one conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOutcome {
    Done {
        /// Input size minus output size; `None` if either size was unreadable
        bytes_recovered: Option<i64>,
    },
    Failed,
}

impl ConversionOutcome {
    pub fn status(&self) -> Status {
        match self {
            ConversionOutcome::Done { .. } => Status::Done,
            ConversionOutcome::Failed => Status::Failed,
        }
    }
}

/// Totals for one pass over a list of records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub done: usize,
    pub failed: usize,
    pub bytes_recovered: i64,
    pub elapsed_secs: u64,
}

impl BatchReport {
    fn record(&mut self, outcome: ConversionOutcome) {
        self.attempted += 1;
        match outcome {
            ConversionOutcome::Done { bytes_recovered } => {
                self.done += 1;
                self.bytes_recovered += bytes_recovered.unwrap_or(0);
            }
            ConversionOutcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &BatchReport) {
        self.attempted += other.attempted;
        self.done += other.done;
        self.failed += other.failed;
        self.bytes_recovered += other.bytes_recovered;
        self.elapsed_secs += other.elapsed_secs;
    }
}

/// Drives the encoder for one record at a time and keeps the queue in step.
pub struct ConversionWorker<'a> {
    store: &'a QueueStore,
    encoder: &'a dyn Encoder,
    replace_originals: bool,
}

impl<'a> ConversionWorker<'a> {
    pub fn new(store: &'a QueueStore, encoder: &'a dyn Encoder, replace_originals: bool) -> Self {
        Self {
            store,
            encoder,
            replace_originals,
        }
    }

    /// Convert one record: `queued|failed → active → done|failed`.
    ///
    /// Never returns an error. Encoder failures mark the record `failed` and
    /// remove any partial output; status-write failures are logged by the store.
    /// A file already sitting at the output path is never touched: the record
    /// is marked `failed` without running the encoder.
    pub fn convert(&self, record: &QueueRecord) -> ConversionOutcome {
        let _span = info_span!("convert", file = %record.filename).entered();
        self.store
            .update_status(&record.path, &record.filename, Status::Active);

        let Some(job) = TranscodeJob::for_record(record) else {
            error!(
                "'{}' has no recognised media extension; cannot convert.",
                record.full_path().display()
            );
            self.store
                .update_status(&record.path, &record.filename, Status::Failed);
            return ConversionOutcome::Failed;
        };

        if job.output_existed {
            error!(
                "Output '{}' already exists; not converting '{}'.",
                job.output_path.display(),
                job.input_path.display()
            );
            self.store
                .update_status(&record.path, &record.filename, Status::Failed);
            return ConversionOutcome::Failed;
        }

        info!(
            "Converting '{}' to '{}'.",
            job.input_path.display(),
            job.output_path.display()
        );

        let outcome = match self.encoder.encode(&job) {
            Ok(()) => {
                info!("'{}' converted successfully.", job.input_path.display());
                ConversionOutcome::Done {
                    bytes_recovered: report_size_change(&job),
                }
            }
            Err(e) => {
                error!(
                    error = %format!("{:#}", e),
                    "Failed to convert '{}'.",
                    job.input_path.display()
                );
                remove_partial_output(&job);
                ConversionOutcome::Failed
            }
        };

        self.store
            .update_status(&record.path, &record.filename, outcome.status());

        if matches!(outcome, ConversionOutcome::Done { .. }) && self.replace_originals {
            replace_original(&job);
        }
        outcome
    }

    /// Convert each record in order, one at a time.
    pub fn convert_all(&self, records: &[QueueRecord]) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport::default();
        for (idx, record) in records.iter().enumerate() {
            debug!("Queue item {}/{}", idx + 1, records.len());
            report.record(self.convert(record));
        }
        report.elapsed_secs = started.elapsed().as_secs();
        report
    }
}

/// Re-submit every `failed` record once.
///
/// A record that fails again stays `failed` until the next call.
pub fn retry_failed(store: &QueueStore, worker: &ConversionWorker<'_>) -> StoreResult<BatchReport> {
    let failed = store.select_failed()?;
    if failed.is_empty() {
        return Ok(BatchReport::default());
    }
    info!("Retrying {} failed conversion(s).", failed.len());
    Ok(worker.convert_all(&failed))
}

fn remove_partial_output(job: &TranscodeJob) {
    if !job.output_path.exists() {
        debug!(
            "Nothing to remove. '{}' not found.",
            job.output_path.display()
        );
        return;
    }
    match fs::remove_file(&job.output_path) {
        Ok(()) => debug!(
            "Removed partial output from failed encode: '{}'",
            job.output_path.display()
        ),
        Err(e) => warn!(
            error = %e,
            "Failed to remove partial output '{}'",
            job.output_path.display()
        ),
    }
}

fn report_size_change(job: &TranscodeJob) -> Option<i64> {
    let sizes =
        file_size(&job.input_path).and_then(|input| Ok((input, file_size(&job.output_path)?)));
    match sizes {
        Ok((input, output)) => {
            info!(
                "'{}' is {}; '{}' is {}.",
                job.input_path.display(),
                format_bytes(input),
                job.output_path.display(),
                format_bytes(output)
            );
            let delta = input as i64 - output as i64;
            if delta >= 0 {
                info!("Recovered {} bytes in conversion.", delta);
            } else {
                info!("Conversion grew the file by {} bytes.", -delta);
            }
            Some(delta)
        }
        Err(e) => {
            warn!(error = %e, "Could not compare file sizes.");
            None
        }
    }
}

fn replace_original(job: &TranscodeJob) {
    match job.kind.replace_original(&job.input_path, &job.output_path) {
        Ok(Replacement::Deleted(path)) => info!("Deleted '{}'.", path.display()),
        Ok(Replacement::Renamed { from, to }) => {
            info!("Renamed '{}' to '{}'.", from.display(), to.display())
        }
        Err(e) => error!(
            error = %e,
            "Failed to replace '{}' with '{}'.",
            job.input_path.display(),
            job.output_path.display()
        ),
    }
}
