// One run of the queue: populate, convert a batch, retry, summarize

use anyhow::Result;
use chrono::Local;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::core::{Encoder, QueueStore, resolve_batch_limit, scan};
use super::probe::{MetadataProbe, classify_all};
use super::retag::{RetagReport, TagWriter, retag_records};
use super::worker::{BatchReport, ConversionWorker, retry_failed};
use crate::summary::{RunSummary, StatusCounts};

/// Run-level switches, resolved from configuration
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub root: PathBuf,
    pub persist: bool,
    pub batch: Option<String>,
    pub transcode: bool,
    pub delete_originals: bool,
    pub retry_failed: bool,
    pub target_tag: String,
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Completed(RunSummary),
    /// Conversion was requested but nothing was queued
    EmptyBatch(RunSummary),
    /// Metadata-only pass
    Retagged {
        summary: RunSummary,
        retag: RetagReport,
    },
}

impl SessionOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            SessionOutcome::Completed(summary) | SessionOutcome::EmptyBatch(summary) => summary,
            SessionOutcome::Retagged { summary, .. } => summary,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, SessionOutcome::EmptyBatch(_))
    }
}

/// Wires the queue to its external tools for one run.
pub struct Session<'a> {
    pub store: &'a QueueStore,
    pub probe: &'a dyn MetadataProbe,
    pub encoder: &'a dyn Encoder,
    pub tag_writer: &'a dyn TagWriter,
    pub options: SessionOptions,
}

impl Session<'_> {
    /// Scan and insert, unless a durable queue already holds records.
    ///
    /// Returns the number of records inserted.
    pub fn populate(&self) -> Result<usize> {
        if self.options.persist {
            let existing = self.store.count()?;
            if existing > 0 {
                info!("Found {} video files in queue.", existing);
                return Ok(0);
            }
            info!(
                "Queue '{}' is empty. Setting up.",
                self.store.db_path().display()
            );
        }

        let files = scan(&self.options.root)?;
        info!(
            "Found {} media files under '{}'.",
            files.len(),
            self.options.root.display()
        );
        let records = classify_all(files, self.probe, &self.options.target_tag);
        let report = self.store.insert_many(&records)?;
        debug!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            "Queue populated"
        );
        Ok(report.inserted)
    }

    /// Run everything after population and read the final counts.
    pub fn process(&self) -> Result<SessionOutcome> {
        let started_at = Local::now();

        if !self.options.transcode {
            let records = self.store.select_all()?;
            let retag = retag_records(&records, self.tag_writer);
            info!(
                updated = retag.updated,
                failed = retag.failed,
                not_mp4 = retag.not_mp4,
                "Metadata pass finished"
            );
            let summary = RunSummary::new(
                started_at,
                StatusCounts::load(self.store)?,
                BatchReport::default(),
            );
            return Ok(SessionOutcome::Retagged { summary, retag });
        }

        let worker =
            ConversionWorker::new(self.store, self.encoder, self.options.delete_originals);
        let mut report = BatchReport::default();

        if self.options.persist && self.options.retry_failed {
            info!("Retrying failed video files.");
            report.merge(&retry_failed(self.store, &worker)?);
        }

        let limit = resolve_batch_limit(self.options.batch.as_deref());
        let batch = self.store.select_batch(limit)?;
        if batch.is_empty() {
            warn!("No video files to transcode. Exiting.");
            let summary = RunSummary::new(started_at, StatusCounts::load(self.store)?, report);
            return Ok(SessionOutcome::EmptyBatch(summary));
        }

        info!("Converting {} video file(s).", batch.len());
        report.merge(&worker.convert_all(&batch));

        if self.options.retry_failed {
            report.merge(&retry_failed(self.store, &worker)?);
        }

        let summary = RunSummary::new(started_at, StatusCounts::load(self.store)?, report);
        Ok(SessionOutcome::Completed(summary))
    }

    pub fn run(&self) -> Result<SessionOutcome> {
        self.populate()?;
        self.process()
    }
}
