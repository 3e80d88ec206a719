// End-of-run reporting

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::engine::worker::BatchReport;
use crate::engine::{QueueStore, Status, StoreResult};

/// Record count per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub done: u64,
    pub failed: u64,
    pub queued: u64,
    pub skipped: u64,
    pub unknown: u64,
    /// Left behind by an interrupted run; reported only when non-zero
    pub active: u64,
}

impl StatusCounts {
    pub fn from_aggregate(counts: &BTreeMap<Status, u64>) -> Self {
        let get = |status| counts.get(&status).copied().unwrap_or(0);
        Self {
            done: get(Status::Done),
            failed: get(Status::Failed),
            queued: get(Status::Queued),
            skipped: get(Status::Skipped),
            unknown: get(Status::Unknown),
            active: get(Status::Active),
        }
    }

    /// Read the current counts from the queue
    pub fn load(store: &QueueStore) -> StoreResult<Self> {
        Ok(Self::from_aggregate(&store.aggregate_by_status()?))
    }

    pub fn get(&self, status: Status) -> u64 {
        match status {
            Status::Done => self.done,
            Status::Failed => self.failed,
            Status::Queued => self.queued,
            Status::Skipped => self.skipped,
            Status::Unknown => self.unknown,
            Status::Active => self.active,
        }
    }

    pub fn total(&self) -> u64 {
        Status::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done, {} failed, {} queued, {} skipped, {} unknown.",
            self.done, self.failed, self.queued, self.skipped, self.unknown
        )?;
        if self.active > 0 {
            write!(f, " {} still marked active.", self.active)?;
        }
        Ok(())
    }
}

/// Everything reported when a run finishes
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub counts: StatusCounts,
    pub session: BatchReport,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Local>, counts: StatusCounts, session: BatchReport) -> Self {
        Self {
            started_at,
            counts,
            session,
        }
    }

    /// Format space saved this run
    pub fn format_space_saved(&self) -> String {
        let space_saved = self.session.bytes_recovered;
        if space_saved >= 0 {
            format!("{} saved", format_bytes(space_saved as u64))
        } else {
            format!("{} larger", format_bytes(space_saved.unsigned_abs()))
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.counts.to_string()];
        if self.session.attempted > 0 {
            lines.push(format!(
                "This run: {} converted, {} failed, {} in {} (started {}).",
                self.session.done,
                self.session.failed,
                self.format_space_saved(),
                format_duration(self.session.elapsed_secs as f64),
                self.started_at.format("%Y-%m-%d %H:%M:%S"),
            ));
        }
        lines
    }
}

/// Format bytes as human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in seconds as human-readable time
pub fn format_duration(seconds: f64) -> String {
    let total_secs = seconds as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
