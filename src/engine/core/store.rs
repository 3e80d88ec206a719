//! SQLite-backed queue of tracked media files.
//!
//! Every operation opens its own connection, runs in a single transaction and
//! releases the connection when it goes out of scope, on success and on error.
//! There is no transaction spanning more than one operation.

use super::types::{ConvertFlag, QueueRecord, Status};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// File name of the queue database inside an ephemeral directory
pub const EPHEMERAL_DB_NAME: &str = "queue.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Schema file not found. Expected: '{}'", .0.display())]
    SchemaMissing(PathBuf),

    #[error("Failed to read schema file '{}': {source}", .path.display())]
    SchemaRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare queue location '{}': {source}", .path.display())]
    Location {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to queue database '{}': {source}", .path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Queue {operation} failed: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Duplicate entry for '{path}/{filename}'")]
    DuplicateKey { path: String, filename: String },
}

impl StoreError {
    fn query(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
        move |source| StoreError::Query { operation, source }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of a bulk insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: usize,
    pub duplicates: usize,
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for ConvertFlag {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ConvertFlag {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<QueueRecord> {
    Ok(QueueRecord {
        path: row.get(0)?,
        filename: row.get(1)?,
        convert: row.get(2)?,
        status: row.get(3)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Durable or ephemeral queue store.
#[derive(Debug)]
pub struct QueueStore {
    db_path: PathBuf,
    // Ephemeral queues live in here; the directory is removed on drop
    _temp_dir: Option<TempDir>,
}

impl QueueStore {
    /// Open (creating if needed) a queue database that outlives the run.
    pub fn open_durable(db_path: &Path, schema_path: &Path) -> StoreResult<Self> {
        let schema = load_schema(schema_path)?;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Location {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
            _temp_dir: None,
        };
        store.apply_schema(&schema)?;
        info!("Queue database is ready at '{}'.", db_path.display());
        Ok(store)
    }

    /// Open a fresh queue in a private temporary directory, discarded on drop.
    pub fn open_ephemeral(schema_path: &Path) -> StoreResult<Self> {
        let schema = load_schema(schema_path)?;
        let temp_dir = tempfile::Builder::new()
            .prefix("hevcq-")
            .tempdir()
            .map_err(|source| StoreError::Location {
                path: std::env::temp_dir(),
                source,
            })?;

        let store = Self {
            db_path: temp_dir.path().join(EPHEMERAL_DB_NAME),
            _temp_dir: Some(temp_dir),
        };
        debug!(
            "Setting up temporary queue database at '{}'",
            store.db_path.display()
        );
        store.apply_schema(&schema)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn is_ephemeral(&self) -> bool {
        self._temp_dir.is_some()
    }

    fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.db_path).map_err(|source| StoreError::Connect {
            path: self.db_path.clone(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|source| StoreError::Connect {
                path: self.db_path.clone(),
                source,
            })?;
        Ok(conn)
    }

    fn apply_schema(&self, schema: &str) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(schema)
            .map_err(StoreError::query("schema setup"))
    }

    /// Insert one record. A second insert of the same `(path, filename)` is
    /// rejected with `DuplicateKey` and leaves the stored row untouched.
    pub fn insert(&self, record: &QueueRecord) -> StoreResult<()> {
        let conn = self.connect()?;
        insert_row(&conn, record)
    }

    /// Bulk insert newly discovered records.
    ///
    /// Duplicates are logged and skipped one by one; only connection and other
    /// store failures abort the batch.
    pub fn insert_many(&self, records: &[QueueRecord]) -> StoreResult<InsertReport> {
        debug!("Inserting {} scanned result(s) into the queue.", records.len());

        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(StoreError::query("insert"))?;
        let mut report = InsertReport::default();

        for record in records {
            match insert_row(&tx, record) {
                Ok(()) => report.inserted += 1,
                Err(StoreError::DuplicateKey { path, filename }) => {
                    warn!(
                        path = %path,
                        filename = %filename,
                        "Duplicate entry found in queue; keeping existing record."
                    );
                    report.duplicates += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tx.commit().map_err(StoreError::query("insert commit"))?;
        info!(
            "Inserted {} entries into the queue ({} duplicate(s) skipped).",
            report.inserted, report.duplicates
        );
        Ok(report)
    }

    /// Records waiting for conversion, ordered by path then filename.
    pub fn select_batch(&self, limit: Option<usize>) -> StoreResult<Vec<QueueRecord>> {
        // SQLite treats a negative LIMIT as no limit
        let limit = limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        let records = self.select(
            "batch selection",
            "SELECT path, filename, convert, status FROM queue
             WHERE convert = ?1 AND status = ?2
             ORDER BY path, filename
             LIMIT ?3",
            params![ConvertFlag::Yes, Status::Queued, limit],
        )?;
        info!("Retrieved batch of {} file(s) to convert.", records.len());
        Ok(records)
    }

    /// Every record whose latest status is `failed`.
    pub fn select_failed(&self) -> StoreResult<Vec<QueueRecord>> {
        let records = self.select(
            "failed selection",
            "SELECT path, filename, convert, status FROM queue
             WHERE status = ?1
             ORDER BY path, filename",
            params![Status::Failed],
        )?;
        if records.is_empty() {
            info!("No failed conversions.");
        } else {
            info!("Found {} failed conversion(s).", records.len());
        }
        Ok(records)
    }

    pub fn select_all(&self) -> StoreResult<Vec<QueueRecord>> {
        self.select(
            "full selection",
            "SELECT path, filename, convert, status FROM queue ORDER BY path, filename",
            [],
        )
    }

    pub fn get(&self, path: &str, filename: &str) -> StoreResult<Option<QueueRecord>> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT path, filename, convert, status FROM queue
             WHERE path = ?1 AND filename = ?2",
            params![path, filename],
            record_from_row,
        )
        .optional()
        .map_err(StoreError::query("lookup"))
    }

    fn select<P: rusqlite::Params>(
        &self,
        operation: &'static str,
        sql: &str,
        params: P,
    ) -> StoreResult<Vec<QueueRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql).map_err(StoreError::query(operation))?;
        let rows = stmt
            .query_map(params, record_from_row)
            .map_err(StoreError::query(operation))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::query(operation))
    }

    /// Update a single record's status, returning the number of rows changed.
    pub fn try_update_status(
        &self,
        path: &str,
        filename: &str,
        status: Status,
    ) -> StoreResult<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(StoreError::query("status update"))?;
        let changed = tx
            .execute(
                "UPDATE queue SET status = ?1 WHERE path = ?2 AND filename = ?3",
                params![status, path, filename],
            )
            .map_err(StoreError::query("status update"))?;
        tx.commit().map_err(StoreError::query("status update"))?;
        Ok(changed)
    }

    /// Update a single record's status, logging instead of failing.
    ///
    /// A failed write leaves the stored status as it was; the caller carries on
    /// and the write is not retried.
    pub fn update_status(&self, path: &str, filename: &str, status: Status) -> bool {
        match self.try_update_status(path, filename, status) {
            Ok(0) => {
                warn!(
                    path,
                    filename,
                    status = %status,
                    "Status update matched no queue record."
                );
                false
            }
            Ok(_) => {
                info!("Updated status for '{}/{}' to '{}'.", path, filename, status);
                true
            }
            Err(e) => {
                error!(
                    path,
                    filename,
                    status = %status,
                    error = %e,
                    "Queue status update failed."
                );
                false
            }
        }
    }

    /// Number of records per status; every status is present, zero if unused.
    pub fn aggregate_by_status(&self) -> StoreResult<BTreeMap<Status, u64>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM queue GROUP BY status")
            .map_err(StoreError::query("status count"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, Status>(0)?, row.get::<_, i64>(1)?)))
            .map_err(StoreError::query("status count"))?;

        let mut counts: BTreeMap<Status, u64> = Status::ALL.iter().map(|s| (*s, 0)).collect();
        for row in rows {
            let (status, count) = row.map_err(StoreError::query("status count"))?;
            counts.insert(status, count.max(0) as u64);
        }
        Ok(counts)
    }

    /// Total number of records.
    pub fn count(&self) -> StoreResult<u64> {
        let conn = self.connect()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))
            .map_err(StoreError::query("count"))?;
        Ok(count.max(0) as u64)
    }
}

fn insert_row(conn: &Connection, record: &QueueRecord) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO queue (path, filename, convert, status) VALUES (?1, ?2, ?3, ?4)",
        params![record.path, record.filename, record.convert, record.status],
    )
    .map(|_| ())
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::DuplicateKey {
                path: record.path.clone(),
                filename: record.filename.clone(),
            }
        } else {
            StoreError::Query {
                operation: "insert",
                source: e,
            }
        }
    })
}

fn load_schema(schema_path: &Path) -> StoreResult<String> {
    match fs::read_to_string(schema_path) {
        Ok(schema) => Ok(schema),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StoreError::SchemaMissing(schema_path.to_path_buf()))
        }
        Err(source) => Err(StoreError::SchemaRead {
            path: schema_path.to_path_buf(),
            source,
        }),
    }
}
