// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent record of ingested raw print jobs, backed by SQLite.
//
// Only metadata lives here.  The PostScript itself sits in the spool
// directory and is referenced by path and SHA-256 hash.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument};

use rawprint_core::error::{RawPrintError, Result};
use rawprint_core::types::{DocumentType, JobId, Protocol, QueueId, RawPrintJob};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS raw_jobs (
        id TEXT PRIMARY KEY,
        queue TEXT NOT NULL,
        originator_ip TEXT NOT NULL,
        title TEXT NOT NULL,
        user TEXT NOT NULL,
        session_user TEXT,
        protocol TEXT NOT NULL,
        document_type TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        document_hash TEXT NOT NULL,
        spool_path TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS raw_jobs_created_at ON raw_jobs (created_at);
"#;

const SELECT_COLUMNS: &str = "SELECT id, queue, originator_ip, title, user, session_user, \
     protocol, document_type, size_bytes, document_hash, spool_path, created_at FROM raw_jobs";

fn db_err(context: &str, e: rusqlite::Error) -> RawPrintError {
    RawPrintError::Database(format!("{context}: {e}"))
}

/// Job ledger backed by a SQLite database.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively.  In an async context, wrap calls in `tokio::task::spawn_blocking`.
pub struct JobQueue {
    conn: Connection,
}

impl JobQueue {
    /// Open (or create) the job database at `path`, in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| db_err("open", e))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| db_err("WAL pragma", e))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| db_err("create table", e))?;

        info!("job queue database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_err("open in-memory", e))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| db_err("create table", e))?;

        debug!("in-memory job queue database opened");
        Ok(Self { conn })
    }

    /// Record a newly ingested job.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn insert_job(&self, job: &RawPrintJob) -> Result<()> {
        let protocol_json = serde_json::to_string(&job.protocol)?;
        let doc_type_json = serde_json::to_string(&job.document_type)?;

        self.conn
            .execute(
                "INSERT INTO raw_jobs (id, queue, originator_ip, title, user, session_user,
                 protocol, document_type, size_bytes, document_hash, spool_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    job.id.to_string(),
                    job.queue.as_str(),
                    job.originator_ip.to_string(),
                    job.title,
                    job.user,
                    job.session_user,
                    protocol_json,
                    doc_type_json,
                    job.size_bytes as i64,
                    job.document_hash,
                    job.spool_path.to_string_lossy().into_owned(),
                    job.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| db_err("insert job", e))?;

        debug!(job_id = %job.id, "job recorded");
        Ok(())
    }

    /// Retrieve a single job by its ID.  Returns `None` if it does not exist.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn get_job(&self, job_id: &JobId) -> Result<Option<RawPrintJob>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .map_err(|e| db_err("prepare get_job", e))?;

        let mut rows = stmt
            .query_map(params![job_id.to_string()], row_to_job)
            .map_err(|e| db_err("query get_job", e))?;

        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(db_err("row parse", e)),
            None => Ok(None),
        }
    }

    /// The most recent `limit` jobs, newest first.
    pub fn recent_jobs(&self, limit: u32) -> Result<Vec<RawPrintJob>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC LIMIT ?1"))
            .map_err(|e| db_err("prepare recent_jobs", e))?;

        stmt.query_map(params![limit], row_to_job)
            .map_err(|e| db_err("query recent_jobs", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("collect rows", e))
    }

    /// Every job submitted by `user`, oldest first.
    pub fn jobs_for_user(&self, user: &str) -> Result<Vec<RawPrintJob>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE user = ?1 ORDER BY created_at ASC"))
            .map_err(|e| db_err("prepare jobs_for_user", e))?;

        stmt.query_map(params![user], row_to_job)
            .map_err(|e| db_err("query jobs_for_user", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("collect rows", e))
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM raw_jobs", [], |row| row.get(0))
            .map_err(|e| db_err("count", e))?;
        Ok(n as u64)
    }
}

fn conversion_err<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e))
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPrintJob> {
    let id_str: String = row.get(0)?;
    let queue: String = row.get(1)?;
    let ip_str: String = row.get(2)?;
    let protocol_json: String = row.get(6)?;
    let doc_type_json: String = row.get(7)?;
    let spool_path: String = row.get(10)?;
    let created_at_str: String = row.get(11)?;

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| conversion_err(0, e))?;
    let originator_ip: IpAddr = ip_str.parse().map_err(|e| conversion_err(2, e))?;
    let protocol: Protocol =
        serde_json::from_str(&protocol_json).map_err(|e| conversion_err(6, e))?;
    let document_type: DocumentType =
        serde_json::from_str(&doc_type_json).map_err(|e| conversion_err(7, e))?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(11, e))?;

    Ok(RawPrintJob {
        id: JobId(uuid),
        queue: QueueId(queue),
        originator_ip,
        title: row.get(3)?,
        user: row.get(4)?,
        session_user: row.get(5)?,
        protocol,
        document_type,
        size_bytes: row.get::<_, i64>(8)? as u64,
        document_hash: row.get(9)?,
        spool_path: PathBuf::from(spool_path),
        created_at,
    })
}
