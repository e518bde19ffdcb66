// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Administrator alert log: append-only SQLite table of operator-facing
// failure notices.
//
// Schema:
//   alerts(
//     id        INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp TEXT    NOT NULL,   -- RFC 3339
//     level     TEXT    NOT NULL,   -- INFO | WARN | ERROR
//     message   TEXT    NOT NULL
//   )

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use rawprint_core::error::{RawPrintError, Result};
use rawprint_core::types::AlertLevel;
use rawprint_server::AdminAlerts;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS alerts (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT    NOT NULL,
        level     TEXT    NOT NULL,
        message   TEXT    NOT NULL
    );";

fn db_err(e: rusqlite::Error) -> RawPrintError {
    RawPrintError::Database(e.to_string())
}

/// A stored alert, used for queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub id: i64,
    pub timestamp: String,
    pub level: AlertLevel,
    pub message: String,
}

/// Alert log backed by a SQLite database.
///
/// The connection sits behind a mutex so the log can be shared between
/// connection tasks as an [`AdminAlerts`] collaborator.
pub struct AlertLog {
    conn: Mutex<Connection>,
}

impl AlertLog {
    /// Open (or create) the alert database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("alert log opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory alert database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory alert log opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store one alert.
    pub fn record(&self, level: AlertLevel, message: &str) -> Result<()> {
        let timestamp = Utc::now().to_rfc3339();
        let conn = self
            .conn
            .lock()
            .map_err(|_| RawPrintError::Database("alert log lock poisoned".into()))?;
        conn.execute(
            "INSERT INTO alerts (timestamp, level, message) VALUES (?1, ?2, ?3)",
            params![timestamp, level.as_str(), message],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// The most recent `limit` alerts, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<AlertEntry>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| RawPrintError::Database("alert log lock poisoned".into()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, level, message
                 FROM alerts
                 ORDER BY id DESC
                 LIMIT ?1",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![limit], |row| {
                let level: String = row.get(2)?;
                Ok(AlertEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    // Unknown levels can only come from a foreign writer.
                    level: AlertLevel::parse(&level).unwrap_or(AlertLevel::Error),
                    message: row.get(3)?,
                })
            })
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| RawPrintError::Database("alert log lock poisoned".into()))?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(n as u64)
    }
}

impl AdminAlerts for AlertLog {
    fn publish(&self, level: AlertLevel, message: &str) {
        match level {
            AlertLevel::Info => info!(alert = true, "{message}"),
            AlertLevel::Warn => warn!(alert = true, "{message}"),
            AlertLevel::Error => error!(alert = true, "{message}"),
        }
        if let Err(e) = self.record(level, message) {
            error!(error = %e, "could not store admin alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_alerts_are_stored_newest_first() {
        let log = AlertLog::open_in_memory().expect("open");
        log.publish(AlertLevel::Warn, "first");
        log.publish(AlertLevel::Error, "IP Print data from [192.0.2.1] is not PostScript. Header [GARBAGE]");

        let entries = log.recent(10).expect("recent");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, AlertLevel::Error);
        assert!(entries[0].message.contains("not PostScript"));
        assert_eq!(entries[1].message, "first");
        assert_eq!(log.count().expect("count"), 2);
    }

    #[test]
    fn recent_respects_limit() {
        let log = AlertLog::open_in_memory().expect("open");
        for i in 0..5 {
            log.record(AlertLevel::Info, &format!("alert {i}")).expect("record");
        }
        let entries = log.recent(3).expect("recent");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "alert 4");
    }

    #[test]
    fn file_backed_log_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("alerts.db");
        AlertLog::open(&path)
            .expect("open")
            .record(AlertLevel::Error, "disk full")
            .expect("record");

        let reopened = AlertLog::open(&path).expect("reopen");
        assert_eq!(reopened.recent(1).expect("recent")[0].message, "disk full");
    }
}
