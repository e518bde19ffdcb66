// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rawprint Spool: self-contained collaborators for the raw print server.
// Jobs are spooled to disk and recorded in SQLite, alerts go to a second
// SQLite log, and access, users and sessions are driven by configuration.

pub mod access;
pub mod alerts;
pub mod pipeline;
pub mod queue;
pub mod sessions;
pub mod users;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;

use rawprint_core::config::SpoolConfig;
use rawprint_core::error::Result;
use rawprint_server::Services;

pub use access::IpAllowList;
pub use alerts::{AlertEntry, AlertLog};
pub use pipeline::SpoolPipeline;
pub use queue::JobQueue;
pub use sessions::SessionTable;
pub use users::ConfigUserDirectory;

/// File names inside the data directory.
pub const JOBS_DB: &str = "jobs.db";
pub const ALERTS_DB: &str = "alerts.db";
pub const SPOOL_DIR: &str = "spool";

/// Every spool collaborator, opened against one data directory.
pub struct Spool {
    pub jobs: Arc<Mutex<JobQueue>>,
    pub alerts: Arc<AlertLog>,
    pub sessions: Arc<SessionTable>,
    services: Services,
    spool_dir: PathBuf,
}

impl Spool {
    /// Open (or create) `jobs.db`, `alerts.db` and `spool/` under `data_dir`.
    pub fn open(data_dir: &Path, config: &SpoolConfig) -> Result<Self> {
        let jobs = Arc::new(Mutex::new(JobQueue::open(data_dir.join(JOBS_DB))?));
        let alerts = Arc::new(AlertLog::open(data_dir.join(ALERTS_DB))?);
        Self::assemble(jobs, alerts, data_dir.join(SPOOL_DIR), config)
    }

    /// In-memory databases with documents spooled under `spool_dir`.
    pub fn open_in_memory(spool_dir: &Path, config: &SpoolConfig) -> Result<Self> {
        let jobs = Arc::new(Mutex::new(JobQueue::open_in_memory()?));
        let alerts = Arc::new(AlertLog::open_in_memory()?);
        Self::assemble(jobs, alerts, spool_dir.to_path_buf(), config)
    }

    fn assemble(
        jobs: Arc<Mutex<JobQueue>>,
        alerts: Arc<AlertLog>,
        spool_dir: PathBuf,
        config: &SpoolConfig,
    ) -> Result<Self> {
        let access = IpAllowList::from_entries(&config.allowed_clients)?;
        if access.allows_all() {
            info!("no client allow-list configured; every address may print");
        }
        let sessions = Arc::new(SessionTable::default());
        let pipeline = SpoolPipeline::new(
            spool_dir.clone(),
            config.max_job_bytes,
            Arc::clone(&jobs),
            alerts.clone(),
        )?;

        let services = Services {
            access: Arc::new(access),
            users: Arc::new(ConfigUserDirectory::from_config(config)),
            sessions: sessions.clone(),
            pipeline: Arc::new(pipeline),
            alerts: alerts.clone(),
        };

        Ok(Self {
            jobs,
            alerts,
            sessions,
            services,
            spool_dir,
        })
    }

    /// The collaborator bundle to hand to the server.
    pub fn services(&self) -> Services {
        self.services.clone()
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawprint_core::types::ParsedJobHeader;
    use rawprint_server::dispatch::{DispatchOutcome, dispatch};

    fn header(user: &str) -> ParsedJobHeader {
        ParsedJobHeader {
            title: "Minutes".into(),
            user: user.into(),
            raw_header_bytes: b"%!PS-Adobe-3.0\n%%Title: (Minutes)\n".to_vec(),
            is_postscript: true,
            header_lines: Vec::new(),
        }
    }

    #[tokio::test]
    async fn dispatched_job_lands_in_spool_and_ledger() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spool = Spool::open(dir.path(), &SpoolConfig::default()).expect("open");
        let peer = "192.0.2.9".parse().unwrap();
        spool.sessions.login(peer, "carol");
        let mut live: &[u8] = b"%%BeginProlog\nshowpage\n";

        let outcome = dispatch(&spool.services(), "RAW:9100", peer, header("carol"), &mut live)
            .await
            .expect("dispatch");

        let receipt = match outcome {
            DispatchOutcome::Ingested(receipt) => receipt,
            other => panic!("expected ingestion, got {other:?}"),
        };
        let job = spool
            .jobs
            .lock()
            .unwrap()
            .get_job(&receipt.job_id)
            .expect("get")
            .expect("recorded");
        assert_eq!(job.session_user.as_deref(), Some("carol"));
        assert_eq!(
            std::fs::read(&job.spool_path).expect("spooled"),
            b"%!PS-Adobe-3.0\n%%Title: (Minutes)\n%%BeginProlog\nshowpage\n"
        );
        assert!(dir.path().join(JOBS_DB).exists());
        assert!(dir.path().join(ALERTS_DB).exists());
    }

    #[tokio::test]
    async fn allow_list_and_block_list_come_from_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SpoolConfig {
            allowed_clients: vec!["10.0.0.0/8".into()],
            blocked_users: vec!["mallory".into()],
            ..SpoolConfig::default()
        };
        let spool = Spool::open_in_memory(dir.path(), &config).expect("open");

        let mut live: &[u8] = b"";
        let outside = dispatch(
            &spool.services(),
            "RAW:9100",
            "192.0.2.9".parse().unwrap(),
            header("carol"),
            &mut live,
        )
        .await
        .expect("dispatch");
        assert_eq!(outside, DispatchOutcome::Denied);

        let blocked = dispatch(
            &spool.services(),
            "RAW:9100",
            "10.1.2.3".parse().unwrap(),
            header("mallory"),
            &mut live,
        )
        .await
        .expect("dispatch");
        assert_eq!(blocked, DispatchOutcome::Refused);
        assert_eq!(spool.jobs.lock().unwrap().count().unwrap(), 0);
        assert_eq!(spool.alerts.count().unwrap(), 0);
    }

    #[test]
    fn bad_allow_list_fails_startup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SpoolConfig {
            allowed_clients: vec!["not-an-address".into()],
            ..SpoolConfig::default()
        };
        assert!(Spool::open_in_memory(dir.path(), &config).is_err());
    }
}
