// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spool-to-disk document pipeline.
//
// Each accepted job is streamed into `<spool>/<job-id>.ps` while its SHA-256
// is computed on the fly, then recorded in the job queue.  A job that fails
// half way leaves no file and no row behind.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use rawprint_core::error::{RawPrintError, Result};
use rawprint_core::types::{AlertLevel, IngestReceipt, JobId, RawPrintJob};
use rawprint_server::{AdminAlerts, DocumentPipeline, PrintRequest};

use crate::queue::JobQueue;

const COPY_BUF_LEN: usize = 64 * 1024;

fn spool_err(path: &Path, e: std::io::Error) -> RawPrintError {
    RawPrintError::Downstream(format!("spool file {}: {e}", path.display()))
}

/// Writes jobs to the spool directory and records them in a [`JobQueue`].
pub struct SpoolPipeline {
    spool_dir: PathBuf,
    /// 0 means unlimited.
    max_job_bytes: u64,
    queue: Arc<Mutex<JobQueue>>,
    alerts: Arc<dyn AdminAlerts>,
}

impl SpoolPipeline {
    /// Create the pipeline, creating `spool_dir` if needed.
    pub fn new(
        spool_dir: impl Into<PathBuf>,
        max_job_bytes: u64,
        queue: Arc<Mutex<JobQueue>>,
        alerts: Arc<dyn AdminAlerts>,
    ) -> Result<Self> {
        let spool_dir = spool_dir.into();
        std::fs::create_dir_all(&spool_dir).map_err(|e| spool_err(&spool_dir, e))?;
        Ok(Self {
            spool_dir,
            max_job_bytes,
            queue,
            alerts,
        })
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    /// Copy `content` into `path`.  Returns the byte count and hex digest.
    async fn spool(
        &self,
        content: &mut (dyn AsyncRead + Unpin + Send),
        path: &Path,
    ) -> Result<(u64, String)> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| spool_err(path, e))?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUF_LEN];
        let mut total: u64 = 0;

        loop {
            // Peer errors (resets, read timeouts) stay transport errors.
            let n = content.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if self.max_job_bytes > 0 && total > self.max_job_bytes {
                return Err(RawPrintError::Downstream(format!(
                    "job exceeds the limit of {} bytes",
                    self.max_job_bytes
                )));
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n])
                .await
                .map_err(|e| spool_err(path, e))?;
        }

        file.flush().await.map_err(|e| spool_err(path, e))?;
        file.sync_data().await.map_err(|e| spool_err(path, e))?;
        Ok((total, hex::encode(hasher.finalize())))
    }

    async fn record(&self, job: RawPrintJob) -> Result<()> {
        let queue = Arc::clone(&self.queue);
        tokio::task::spawn_blocking(move || {
            let queue = queue
                .lock()
                .map_err(|_| RawPrintError::Database("job queue lock poisoned".into()))?;
            queue.insert_job(&job)
        })
        .await
        .map_err(|e| RawPrintError::Downstream(format!("job queue task: {e}")))?
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "could not remove partial spool file");
    }
}

#[async_trait]
impl DocumentPipeline for SpoolPipeline {
    #[instrument(skip_all, fields(peer = %request.originator_ip, title = %request.title))]
    async fn process(
        &self,
        request: &PrintRequest,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<IngestReceipt> {
        let user = request
            .requesting_user
            .clone()
            .ok_or_else(|| RawPrintError::Downstream("job has no resolved user".into()))?;

        let job_id = JobId::new();
        let path = self
            .spool_dir
            .join(format!("{job_id}.{}", request.document_type.extension()));

        let (size_bytes, document_hash) = match self.spool(content, &path).await {
            Ok(spooled) => spooled,
            Err(e) => {
                discard(&path).await;
                return Err(e);
            }
        };

        let job = RawPrintJob {
            id: job_id,
            queue: request.queue.clone(),
            originator_ip: request.originator_ip,
            title: request.title.clone(),
            user,
            session_user: request.session_user.clone(),
            protocol: request.protocol,
            document_type: request.document_type,
            size_bytes,
            document_hash: document_hash.clone(),
            spool_path: path.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.record(job).await {
            discard(&path).await;
            return Err(e);
        }

        debug!(%job_id, size_bytes, hash = %document_hash, "job spooled");
        Ok(IngestReceipt {
            job_id,
            size_bytes,
            document_hash,
        })
    }

    fn evaluate_error_state(&self, request: &PrintRequest, authorized: bool) {
        let peer: IpAddr = request.originator_ip;
        if let Some(err) = request.deferred_error() {
            self.alerts
                .publish(AlertLevel::Error, &format!("{err} (IP Print from {peer})"));
        } else if !authorized {
            info!(
                %peer,
                user = request.requesting_user.as_deref().unwrap_or(""),
                title = %request.title,
                "raw print job refused: user not authorized"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawprint_core::types::QueueId;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// SHA-256("hello"), verified against coreutils sha256sum.
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[derive(Default)]
    struct RecordingAlerts(Mutex<Vec<(AlertLevel, String)>>);

    impl AdminAlerts for RecordingAlerts {
        fn publish(&self, level: AlertLevel, message: &str) {
            self.0.lock().unwrap().push((level, message.to_owned()));
        }
    }

    /// Reader whose peer vanishes after the first chunk.
    struct ResetAfter(Option<&'static [u8]>);

    impl AsyncRead for ResetAfter {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.0.take() {
                Some(chunk) => {
                    buf.put_slice(chunk);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::ErrorKind::ConnectionReset.into())),
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        pipeline: SpoolPipeline,
        queue: Arc<Mutex<JobQueue>>,
        alerts: Arc<RecordingAlerts>,
    }

    fn fixture(max_job_bytes: u64) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = Arc::new(Mutex::new(JobQueue::open_in_memory().expect("queue")));
        let alerts = Arc::new(RecordingAlerts::default());
        let pipeline = SpoolPipeline::new(
            dir.path().join("spool"),
            max_job_bytes,
            Arc::clone(&queue),
            alerts.clone(),
        )
        .expect("pipeline");
        Fixture {
            _dir: dir,
            pipeline,
            queue,
            alerts,
        }
    }

    fn request() -> PrintRequest {
        let mut request = PrintRequest::new(
            QueueId::raw_print(),
            "RAW:9100".into(),
            "192.0.2.44".parse().unwrap(),
            "Report".into(),
            Some("web-alice".into()),
        );
        request.requesting_user = Some("alice".into());
        request
    }

    fn spool_entries(fx: &Fixture) -> usize {
        std::fs::read_dir(fx.pipeline.spool_dir()).expect("read_dir").count()
    }

    #[tokio::test]
    async fn job_is_spooled_hashed_and_recorded() {
        let fx = fixture(0);
        let mut content: &[u8] = b"hello";

        let receipt = fx
            .pipeline
            .process(&request(), &mut content)
            .await
            .expect("process");
        assert_eq!(receipt.size_bytes, 5);
        assert_eq!(receipt.document_hash, HELLO_SHA256);

        let job = fx
            .queue
            .lock()
            .unwrap()
            .get_job(&receipt.job_id)
            .expect("get")
            .expect("recorded");
        assert_eq!(job.user, "alice");
        assert_eq!(job.session_user.as_deref(), Some("web-alice"));
        assert_eq!(job.title, "Report");
        assert_eq!(job.document_hash, HELLO_SHA256);
        assert_eq!(std::fs::read(&job.spool_path).expect("spool file"), b"hello");
        assert!(job.spool_path.to_string_lossy().ends_with(".ps"));
    }

    #[tokio::test]
    async fn oversized_job_leaves_nothing_behind() {
        let fx = fixture(8);
        let mut content: &[u8] = b"0123456789abcdef";

        let err = fx
            .pipeline
            .process(&request(), &mut content)
            .await
            .expect_err("over limit");
        assert!(matches!(err, RawPrintError::Downstream(_)));
        assert_eq!(spool_entries(&fx), 0);
        assert_eq!(fx.queue.lock().unwrap().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn peer_reset_mid_job_is_a_transport_error() {
        let fx = fixture(0);
        let mut content = ResetAfter(Some(b"%!PS-Adobe-3.0\n"));

        let err = fx
            .pipeline
            .process(&request(), &mut content)
            .await
            .expect_err("reset");
        assert!(matches!(err, RawPrintError::Transport(_)));
        assert_eq!(spool_entries(&fx), 0);
    }

    #[tokio::test]
    async fn unresolved_user_is_rejected() {
        let fx = fixture(0);
        let mut request = request();
        request.requesting_user = None;
        let mut content: &[u8] = b"hello";

        let err = fx
            .pipeline
            .process(&request, &mut content)
            .await
            .expect_err("no user");
        assert!(matches!(err, RawPrintError::Downstream(_)));
    }

    #[test]
    fn deferred_error_is_published_as_alert() {
        let fx = fixture(0);
        let mut request = request();
        request.set_deferred_error(RawPrintError::Downstream("disk full".into()));

        fx.pipeline.evaluate_error_state(&request, true);

        let alerts = fx.alerts.0.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, AlertLevel::Error);
        assert_eq!(
            alerts[0].1,
            "document pipeline failure: disk full (IP Print from 192.0.2.44)"
        );
    }

    #[test]
    fn clean_or_refused_requests_raise_no_alert() {
        let fx = fixture(0);
        fx.pipeline.evaluate_error_state(&request(), true);
        fx.pipeline.evaluate_error_state(&request(), false);
        assert!(fx.alerts.0.lock().unwrap().is_empty());
    }
}
