// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-connection handling.
//
// A connection is owned end to end by one task: bound every read, parse the
// header, dispatch, then always drain and close.  Draining matters more than
// it looks: a spooler whose socket is closed while it still has bytes to
// write reports a transport failure and resubmits the job, forever.  Reading
// the stream to its end makes every refusal look like a completed print.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::io::AsyncRead;
use tracing::{debug, error, info, trace, warn};

use rawprint_core::config::ServerConfig;
use rawprint_core::error::{RawPrintError, Result};
use rawprint_core::types::AlertLevel;

use crate::counters::ActiveRequest;
use crate::dispatch::{DispatchOutcome, dispatch};
use crate::header::{HeaderOutcome, parse_header, trace_header_lines};
use crate::line_reader::TeeLineReader;
use crate::read_timeout::{ReadTimeout, is_timeout};
use crate::services::Services;

/// Handles accepted connections.  One instance is shared by all tasks.
pub struct ConnectionHandler {
    services: Services,
    listener_uri: String,
    read_timeout: Option<Duration>,
    header_trace_lines: usize,
    header_limit: Option<usize>,
    /// Set while the owning server shuts down.
    stopping: Arc<AtomicBool>,
}

impl ConnectionHandler {
    pub fn new(config: &ServerConfig, services: Services, stopping: Arc<AtomicBool>) -> Self {
        let read_timeout = (config.read_timeout_ms > 0).then(|| config.read_timeout());
        Self {
            services,
            listener_uri: config.listener_uri(),
            read_timeout,
            header_trace_lines: config.header_trace_lines,
            header_limit: config.header_limit(),
            stopping,
        }
    }

    /// Run one connection to completion.
    ///
    /// `request` is the active-request slot taken at accept time; it is
    /// released after the stream has been drained and closed.  Failures are
    /// logged and, when appropriate, alerted here; the returned value is
    /// informational only.
    pub async fn handle<S>(
        &self,
        stream: S,
        peer: IpAddr,
        request: ActiveRequest,
    ) -> Result<Option<DispatchOutcome>>
    where
        S: AsyncRead + Unpin + Send,
    {
        let number = request.number();
        info!(request = number, peer = %peer, "request #{number} from [{peer}]");
        let started = Instant::now();

        let mut reader = TeeLineReader::with_limit(
            ReadTimeout::new(stream, self.read_timeout),
            self.header_limit,
        );
        let result = self.read_and_print(&mut reader, peer).await;

        // Drain whatever is left, then close.
        match tokio::io::copy(reader.remaining(), &mut tokio::io::sink()).await {
            Ok(0) => {}
            Ok(bytes) => trace!(peer = %peer, bytes, "drained unprocessed input"),
            Err(e) => trace!(peer = %peer, error = %e, "drain stopped"),
        }
        drop(reader);
        drop(request);

        if let Err(err) = &result {
            self.report(err, peer);
        }
        debug!(
            request = number,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request #{number} ended"
        );
        result
    }

    async fn read_and_print<S>(
        &self,
        reader: &mut TeeLineReader<ReadTimeout<S>>,
        peer: IpAddr,
    ) -> Result<Option<DispatchOutcome>>
    where
        S: AsyncRead + Unpin + Send,
    {
        let parsed = parse_header(reader, self.services.users.as_ref()).await;
        let outcome = match parsed {
            Ok(outcome) => outcome,
            Err(e) if is_timeout(&e) && reader.read_ahead().is_empty() => {
                return Err(RawPrintError::NoDataReceived {
                    peer,
                    timeout_ms: self.read_timeout.map_or(0, |t| t.as_millis() as u64),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let header = match outcome {
            HeaderOutcome::Empty => {
                trace!(peer = %peer, "no data from [{peer}]");
                return Ok(None);
            }
            HeaderOutcome::Rejected(rejection) => return Err(rejection.into_error(peer)),
            HeaderOutcome::Accepted(header) => header,
        };

        trace_header_lines(&header.header_lines, self.header_trace_lines);
        let user = header.user.clone();
        let started = Instant::now();

        let outcome = dispatch(
            &self.services,
            &self.listener_uri,
            peer,
            header,
            reader.remaining(),
        )
        .await?;

        debug!(
            peer = %peer,
            user = %user,
            outcome = ?outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "read and print finished"
        );
        Ok(Some(outcome))
    }

    /// Log a failed connection and raise an admin alert for it.
    ///
    /// During shutdown, interrupted sockets are expected; nothing is raised.
    fn report(&self, err: &RawPrintError, peer: IpAddr) {
        if self.stopping.load(Ordering::Acquire) {
            debug!(peer = %peer, error = %err, "connection failed during shutdown");
            return;
        }

        let message = match err {
            RawPrintError::NoDataReceived { .. }
            | RawPrintError::NotPostScript { .. }
            | RawPrintError::MissingHeaderFields { .. } => err.to_string(),
            _ => format!("{err} (IP Print from {peer})"),
        };

        if err.is_rejection() {
            warn!(peer = %peer, "{message}");
        } else {
            error!(peer = %peer, "{message}");
        }

        if err.is_alertable() {
            self.services.alerts.publish(AlertLevel::Error, &message);
        }
    }
}
