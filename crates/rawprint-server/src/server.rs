// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw IP print listener -- lets Windows print servers and macOS/CUPS hosts
// print to us as if we were a JetDirect printer on port 9100.
//
// The accept loop waits at most `accept_timeout` per `accept()` so it can
// observe the stop flag; shutdown additionally wakes it through a `Notify`.
// Each accepted socket gets its own task (no pool, no limit): raw
// submissions are rare and one slow spooler must not hold up another.
//
// Shutdown never kills in-flight connections.  It stops admissions, closes
// the listening socket, then polls the active-request counter until it
// drops to zero.  Every handler is bounded by its own read timeout, so the
// wait is too.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use rawprint_core::config::ServerConfig;
use rawprint_core::error::{RawPrintError, Result};
use rawprint_core::types::ServerStatus;

use crate::connection::ConnectionHandler;
use crate::counters::RequestCounters;
use crate::services::Services;

/// Raw-socket print server.
///
/// Created `Stopped`; [`start`](Self::start) binds and begins accepting,
/// [`shutdown`](Self::shutdown) stops admissions and waits for active
/// connections to finish.
pub struct RawPrintServer {
    config: ServerConfig,
    services: Services,
    status: ServerStatus,
    counters: Arc<RequestCounters>,
    /// Stop flag, read by the accept loop on every iteration.
    stop: Arc<AtomicBool>,
    /// Wakes the accept loop early when the stop flag is raised.
    wake: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl RawPrintServer {
    pub fn new(config: ServerConfig, services: Services) -> Self {
        Self {
            config,
            services,
            status: ServerStatus::Stopped,
            counters: Arc::new(RequestCounters::new()),
            stop: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            task_handle: None,
            local_addr: None,
        }
    }

    /// The configured port (0 means "any"; see [`local_addr`](Self::local_addr)).
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// The address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    pub fn active_requests(&self) -> u32 {
        self.counters.active()
    }

    pub fn total_requests(&self) -> u64 {
        self.counters.total()
    }

    /// Bind the listening socket and spawn the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`RawPrintError::Config`] for unusable timer settings and
    /// [`RawPrintError::PrintServer`] if the address cannot be bound.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let (ServerStatus::Running, Some(addr)) = (self.status, self.local_addr) {
            debug!(addr = %addr, "raw print server already running");
            return Ok(addr);
        }
        self.config.validate()?;

        self.status = ServerStatus::Starting;

        let bind_addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.status = ServerStatus::Stopped;
                return Err(RawPrintError::PrintServer(format!("bind {bind_addr}: {e}")));
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|e| RawPrintError::PrintServer(format!("local address: {e}")))?;

        self.stop.store(false, Ordering::Release);

        let handler = Arc::new(ConnectionHandler::new(
            &self.config,
            self.services.clone(),
            Arc::clone(&self.stop),
        ));
        let accept_loop = AcceptLoop {
            listener,
            handler,
            counters: Arc::clone(&self.counters),
            stop: Arc::clone(&self.stop),
            wake: Arc::clone(&self.wake),
            accept_timeout: self.config.accept_timeout(),
        };
        self.task_handle = Some(tokio::spawn(accept_loop.run()));
        self.local_addr = Some(local_addr);
        self.status = ServerStatus::Running;

        info!(addr = %local_addr, "IP Print Server started on port {}", local_addr.port());
        Ok(local_addr)
    }

    /// Stop accepting and wait until every active connection has finished.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.shutdown_until(std::future::pending()).await.map(|_| ())
    }

    /// Like [`shutdown`](Self::shutdown), but gives up waiting for active
    /// connections once `interrupt` completes.
    ///
    /// Returns `Ok(true)` when all connections drained, `Ok(false)` when
    /// interrupted.  Interrupted connections keep running to completion in
    /// the background.
    pub async fn shutdown_until<F>(&mut self, interrupt: F) -> Result<bool>
    where
        F: Future<Output = ()>,
    {
        if self.status == ServerStatus::Stopped {
            return Ok(true);
        }

        info!(port = self.config.port, "stopping IP Print Server");
        self.status = ServerStatus::Stopping;
        self.stop.store(true, Ordering::Release);
        self.wake.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| RawPrintError::PrintServer(format!("accept loop join: {e}")))?;
        }
        self.local_addr = None;

        let drained = wait_for_idle(
            &self.counters,
            self.config.shutdown_poll_interval(),
            interrupt,
        )
        .await;

        self.status = ServerStatus::Stopped;
        info!(
            port = self.config.port,
            total_requests = self.counters.total(),
            "IP Print Server stopped"
        );
        Ok(drained)
    }
}

impl Drop for RawPrintServer {
    fn drop(&mut self) {
        if self.task_handle.is_some() {
            self.stop.store(true, Ordering::Release);
            self.wake.notify_one();
        }
    }
}

/// Poll `counters` until no request is active.  Returns `false` if
/// `interrupt` completes first.
async fn wait_for_idle<F>(counters: &RequestCounters, poll: Duration, interrupt: F) -> bool
where
    F: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    loop {
        let active = counters.active();
        if active == 0 {
            return true;
        }
        debug!(active, "waiting for active IP Print requests");
        tokio::select! {
            _ = &mut interrupt => {
                warn!(active, "IP Print Server is interrupted");
                return false;
            }
            _ = tokio::time::sleep(poll) => {}
        }
    }
}

/// State owned by the accept task.  The listening socket lives and dies here.
struct AcceptLoop {
    listener: TcpListener,
    handler: Arc<ConnectionHandler>,
    counters: Arc<RequestCounters>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    accept_timeout: Duration,
}

impl AcceptLoop {
    async fn run(self) {
        loop {
            if self.stop.load(Ordering::Acquire) {
                debug!("accept loop observed stop flag");
                break;
            }

            let accepted = tokio::select! {
                _ = self.wake.notified() => continue,
                accepted = tokio::time::timeout(self.accept_timeout, self.listener.accept()) => accepted,
            };

            match accepted {
                // Timeout tick: go round and re-check the stop flag.
                Err(_) => continue,
                Ok(Ok((stream, peer_addr))) => {
                    if self.stop.load(Ordering::Acquire) {
                        debug!(peer = %peer_addr, "connection refused: shutting down");
                        break;
                    }
                    let request = self.counters.start_request();
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        // Outcome is already logged and alerted by the handler.
                        let _ = handler.handle(stream, peer_addr.ip(), request).await;
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "accept failed; IP Print listener stops");
                    break;
                }
            }
        }
        debug!("IP Print listener closed");
    }
}
