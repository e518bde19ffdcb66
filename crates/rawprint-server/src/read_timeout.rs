// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-read timeout for async byte sources.
//
// Tokio sockets have no SO_TIMEOUT equivalent, so a stalled peer would park
// a connection task forever.  `ReadTimeout` arms a timer whenever a read
// returns `Pending` and fails the read with `ErrorKind::TimedOut` once the
// timer fires.  Any completed read disarms it, so the limit applies to each
// read individually rather than to the whole transfer.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Sleep;

/// Wraps a reader so that no single read can wait longer than `limit`.
#[derive(Debug)]
pub struct ReadTimeout<R> {
    inner: R,
    limit: Option<Duration>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<R> ReadTimeout<R> {
    /// `None` disables the limit.
    pub fn new(inner: R, limit: Option<Duration>) -> Self {
        Self {
            inner,
            limit,
            deadline: None,
        }
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ReadTimeout<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.deadline = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                let Some(limit) = this.limit else {
                    return Poll::Pending;
                };
                let deadline = this
                    .deadline
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep(limit)));
                match deadline.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        this.deadline = None;
                        Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("no data within {} msec", limit.as_millis()),
                        )))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

/// True when `err` was produced by an expired [`ReadTimeout`] (or by a
/// socket-level timeout, which surfaces the same way).
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
