// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process-wide request counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Total and in-flight request counts.  Never reset while the server lives.
#[derive(Debug, Default)]
pub struct RequestCounters {
    total: AtomicU64,
    active: AtomicU32,
}

impl RequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a newly accepted connection.
    ///
    /// The returned guard keeps the connection counted as active until it
    /// is dropped, so a handler that returns early or panics still releases
    /// its slot.
    pub fn start_request(self: &Arc<Self>) -> ActiveRequest {
        let number = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        self.active.fetch_add(1, Ordering::AcqRel);
        ActiveRequest {
            counters: Arc::clone(self),
            number,
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u32 {
        self.active.load(Ordering::Acquire)
    }
}

/// One connection between "accepted" and "closed".
#[derive(Debug)]
pub struct ActiveRequest {
    counters: Arc<RequestCounters>,
    number: u64,
}

impl ActiveRequest {
    /// Sequence number of this request since server start (1-based).
    pub fn number(&self) -> u64 {
        self.number
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
    }
}
