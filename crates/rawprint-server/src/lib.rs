// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rawprint Server: accepts print jobs pushed over a bare TCP socket
// (JetDirect style, port 9100), extracts the job title and submitting user
// from the PostScript header, authorizes the client and hands the stream to
// a document pipeline.  The pipeline, access control, user directory and
// alerting are collaborators supplied through the traits in `services`.

pub mod connection;
pub mod counters;
pub mod dispatch;
pub mod header;
pub mod line_reader;
pub mod read_timeout;
pub mod server;
pub mod services;

pub use counters::RequestCounters;
pub use header::{HeaderOutcome, Rejection};
pub use line_reader::TeeLineReader;
pub use read_timeout::ReadTimeout;
pub use server::RawPrintServer;
pub use services::{
    AdminAlerts, DocumentPipeline, PrintRequest, QueueAccessControl, Services, SessionIndex,
    UserDirectory,
};
