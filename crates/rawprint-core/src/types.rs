// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the raw print server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for an ingested print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a logical print queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueId(pub String);

impl QueueId {
    /// URL path of the reserved queue bound to the raw-socket listener.
    pub const RAW_PRINT: &'static str = "raw";

    /// The reserved queue every raw-socket job lands in.
    pub fn raw_print() -> Self {
        Self(Self::RAW_PRINT.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport a job was submitted over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Protocol {
    /// Bare TCP stream (JetDirect, port 9100).
    Raw,
}

/// Page-description language of the submitted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DocumentType {
    PostScript,
}

impl DocumentType {
    /// File extension used for spooled content.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::PostScript => "ps",
        }
    }
}

/// Severity attached to an admin alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warn,
    Error,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Self::Info),
            "WARN" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Job metadata extracted from the document-structuring comments at the
/// start of a PostScript stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedJobHeader {
    /// Parenthesis-stripped value of `%%Title:`.
    pub title: String,
    /// Parenthesis-stripped value of `%%For:`, normalised by the user directory.
    pub user: String,
    /// Every byte consumed from the socket while parsing, PJL preamble included.
    /// Must be replayed in front of the live stream.
    pub raw_header_bytes: Vec<u8>,
    pub is_postscript: bool,
    /// Header lines retained from the signature line onward (trace only).
    pub header_lines: Vec<String>,
}

impl ParsedJobHeader {
    /// Whether this header may be handed to dispatch.
    pub fn is_dispatchable(&self) -> bool {
        self.is_postscript && !self.title.is_empty() && !self.user.is_empty()
    }
}

/// Outcome of resolving a submitting user against the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitterStatus {
    /// Known (or auto-provisioned) and allowed to print.
    Authorized,
    /// Not known to the directory.
    Unknown,
    /// Known but barred from printing.
    Disabled,
}

/// Persisted record of a job accepted through the raw-socket listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPrintJob {
    pub id: JobId,
    pub queue: QueueId,
    pub originator_ip: IpAddr,
    pub title: String,
    pub user: String,
    /// User of an authenticated web session from the same IP, if any.
    pub session_user: Option<String>,
    pub protocol: Protocol,
    pub document_type: DocumentType,
    /// Total bytes ingested, read-ahead prefix included.
    pub size_bytes: u64,
    /// SHA-256 hex digest of the ingested content.
    pub document_hash: String,
    pub spool_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// What the document pipeline reports back after ingesting a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    pub job_id: JobId,
    pub size_bytes: u64,
    pub document_hash: String,
}

/// Lifecycle of the raw print listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    /// No longer accepting; waiting for in-flight connections to finish.
    Stopping,
}
