// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Collaborator boundaries of the raw print server.
//
// The listener only parses, authorizes and forwards.  Persistence, user
// provisioning, conversion and alert delivery live behind these traits so
// that the daemon, tests and embedding applications can each plug in their
// own implementations.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use rawprint_core::error::{RawPrintError, Result};
use rawprint_core::types::{
    AlertLevel, DocumentType, IngestReceipt, Protocol, QueueId, SubmitterStatus,
};

/// Decides which client addresses may print to a queue.
pub trait QueueAccessControl: Send + Sync {
    fn has_client_ip_access(
        &self,
        queue: &QueueId,
        listener_uri: &str,
        client: IpAddr,
    ) -> Result<bool>;
}

/// Maps submitted user names onto canonical identities.
pub trait UserDirectory: Send + Sync {
    /// Case and alias normalisation of a raw `%%For:` value.
    fn normalize(&self, raw: &str) -> String;

    /// Resolve a normalised user, provisioning or activating the record if
    /// the directory does that.
    fn resolve_submitter(&self, user: &str) -> Result<SubmitterStatus>;
}

/// Looks up web sessions that were authenticated from a given address.
pub trait SessionIndex: Send + Sync {
    fn authenticated_user(&self, client: IpAddr) -> Option<String>;
}

/// Ingests accepted jobs.
#[async_trait]
pub trait DocumentPipeline: Send + Sync {
    /// Consume the complete job content.
    ///
    /// `content` yields the read-ahead header bytes followed by whatever the
    /// peer still sends.
    async fn process(
        &self,
        request: &PrintRequest,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<IngestReceipt>;

    /// Final, uniform judgement on a request once the socket work is done.
    /// Reports a deferred failure or a refused submitter the same way it
    /// would for any other ingestion protocol.
    fn evaluate_error_state(&self, request: &PrintRequest, authorized: bool);
}

/// Delivers human-readable failure notices to administrators.
pub trait AdminAlerts: Send + Sync {
    fn publish(&self, level: AlertLevel, message: &str);
}

/// The full set of collaborators a server needs.
#[derive(Clone)]
pub struct Services {
    pub access: Arc<dyn QueueAccessControl>,
    pub users: Arc<dyn UserDirectory>,
    pub sessions: Arc<dyn SessionIndex>,
    pub pipeline: Arc<dyn DocumentPipeline>,
    pub alerts: Arc<dyn AdminAlerts>,
}

/// A job on its way into the document pipeline.
#[derive(Debug)]
pub struct PrintRequest {
    pub queue: QueueId,
    /// Listener identity used for access checks, e.g. `RAW:9100`.
    pub listener_uri: String,
    pub originator_ip: IpAddr,
    pub title: String,
    /// User of an authenticated web session from the same address.
    pub session_user: Option<String>,
    /// Normalised `%%For:` user, once resolved.
    pub requesting_user: Option<String>,
    pub protocol: Protocol,
    pub document_type: DocumentType,
    deferred_error: Option<RawPrintError>,
}

impl PrintRequest {
    pub fn new(
        queue: QueueId,
        listener_uri: String,
        originator_ip: IpAddr,
        title: String,
        session_user: Option<String>,
    ) -> Self {
        Self {
            queue,
            listener_uri,
            originator_ip,
            title,
            session_user,
            requesting_user: None,
            protocol: Protocol::Raw,
            document_type: DocumentType::PostScript,
            deferred_error: None,
        }
    }

    /// Park a failure for [`DocumentPipeline::evaluate_error_state`].
    /// The first failure wins.
    pub fn set_deferred_error(&mut self, err: RawPrintError) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(err);
        }
    }

    pub fn deferred_error(&self) -> Option<&RawPrintError> {
        self.deferred_error.as_ref()
    }
}
