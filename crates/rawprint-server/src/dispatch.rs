// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Authorization and hand-off of an accepted job to the document pipeline.

use std::io::Cursor;
use std::net::IpAddr;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use rawprint_core::error::Result;
use rawprint_core::types::{IngestReceipt, ParsedJobHeader, QueueId, SubmitterStatus};

use crate::services::{PrintRequest, Services};

/// How a dispatched job ended, as seen from the socket layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The client address may not print to the raw queue.  No job exists.
    Denied,
    /// The submitting user is unknown or disabled.
    Refused,
    /// The pipeline ingested the job.
    Ingested(IngestReceipt),
    /// A failure was parked on the request for the pipeline to report.
    Deferred,
}

/// Authorize `peer` and forward the job.
///
/// The pipeline receives `header.raw_header_bytes` followed by the unread
/// remainder of `live`.  Failures after the access check are attached to
/// the request as a deferred error and judged by the pipeline, never
/// returned.  Only a failing access check itself comes back as `Err`.
pub async fn dispatch<S>(
    services: &Services,
    listener_uri: &str,
    peer: IpAddr,
    header: ParsedJobHeader,
    live: &mut S,
) -> Result<DispatchOutcome>
where
    S: AsyncRead + Unpin + Send,
{
    debug_assert!(header.is_dispatchable(), "dispatching an incomplete header");
    let queue = QueueId::raw_print();

    if !services
        .access
        .has_client_ip_access(&queue, listener_uri, peer)?
    {
        debug!(peer = %peer, queue = %queue, "client not allowed on queue");
        return Ok(DispatchOutcome::Denied);
    }

    let session_user = services.sessions.authenticated_user(peer);
    let mut request = PrintRequest::new(
        queue,
        listener_uri.to_owned(),
        peer,
        header.title,
        session_user,
    );

    let mut authorized = false;
    let outcome = match forward(
        services,
        &mut request,
        &mut authorized,
        header.user,
        header.raw_header_bytes,
        live,
    )
    .await
    {
        Ok(Some(receipt)) => {
            info!(
                peer = %peer,
                job_id = %receipt.job_id,
                bytes = receipt.size_bytes,
                title = %request.title,
                "raw print job ingested"
            );
            DispatchOutcome::Ingested(receipt)
        }
        Ok(None) => DispatchOutcome::Refused,
        Err(e) => {
            request.set_deferred_error(e);
            DispatchOutcome::Deferred
        }
    };

    services.pipeline.evaluate_error_state(&request, authorized);
    Ok(outcome)
}

/// Resolve the submitter and, if allowed, stream the job.
///
/// `authorized` is set as soon as the user check passes, so a pipeline
/// failure is still judged as an authorized request.
async fn forward<S>(
    services: &Services,
    request: &mut PrintRequest,
    authorized: &mut bool,
    user: String,
    read_ahead: Vec<u8>,
    live: &mut S,
) -> Result<Option<IngestReceipt>>
where
    S: AsyncRead + Unpin + Send,
{
    let status = services.users.resolve_submitter(&user)?;
    request.requesting_user = Some(user);

    if status != SubmitterStatus::Authorized {
        debug!(
            peer = %request.originator_ip,
            user = ?request.requesting_user,
            status = ?status,
            "submitter not authorized"
        );
        return Ok(None);
    }
    *authorized = true;

    let mut content = Cursor::new(read_ahead).chain(live);
    let receipt = services.pipeline.process(request, &mut content).await?;
    Ok(Some(receipt))
}
