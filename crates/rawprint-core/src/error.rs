// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the raw print server.

use std::net::IpAddr;

use thiserror::Error;

/// Top-level error type for all raw print operations.
#[derive(Debug, Error)]
pub enum RawPrintError {
    // -- Ingestion rejections --
    #[error("no IP Print data received from [{peer}] within [{timeout_ms}] msec")]
    NoDataReceived { peer: IpAddr, timeout_ms: u64 },

    #[error("IP Print data from [{peer}] is not PostScript. Header [{snippet}]")]
    NotPostScript { peer: IpAddr, snippet: String },

    #[error("IP Print job from [{peer}] has no [%%Title: ] and/or [%%For: ]")]
    MissingHeaderFields { peer: IpAddr },

    // -- Collaborators --
    #[error("document pipeline failure: {0}")]
    Downstream(String),

    // -- Transport --
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("print server error: {0}")]
    PrintServer(String),

    // -- Storage / configuration --
    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RawPrintError {
    /// Whether this failure is reported to the admin alerting channel.
    ///
    /// A peer that connects and stays silent is a probe or keepalive, not
    /// something an administrator can act upon.
    pub fn is_alertable(&self) -> bool {
        !matches!(self, Self::NoDataReceived { .. })
    }

    /// Whether this failure is a refusal of the submitted content, as
    /// opposed to a fault on our side or in the transport.
    ///
    /// Rejections are logged at `warn`, everything else at `error`.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NoDataReceived { .. } | Self::NotPostScript { .. }
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RawPrintError>;

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 7));

    #[test]
    fn silent_peer_is_not_alerted() {
        let err = RawPrintError::NoDataReceived {
            peer: PEER,
            timeout_ms: 5000,
        };
        assert!(!err.is_alertable());
        assert!(err.is_rejection());
        assert_eq!(
            err.to_string(),
            "no IP Print data received from [10.0.0.7] within [5000] msec"
        );
    }

    #[test]
    fn not_postscript_carries_snippet() {
        let err = RawPrintError::NotPostScript {
            peer: PEER,
            snippet: "GARBAGE".into(),
        };
        assert!(err.is_alertable());
        assert!(err.to_string().ends_with("Header [GARBAGE]"));
    }

    #[test]
    fn missing_fields_is_an_io_class_failure() {
        let err = RawPrintError::MissingHeaderFields { peer: PEER };
        assert!(err.is_alertable());
        assert!(!err.is_rejection());
    }

    #[test]
    fn io_errors_convert_to_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: RawPrintError = io.into();
        assert!(matches!(err, RawPrintError::Transport(_)));
        assert!(err.is_alertable());
    }
}
