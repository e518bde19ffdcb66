// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RawPrintError, Result};

/// Default listening port (HP JetDirect).
pub const DEFAULT_PORT: u16 = 9100;

/// Listener and connection-handling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_address: IpAddr,
    /// TCP port to listen on (default 9100).
    pub port: u16,
    /// Maximum wait for any single socket read.
    pub read_timeout_ms: u64,
    /// How long one `accept()` may block before the stop flag is re-checked.
    pub accept_timeout_ms: u64,
    /// Poll interval while shutdown waits for active requests to drain.
    pub shutdown_poll_ms: u64,
    /// Number of retained header lines dumped at trace level.
    pub header_trace_lines: usize,
    /// Most bytes the header parser may buffer before it gives up on a
    /// stream; 0 disables the limit.
    pub max_header_bytes: usize,
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms)
    }

    /// `None` when the header buffer is unbounded.
    pub fn header_limit(&self) -> Option<usize> {
        (self.max_header_bytes > 0).then_some(self.max_header_bytes)
    }

    /// Reject settings the listener cannot run with.
    ///
    /// A zero accept timeout or shutdown poll interval would turn the accept
    /// loop or the shutdown wait into a busy spin.
    pub fn validate(&self) -> Result<()> {
        if self.accept_timeout_ms == 0 {
            return Err(RawPrintError::Config(
                "server.accept_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.shutdown_poll_ms == 0 {
            return Err(RawPrintError::Config(
                "server.shutdown_poll_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// URI identifying this listener to queue access control.
    pub fn listener_uri(&self) -> String {
        format!("RAW:{}", self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            read_timeout_ms: 5_000,
            accept_timeout_ms: 2_000,
            shutdown_poll_ms: 1_000,
            header_trace_lines: 30,
            max_header_bytes: 256 * 1024,
        }
    }
}

/// Settings for the bundled spool collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolConfig {
    /// Largest accepted job in bytes; 0 disables the limit.
    pub max_job_bytes: u64,
    /// Client addresses or CIDR blocks allowed to print.  Empty allows all.
    pub allowed_clients: Vec<String>,
    /// Submitted user name (after normalisation) to canonical user name.
    pub user_aliases: HashMap<String, String>,
    /// Canonical user names that may not print.
    pub blocked_users: Vec<String>,
    /// Strip `DOMAIN\` prefixes and `@realm` suffixes from submitted names.
    pub strip_domain: bool,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            max_job_bytes: 256 * 1024 * 1024,
            allowed_clients: Vec::new(),
            user_aliases: HashMap::new(),
            blocked_users: Vec::new(),
            strip_domain: true,
        }
    }
}

/// Persistent application settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub spool: SpoolConfig,
}

impl AppConfig {
    /// Read a JSON configuration file.  Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| RawPrintError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&data)?;
        config.server.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
