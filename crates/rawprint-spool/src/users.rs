// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Config-driven user directory: name normalisation, aliases, block list.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use rawprint_core::config::SpoolConfig;
use rawprint_core::error::Result;
use rawprint_core::types::SubmitterStatus;
use rawprint_server::UserDirectory;

/// Resolves spooler-supplied user names against the spool configuration.
///
/// Windows spoolers send `DOMAIN\user`, Kerberos hosts `user@REALM`, and
/// both vary the case.  Names are reduced to a lowercase account name and
/// then mapped through the alias table.
#[derive(Debug, Clone, Default)]
pub struct ConfigUserDirectory {
    aliases: HashMap<String, String>,
    blocked: HashSet<String>,
    strip_domain: bool,
}

impl ConfigUserDirectory {
    pub fn from_config(config: &SpoolConfig) -> Self {
        Self {
            aliases: config
                .user_aliases
                .iter()
                .map(|(from, to)| (from.trim().to_lowercase(), to.trim().to_lowercase()))
                .collect(),
            blocked: config
                .blocked_users
                .iter()
                .map(|u| u.trim().to_lowercase())
                .collect(),
            strip_domain: config.strip_domain,
        }
    }
}

fn account_name(raw: &str) -> &str {
    let name = raw.rsplit_once('\\').map_or(raw, |(_, user)| user);
    name.split_once('@').map_or(name, |(user, _)| user)
}

impl UserDirectory for ConfigUserDirectory {
    fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        let name = if self.strip_domain {
            account_name(trimmed)
        } else {
            trimmed
        };
        let name = name.to_lowercase();
        match self.aliases.get(&name) {
            Some(alias) => alias.clone(),
            None => name,
        }
    }

    fn resolve_submitter(&self, user: &str) -> Result<SubmitterStatus> {
        let status = if user.is_empty() {
            SubmitterStatus::Unknown
        } else if self.blocked.contains(user) {
            SubmitterStatus::Disabled
        } else {
            SubmitterStatus::Authorized
        };
        debug!(user, ?status, "submitter resolved");
        Ok(status)
    }
}
