// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory index of authenticated sessions by client address.
//
// `rawprintd` has no login front end of its own, so in the daemon the table
// stays empty and every job carries no session user.  Applications that
// embed the spool and authenticate people feed it through `login`/`logout`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use rawprint_server::SessionIndex;

/// Sessions idle longer than this no longer vouch for their address.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
struct Session {
    user: String,
    last_seen: Instant,
}

/// Address to user table fed by whatever front end authenticates people
/// (a web login, a kiosk).  A raw job arriving from an address with a live
/// session is attributed to that session's user as well.
#[derive(Debug)]
pub struct SessionTable {
    ttl: Duration,
    sessions: RwLock<HashMap<IpAddr, Session>>,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl SessionTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Record (or refresh) an authenticated session for `client`.
    ///
    /// Expired sessions are swept out on the way, so the table never holds
    /// more than the sessions still alive plus this one.
    pub fn login(&self, client: IpAddr, user: impl Into<String>) {
        let user = user.into();
        debug!(%client, %user, "session registered");
        match self.sessions.write() {
            Ok(mut map) => {
                let ttl = self.ttl;
                map.retain(|_, s| s.last_seen.elapsed() < ttl);
                map.insert(
                    client,
                    Session {
                        user,
                        last_seen: Instant::now(),
                    },
                );
            }
            Err(_) => warn!("session table lock poisoned; login dropped"),
        }
    }

    pub fn logout(&self, client: IpAddr) {
        if let Ok(mut map) = self.sessions.write() {
            map.remove(&client);
        }
    }

    /// Drop every expired session.  Returns how many were removed.
    pub fn prune(&self) -> usize {
        let Ok(mut map) = self.sessions.write() else {
            return 0;
        };
        let before = map.len();
        let ttl = self.ttl;
        map.retain(|_, s| s.last_seen.elapsed() < ttl);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionIndex for SessionTable {
    fn authenticated_user(&self, client: IpAddr) -> Option<String> {
        let map = self.sessions.read().ok()?;
        map.get(&client)
            .filter(|s| s.last_seen.elapsed() < self.ttl)
            .map(|s| s.user.clone())
    }
}
