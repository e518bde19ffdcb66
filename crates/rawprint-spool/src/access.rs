// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client address allow-list for the raw print queue.

use std::net::IpAddr;
use std::str::FromStr;

use tracing::debug;

use rawprint_core::error::{RawPrintError, Result};
use rawprint_core::types::QueueId;
use rawprint_server::QueueAccessControl;

/// One allow-list entry: an address block in CIDR notation.  A bare
/// address is a block of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressBlock {
    network: IpAddr,
    prefix_len: u8,
}

impl AddressBlock {
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, canonical(addr)) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.prefix_len);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.prefix_len);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for AddressBlock {
    type Err = RawPrintError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || RawPrintError::Config(format!("invalid client address block [{s}]"));

        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let network = canonical(addr.parse::<IpAddr>().map_err(|_| invalid())?);
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
            None => max,
        };
        if prefix_len > max {
            return Err(invalid());
        }
        Ok(Self {
            network,
            prefix_len,
        })
    }
}

/// IPv4-mapped IPv6 peers (`::ffff:a.b.c.d`) are matched as IPv4.
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(addr, IpAddr::V4),
        v4 => v4,
    }
}

fn mask_u32(prefix_len: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0)
}

fn mask_u128(prefix_len: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix_len)).unwrap_or(0)
}

/// Grants the raw queue to clients inside any configured block.  An empty
/// list grants every client.
#[derive(Debug, Clone, Default)]
pub struct IpAllowList {
    blocks: Vec<AddressBlock>,
}

impl IpAllowList {
    /// Parse the configured entries.  One bad entry fails the whole list so
    /// a typo never silently widens access.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let blocks = entries
            .iter()
            .map(|e| e.as_ref().parse())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { blocks })
    }

    pub fn allows_all(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn allows(&self, addr: IpAddr) -> bool {
        self.allows_all() || self.blocks.iter().any(|b| b.contains(addr))
    }
}

impl QueueAccessControl for IpAllowList {
    fn has_client_ip_access(
        &self,
        queue: &QueueId,
        listener_uri: &str,
        client: IpAddr,
    ) -> Result<bool> {
        let allowed = self.allows(client);
        debug!(%queue, listener = listener_uri, %client, allowed, "queue access check");
        Ok(allowed)
    }
}
