// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use rawprint_core::error::{RawPrintError, Result};

const APP_DIR: &str = "rawprint";

/// Default configuration file inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Return the data directory, creating it if needed.
///
/// An explicit directory wins; otherwise `$XDG_DATA_HOME/rawprint`, then
/// `$HOME/.local/share/rawprint`, then `/tmp/rawprint`.
pub fn resolve(explicit: Option<&Path>) -> Result<PathBuf> {
    let dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => base_dir(
            std::env::var_os("XDG_DATA_HOME"),
            std::env::var_os("HOME"),
        )
        .join(APP_DIR),
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| RawPrintError::Config(format!("data directory {}: {e}", dir.display())))?;
    Ok(dir)
}

fn base_dir(xdg_data_home: Option<OsString>, home: Option<OsString>) -> PathBuf {
    if let Some(xdg) = xdg_data_home.filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = home.filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort
    PathBuf::from("/tmp")
}
