// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory and config file resolution.

use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// The application data directory.  Not created here; nothing is written
/// to it unless a config is saved.
pub fn data_dir() -> PathBuf {
    base_dir().join("labelbridge")
}

/// Config file to use: an explicit path, else `LABELBRIDGE_CONFIG`, else
/// `config.json` in the data directory.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = std::env::var_os("LABELBRIDGE_CONFIG").filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    data_dir().join(CONFIG_FILE)
}

fn base_dir() -> PathBuf {
    // XDG data dir, then the conventional fallback under home
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME").filter(|p| !p.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort
    std::env::temp_dir()
}
