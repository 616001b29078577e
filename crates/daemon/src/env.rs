// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Environment variables read by chatkitd.

use std::path::PathBuf;

pub mod names {
    /// Environment variable: path of the config file.
    pub const CHATKIT_CONFIG: &str = "CHATKIT_CONFIG";

    /// Environment variable: XDG base directory for config files.
    pub const XDG_CONFIG_HOME: &str = "XDG_CONFIG_HOME";

    /// Environment variable: controls log level filtering (used by tracing-subscriber).
    pub const RUST_LOG: &str = "RUST_LOG";
}

fn path_var(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Config file named by `CHATKIT_CONFIG`.
pub fn config_file() -> Option<PathBuf> {
    path_var(names::CHATKIT_CONFIG)
}

pub fn xdg_config_home() -> Option<PathBuf> {
    path_var(names::XDG_CONFIG_HOME)
}

/// Whether `RUST_LOG` is set, in which case it overrides `--verbose`.
pub fn has_log_filter() -> bool {
    std::env::var_os(names::RUST_LOG).is_some()
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
