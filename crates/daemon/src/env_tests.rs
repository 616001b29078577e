// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::names;
use super::*;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Serializes tests that touch the process environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn constants_match_env_var_names() {
    assert_eq!(names::CHATKIT_CONFIG, "CHATKIT_CONFIG");
    assert_eq!(names::XDG_CONFIG_HOME, "XDG_CONFIG_HOME");
    assert_eq!(names::RUST_LOG, "RUST_LOG");
}

#[test]
fn config_file_returns_path_when_set() {
    let _guard = EnvGuard::set(names::CHATKIT_CONFIG, "/custom/chatkit.toml");
    assert_eq!(config_file(), Some(PathBuf::from("/custom/chatkit.toml")));
}

#[test]
fn config_file_ignores_empty_value() {
    let _guard = EnvGuard::set(names::CHATKIT_CONFIG, "");
    assert_eq!(config_file(), None);
}

#[test]
fn xdg_config_home_returns_path_when_set() {
    let _guard = EnvGuard::set(names::XDG_CONFIG_HOME, "/custom/xdg");
    assert_eq!(xdg_config_home(), Some(PathBuf::from("/custom/xdg")));
}

#[test]
fn xdg_config_home_returns_none_when_unset() {
    let _guard = EnvGuard::remove(names::XDG_CONFIG_HOME);
    assert_eq!(xdg_config_home(), None);
}

/// RAII guard that sets/removes an env var and restores it on drop.
struct EnvGuard {
    key: &'static str,
    original: Option<String>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let original = std::env::var(key).ok();
        std::env::set_var(key, value);
        Self {
            key,
            original,
            _lock: lock,
        }
    }

    fn remove(key: &'static str) -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let original = std::env::var(key).ok();
        std::env::remove_var(key);
        Self {
            key,
            original,
            _lock: lock,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.original {
            Some(val) => std::env::set_var(self.key, val),
            None => std::env::remove_var(self.key),
        }
    }
}
