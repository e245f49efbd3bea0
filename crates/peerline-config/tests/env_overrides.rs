//! Exercises `Config::load_from_iter` against the real process environment.

use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use peerline_config::{Config, DispatchMode, LogFormat};
use rstest::rstest;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    entries: Vec<(&'static str, Option<OsString>)>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_vars(vars: &[(&'static str, &str)]) -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut entries = Vec::with_capacity(vars.len());
        for (key, value) in vars {
            entries.push((*key, std::env::var_os(key)));
            // Environment mutation is unsafe under edition 2024; the mutex
            // serialises every test that touches these variables.
            unsafe { std::env::set_var(key, value) };
        }
        Self {
            entries,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        for (key, previous) in self.entries.drain(..) {
            match previous {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
        }
        drop(self.guard.take());
    }
}

fn args(extra: &[&str]) -> Vec<OsString> {
    std::iter::once("peerline")
        .chain(extra.iter().copied())
        .map(OsString::from)
        .collect()
}

#[rstest]
fn defaults_apply_without_overrides() {
    let _env = EnvOverride::set_vars(&[]);

    let config = Config::load_from_iter(args(&[])).expect("load defaults");

    assert_eq!(config, Config::default());
}

#[rstest]
fn environment_overrides_are_applied() {
    let _env = EnvOverride::set_vars(&[
        ("PEERLINE_LOG_FORMAT", "compact"),
        ("PEERLINE_DISPATCH_MODE", "inline"),
        ("PEERLINE_REPLY_TIMEOUT_MS", "1500"),
    ]);

    let config = Config::load_from_iter(args(&[])).expect("load config from environment");

    assert_eq!(config.log_format(), LogFormat::Compact);
    assert_eq!(config.dispatch_mode(), DispatchMode::Inline);
    assert_eq!(config.reply_timeout_ms, Some(1500));
}

#[rstest]
fn command_line_flags_override_the_environment() {
    let _env = EnvOverride::set_vars(&[("PEERLINE_LOG_FILTER", "warn")]);

    let config =
        Config::load_from_iter(args(&["--log-filter=peerline=debug"])).expect("load config");

    assert_eq!(config.log_filter(), "peerline=debug");
}

#[rstest]
fn malformed_environment_fails_fast() {
    let _env = EnvOverride::set_vars(&[("PEERLINE_REPLY_TIMEOUT_MS", "soon")]);

    let result = Config::load_from_iter(args(&[]));

    assert!(result.is_err(), "timeout must be numeric, got {result:?}");
}
