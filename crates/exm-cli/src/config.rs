//! Configuration for the `exm` binary.
//!
//! Optional TOML file at `$EXM_CONFIG`, `$XDG_CONFIG_HOME/exm/config.toml` or
//! `~/.config/exm/config.toml`, resolved with the chain: env var > config
//! file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use exm_core::SupervisorConfig;
use exm_core::platform::deterministic_client;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub supervisor: SupervisorSection,
    pub platform: PlatformSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorSection {
    pub stop_poll_interval_ms: Option<u64>,
    pub stop_source: Option<StopSourceKind>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformSection {
    pub cycle_delay_ms: Option<u64>,
}

/// Which trigger produces the stop edge besides termination signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopSourceKind {
    /// Termination signals only.
    #[default]
    Signal,
    /// Termination signals, plus one line (or EOF) on stdin.
    Console,
}

impl std::str::FromStr for StopSourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "signal" => Ok(StopSourceKind::Signal),
            "console" => Ok(StopSourceKind::Console),
            other => bail!("unknown stop source {other:?} (expected \"signal\" or \"console\")"),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the exm config directory.
///
/// XDG layout on every platform: `$XDG_CONFIG_HOME/exm` or `~/.config/exm`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("exm");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("exm")
}

/// Return the config file path and whether it was named explicitly.
pub fn config_path() -> (PathBuf, bool) {
    match std::env::var_os("EXM_CONFIG") {
        Some(path) => (PathBuf::from(path), true),
        None => (config_dir().join("config.toml"), false),
    }
}

// -----------------------------------------------------------------------
// Read
// -----------------------------------------------------------------------

/// Load and parse a config file.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExmConfig {
    pub stop_poll_interval: Duration,
    pub stop_source: StopSourceKind,
    pub cycle_delay: Duration,
}

impl Default for ExmConfig {
    fn default() -> Self {
        Self {
            stop_poll_interval: SupervisorConfig::DEFAULT_STOP_POLL_INTERVAL,
            stop_source: StopSourceKind::default(),
            cycle_delay: deterministic_client::CYCLE_DELAY,
        }
    }
}

impl ExmConfig {
    /// Resolve configuration using the chain: env var > config file > default.
    ///
    /// - Stop poll interval: `EXM_STOP_POLL_INTERVAL_MS` >
    ///   `[supervisor] stop_poll_interval_ms` > 250
    /// - Stop source: `EXM_STOP_SOURCE` > `[supervisor] stop_source` > `signal`
    /// - Cycle delay: `EXM_CYCLE_DELAY_MS` > `[platform] cycle_delay_ms` > 100
    ///
    /// A missing default config file is not an error; a missing file named by
    /// `EXM_CONFIG` is.
    pub fn resolve() -> Result<Self> {
        let (path, explicit) = config_path();
        let file = if explicit || path.exists() {
            load_config(&path)?
        } else {
            ConfigFile::default()
        };
        let defaults = Self::default();

        let stop_poll_interval = millis(
            "EXM_STOP_POLL_INTERVAL_MS",
            file.supervisor.stop_poll_interval_ms,
            defaults.stop_poll_interval,
        )?;
        let cycle_delay = millis(
            "EXM_CYCLE_DELAY_MS",
            file.platform.cycle_delay_ms,
            defaults.cycle_delay,
        )?;
        let stop_source = match std::env::var("EXM_STOP_SOURCE") {
            Ok(raw) => raw.parse().context("invalid EXM_STOP_SOURCE")?,
            Err(_) => file.supervisor.stop_source.unwrap_or(defaults.stop_source),
        };

        Ok(Self {
            stop_poll_interval,
            stop_source,
            cycle_delay,
        })
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            stop_poll_interval: self.stop_poll_interval,
            ..SupervisorConfig::default()
        }
    }
}

/// Resolve a millisecond duration; zero is rejected to keep loops from spinning.
fn millis(var: &str, from_file: Option<u64>, default: Duration) -> Result<Duration> {
    let ms = match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{var} is not a number of milliseconds: {raw:?}"))?,
        Err(_) => match from_file {
            Some(ms) => ms,
            None => return Ok(default),
        },
    };
    if ms == 0 {
        bail!("{var} must be greater than zero");
    }
    Ok(Duration::from_millis(ms))
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 5] = [
        "EXM_CONFIG",
        "EXM_STOP_POLL_INTERVAL_MS",
        "EXM_STOP_SOURCE",
        "EXM_CYCLE_DELAY_MS",
        "XDG_CONFIG_HOME",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    fn clear_env() {
        for var in VARS {
            unsafe { std::env::remove_var(var) };
        }
    }

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_when_nothing_set() {
        let _lock = lock_env();
        clear_env();
        let tmp = tempfile::TempDir::new().unwrap();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let config = ExmConfig::resolve().unwrap();
        clear_env();

        assert_eq!(config, ExmConfig::default());
        assert_eq!(config.stop_poll_interval, Duration::from_millis(250));
        assert_eq!(config.cycle_delay, Duration::from_millis(100));
        assert_eq!(config.stop_source, StopSourceKind::Signal);
    }

    #[test]
    fn config_file_values_are_used() {
        let _lock = lock_env();
        clear_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[supervisor]
stop_poll_interval_ms = 40
stop_source = "console"

[platform]
cycle_delay_ms = 15
"#,
        );
        unsafe { std::env::set_var("EXM_CONFIG", &path) };

        let config = ExmConfig::resolve().unwrap();
        clear_env();

        assert_eq!(config.stop_poll_interval, Duration::from_millis(40));
        assert_eq!(config.stop_source, StopSourceKind::Console);
        assert_eq!(config.cycle_delay, Duration::from_millis(15));
    }

    #[test]
    fn env_vars_override_config_file() {
        let _lock = lock_env();
        clear_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let exm_dir = tmp.path().join("exm");
        std::fs::create_dir_all(&exm_dir).unwrap();
        write_config(
            &exm_dir,
            "[supervisor]\nstop_poll_interval_ms = 40\nstop_source = \"console\"\n",
        );
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        unsafe { std::env::set_var("EXM_STOP_POLL_INTERVAL_MS", "75") };
        unsafe { std::env::set_var("EXM_STOP_SOURCE", "Signal") };

        let config = ExmConfig::resolve().unwrap();
        clear_env();

        assert_eq!(config.stop_poll_interval, Duration::from_millis(75));
        assert_eq!(config.stop_source, StopSourceKind::Signal);
        assert_eq!(config.cycle_delay, deterministic_client::CYCLE_DELAY);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let _lock = lock_env();
        clear_env();
        let tmp = tempfile::TempDir::new().unwrap();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        unsafe { std::env::set_var("EXM_CYCLE_DELAY_MS", "0") };

        let result = ExmConfig::resolve();
        clear_env();

        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("EXM_CYCLE_DELAY_MS"), "unexpected error: {msg}");
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let _lock = lock_env();
        clear_env();
        let tmp = tempfile::TempDir::new().unwrap();
        unsafe { std::env::set_var("EXM_CONFIG", tmp.path().join("absent.toml")) };

        let result = ExmConfig::resolve();
        clear_env();

        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("failed to read config file"), "unexpected error: {msg}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(tmp.path(), "[supervisor]\npoll_ms = 5\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn stop_source_parsing() {
        assert_eq!("console".parse::<StopSourceKind>().unwrap(), StopSourceKind::Console);
        assert_eq!(" SIGNAL ".parse::<StopSourceKind>().unwrap(), StopSourceKind::Signal);
        assert!("keyboard".parse::<StopSourceKind>().is_err());
    }

    #[test]
    fn config_dir_honours_xdg() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", "/tmp/xdg-test") };

        let dir = config_dir();
        let (path, explicit) = config_path();
        clear_env();

        assert_eq!(dir, PathBuf::from("/tmp/xdg-test/exm"));
        assert!(path.ends_with("exm/config.toml"));
        assert!(!explicit);
    }
}
