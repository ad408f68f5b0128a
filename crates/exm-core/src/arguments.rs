//! Command-line arguments handed to the platform controller.
//!
//! The supervisor validates only the arity. Resolving omitted paths to
//! defaults and parsing file contents belong to the controller.

use std::fmt;
use std::path::{Path, PathBuf};

/// Number of configuration paths the process expects.
pub const EXPECTED_ARGUMENT_COUNT: usize = 4;

/// The four configuration files, in command-line order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    General,
    ExtendedVehicle,
    DiagnosticManager,
    HealthMonitoring,
}

impl ConfigKind {
    /// All kinds in positional order.
    pub const ALL: [ConfigKind; EXPECTED_ARGUMENT_COUNT] = [
        ConfigKind::General,
        ConfigKind::ExtendedVehicle,
        ConfigKind::DiagnosticManager,
        ConfigKind::HealthMonitoring,
    ];

    /// Short placeholder used in the usage line.
    pub fn placeholder(self) -> &'static str {
        match self {
            ConfigKind::General => "config",
            ConfigKind::ExtendedVehicle => "evconf",
            ConfigKind::DiagnosticManager => "dmconf",
            ConfigKind::HealthMonitoring => "phmcfg",
        }
    }

    /// Human-readable description of the file.
    pub fn description(self) -> &'static str {
        match self {
            ConfigKind::General => "general configuration",
            ConfigKind::ExtendedVehicle => "extended vehicle configuration",
            ConfigKind::DiagnosticManager => "diagnostic manager configuration",
            ConfigKind::HealthMonitoring => "health monitoring configuration",
        }
    }

    /// Manifest path used when the argument is left empty.
    pub fn default_path(self) -> &'static Path {
        Path::new(match self {
            ConfigKind::General => "configuration/execution_manifest.arxml",
            ConfigKind::ExtendedVehicle => "configuration/extended_vehicle_manifest.arxml",
            ConfigKind::DiagnosticManager => "configuration/diagnostic_manager_manifest.arxml",
            ConfigKind::HealthMonitoring => "configuration/health_monitoring_manifest.arxml",
        })
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Wrong number of positional arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Expected {} arguments, but received {received}.", EXPECTED_ARGUMENT_COUNT)]
pub struct ArgumentCountError {
    pub received: usize,
}

/// Secrets collected before platform initialization.
///
/// `Debug` never prints the values.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    bearer_token: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            bearer_token: bearer_token.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

/// Validated process arguments: exactly four configuration paths, plus the
/// credentials collected by the gate (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arguments {
    paths: [PathBuf; EXPECTED_ARGUMENT_COUNT],
    credentials: Option<Credentials>,
}

impl Arguments {
    /// Validate the positional arguments (program name excluded).
    ///
    /// Only the count is checked; an empty path means "use the default".
    pub fn from_paths<I, S>(raw: I) -> Result<Self, ArgumentCountError>
    where
        I: IntoIterator<Item = S>,
        S: Into<PathBuf>,
    {
        let collected: Vec<PathBuf> = raw.into_iter().map(Into::into).collect();
        let received = collected.len();
        let paths: [PathBuf; EXPECTED_ARGUMENT_COUNT] = collected
            .try_into()
            .map_err(|_| ArgumentCountError { received })?;
        Ok(Self {
            paths,
            credentials: None,
        })
    }

    /// Path given for `kind`, exactly as passed on the command line.
    pub fn path(&self, kind: ConfigKind) -> &Path {
        &self.paths[kind as usize]
    }

    /// Path for `kind`, falling back to [`ConfigKind::default_path`] when the
    /// argument was left empty.
    pub fn resolved_path(&self, kind: ConfigKind) -> PathBuf {
        let given = self.path(kind);
        if given.as_os_str().is_empty() {
            kind.default_path().to_path_buf()
        } else {
            given.to_path_buf()
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}
