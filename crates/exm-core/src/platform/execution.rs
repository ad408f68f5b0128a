//! Reference platform controller.
//!
//! Resolves the four manifest paths and checks that each one exists. Manifest
//! contents are handed over untouched; interpreting them is the job of the
//! deterministic-client state machine, which this controller does not model.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::arguments::{Arguments, ConfigKind};

use super::{InitializationFault, PlatformController, TerminationFault, deterministic_client};

/// Execution-management state as seen from the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformState {
    Off,
    Running,
}

/// Platform controller that validates manifests and tracks `Off -> Running -> Off`.
#[derive(Debug)]
pub struct ExecutionManagement {
    cycle_delay: Duration,
    state: PlatformState,
    manifests: HashMap<ConfigKind, PathBuf>,
    authenticated: bool,
}

impl ExecutionManagement {
    pub fn new() -> Self {
        Self::with_cycle_delay(deterministic_client::CYCLE_DELAY)
    }

    /// Override the deterministic-client cycle delay.
    pub fn with_cycle_delay(cycle_delay: Duration) -> Self {
        Self {
            cycle_delay,
            state: PlatformState::Off,
            manifests: HashMap::new(),
            authenticated: false,
        }
    }

    pub fn state(&self) -> PlatformState {
        self.state
    }

    /// Resolved manifest path for `kind`, once initialized.
    pub fn manifest(&self, kind: ConfigKind) -> Option<&PathBuf> {
        self.manifests.get(&kind)
    }

    /// Whether credentials were supplied at initialization.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

impl Default for ExecutionManagement {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformController for ExecutionManagement {
    fn initialize(&mut self, arguments: &Arguments) -> Result<(), InitializationFault> {
        if self.state == PlatformState::Running {
            return Err(InitializationFault::new(
                "execution management is already running",
            ));
        }

        let mut manifests = HashMap::new();
        for kind in ConfigKind::ALL {
            let path = arguments.resolved_path(kind);
            let metadata = std::fs::metadata(&path).map_err(|e| {
                InitializationFault::with_source(
                    format!("cannot access {kind} at {}", path.display()),
                    e,
                )
            })?;
            if !metadata.is_file() {
                return Err(InitializationFault::new(format!(
                    "{kind} at {} is not a regular file",
                    path.display()
                )));
            }
            tracing::debug!(kind = %kind, path = %path.display(), "manifest resolved");
            manifests.insert(kind, path);
        }

        self.manifests = manifests;
        self.authenticated = arguments.credentials().is_some();
        self.state = PlatformState::Running;

        tracing::info!(
            authenticated = self.authenticated,
            cycle_delay_ms = self.cycle_delay.as_millis() as u64,
            "execution management initialized"
        );
        Ok(())
    }

    fn terminate(&mut self) -> Result<i32, TerminationFault> {
        match self.state {
            PlatformState::Running => {
                self.state = PlatformState::Off;
                tracing::info!("execution management terminated");
                Ok(0)
            }
            PlatformState::Off => Err(TerminationFault::Known(
                "execution management is not running".to_string(),
            )),
        }
    }

    fn cycle_delay(&self) -> Duration {
        self.cycle_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::Credentials;

    fn manifest_dir() -> (tempfile::TempDir, Vec<PathBuf>) {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths: Vec<PathBuf> = ConfigKind::ALL
            .iter()
            .map(|kind| {
                let path = tmp.path().join(format!("{}.arxml", kind.placeholder()));
                std::fs::write(&path, "<AUTOSAR/>").unwrap();
                path
            })
            .collect();
        (tmp, paths)
    }

    #[test]
    fn initialize_and_terminate() {
        let (_tmp, paths) = manifest_dir();
        let args = Arguments::from_paths(paths.clone()).unwrap();

        let mut em = ExecutionManagement::new();
        assert_eq!(em.state(), PlatformState::Off);

        em.initialize(&args).unwrap();
        assert_eq!(em.state(), PlatformState::Running);
        assert_eq!(em.manifest(ConfigKind::DiagnosticManager), Some(&paths[2]));
        assert!(!em.is_authenticated());

        assert_eq!(em.terminate(), Ok(0));
        assert_eq!(em.state(), PlatformState::Off);
    }

    #[test]
    fn missing_manifest_fails_initialization() {
        let (tmp, mut paths) = manifest_dir();
        paths[1] = tmp.path().join("does-not-exist.arxml");
        let args = Arguments::from_paths(paths).unwrap();

        let mut em = ExecutionManagement::new();
        let fault = em.initialize(&args).unwrap_err();
        assert!(
            fault.message().contains("extended vehicle configuration"),
            "unexpected fault: {fault}"
        );
        assert_eq!(em.state(), PlatformState::Off);
    }

    #[test]
    fn directory_is_not_a_manifest() {
        let (tmp, mut paths) = manifest_dir();
        paths[3] = tmp.path().to_path_buf();
        let args = Arguments::from_paths(paths).unwrap();

        let fault = ExecutionManagement::new().initialize(&args).unwrap_err();
        assert!(fault.message().contains("not a regular file"));
    }

    #[test]
    fn credentials_mark_the_platform_authenticated() {
        let (_tmp, paths) = manifest_dir();
        let args = Arguments::from_paths(paths)
            .unwrap()
            .with_credentials(Credentials::new("key", "token"));

        let mut em = ExecutionManagement::new();
        em.initialize(&args).unwrap();
        assert!(em.is_authenticated());
    }

    #[test]
    fn terminate_without_initialize_is_a_known_fault() {
        let mut em = ExecutionManagement::new();
        assert!(matches!(em.terminate(), Err(TerminationFault::Known(_))));
    }

    #[test]
    fn double_initialize_is_rejected() {
        let (_tmp, paths) = manifest_dir();
        let args = Arguments::from_paths(paths).unwrap();

        let mut em = ExecutionManagement::new();
        em.initialize(&args).unwrap();
        assert!(em.initialize(&args).is_err());
    }

    #[test]
    fn cycle_delay_override() {
        let em = ExecutionManagement::with_cycle_delay(Duration::from_millis(20));
        assert_eq!(em.cycle_delay(), Duration::from_millis(20));
        assert_eq!(
            ExecutionManagement::new().cycle_delay(),
            deterministic_client::CYCLE_DELAY
        );
    }
}
