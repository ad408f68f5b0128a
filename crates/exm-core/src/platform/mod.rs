//! Collaborator interfaces consumed by the supervisor.
//!
//! The supervisor drives two collaborators:
//!
//! - [`PlatformController`]: owns the deterministic-client / process state
//!   machine. Initialized once, terminated once.
//! - [`Poller`]: a single non-blocking "advance" of pending I/O work, called
//!   from the polling thread once per cycle.
//!
//! Reference implementations live in [`execution`] and [`epoll`].

#[cfg(target_os = "linux")]
pub mod epoll;
pub mod execution;

use std::time::Duration;

use crate::arguments::Arguments;

#[cfg(target_os = "linux")]
pub use epoll::EpollPoller;
pub use execution::ExecutionManagement;

/// Scheduling constants of the deterministic client.
pub mod deterministic_client {
    use std::time::Duration;

    /// Fixed delay between two poll cycles.
    pub const CYCLE_DELAY: Duration = Duration::from_millis(100);
}

/// The platform controller could not be brought up.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct InitializationFault {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl InitializationFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A fault raised while terminating the platform controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TerminationFault {
    /// The controller reported a failure it knows about.
    #[error("termination failed: {0}")]
    Known(String),

    /// The controller failed in a way it did not report (it panicked).
    #[error("termination failed with an unknown fault: {0}")]
    Unknown(String),
}

/// Lifecycle owner of the execution platform.
///
/// `initialize` is called at most once. `terminate` is called at most once,
/// only after a successful `initialize`, and only after the polling thread
/// has stopped touching the [`Poller`].
pub trait PlatformController: Send {
    /// Bring the platform up with the validated arguments.
    fn initialize(&mut self, arguments: &Arguments) -> Result<(), InitializationFault>;

    /// Shut the platform down and report the process exit code.
    fn terminate(&mut self) -> Result<i32, TerminationFault>;

    /// Delay between two poll cycles.
    fn cycle_delay(&self) -> Duration {
        deterministic_client::CYCLE_DELAY
    }
}

/// Non-blocking event pump.
///
/// Owned by the polling thread for the whole polling phase.
pub trait Poller: Send {
    /// Perform one pass over pending work and return without blocking.
    fn try_poll(&mut self);
}

// Compile-time assertion: both collaborator traits must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn PlatformController, _: &dyn Poller) {}
};

/// Poller with nothing to do. Used on targets without epoll.
#[derive(Debug, Default)]
pub struct IdlePoller;

impl Poller for IdlePoller {
    fn try_poll(&mut self) {}
}
