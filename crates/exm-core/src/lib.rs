//! Bootstrap and lifecycle supervision for the Execution Management process.
//!
//! The [`lifecycle::Supervisor`] brings the platform online, drives the
//! poller from a dedicated thread, and tears everything down exactly once
//! when a stop edge is observed on the shared [`shutdown::RunFlag`].
//!
//! ```text
//! Supervisor
//!     |
//!     |-- CredentialGate   (feature "credential-gate")
//!     |-- StopSource(s) --arm--> RunFlag <--read-- polling thread --> Poller
//!     |-- PlatformController::initialize / terminate
//! ```

pub mod arguments;
#[cfg(feature = "credential-gate")]
pub mod credentials;
pub mod lifecycle;
pub mod platform;
pub mod shutdown;

pub use arguments::{ArgumentCountError, Arguments, ConfigKind, Credentials};
pub use lifecycle::{
    FAILURE_EXIT_CODE, LifecycleState, Supervisor, SupervisorConfig, SupervisorError,
    SupervisorResult,
};
pub use platform::{InitializationFault, PlatformController, Poller, TerminationFault};
pub use shutdown::{RunFlag, StopCause, StopSource, StopSourceError};
