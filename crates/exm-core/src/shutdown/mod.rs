//! Shutdown coordination: the shared run flag and the triggers that clear it.
//!
//! [`RunFlag`] is the only state shared between the supervising thread, the
//! polling thread and signal-handling context. It starts out running and can
//! be stopped exactly once; the first [`StopCause`] wins and is kept for
//! diagnostics.
//!
//! Triggers implement [`StopSource`]. Each one is armed with a clone of the
//! flag and does nothing but request a stop on it.

pub mod console;
pub mod signals;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use console::ConsoleStopSource;
pub use signals::SignalStopSource;

const RUNNING: usize = 0;
const CONSOLE: usize = usize::MAX - 1;
const INTERNAL: usize = usize::MAX;

/// What produced the stop edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// A termination-class OS signal, by number.
    Signal(i32),
    /// Input on the console.
    Console,
    /// Requested by the supervisor itself (e.g. the polling thread died).
    Internal,
}

impl StopCause {
    fn encode(self) -> usize {
        match self {
            // Signal numbers are small positive integers.
            StopCause::Signal(signo) => signo.max(1) as usize,
            StopCause::Console => CONSOLE,
            StopCause::Internal => INTERNAL,
        }
    }

    fn decode(raw: usize) -> Option<Self> {
        match raw {
            RUNNING => None,
            CONSOLE => Some(StopCause::Console),
            INTERNAL => Some(StopCause::Internal),
            signo => Some(StopCause::Signal(signo as i32)),
        }
    }
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::Signal(signo) => match signals::signal_name(*signo) {
                Some(name) => write!(f, "{name} received"),
                None => write!(f, "signal {signo} received"),
            },
            StopCause::Console => f.write_str("stop requested from the console"),
            StopCause::Internal => f.write_str("stop requested internally"),
        }
    }
}

/// Process-wide run flag.
///
/// Cloning is cheap and every clone observes the same state. Once stopped,
/// the flag never becomes running again.
#[derive(Clone)]
pub struct RunFlag {
    state: Arc<AtomicUsize>,
}

impl RunFlag {
    /// Create a flag in the running state.
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicUsize::new(RUNNING)),
        }
    }

    /// `true` until the first stop request.
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RUNNING
    }

    /// Request a stop.
    ///
    /// Returns `true` only for the request that produced the stop edge.
    /// Later requests leave the flag and the recorded cause untouched.
    ///
    /// This is a single lock-free compare-and-swap and does not allocate, so
    /// it is safe to call from a signal handler.
    pub fn request_stop(&self, cause: StopCause) -> bool {
        self.state
            .compare_exchange(RUNNING, cause.encode(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Cause of the stop edge, or `None` while still running.
    pub fn stop_cause(&self) -> Option<StopCause> {
        StopCause::decode(self.state.load(Ordering::SeqCst))
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunFlag")
            .field("running", &self.is_running())
            .field("cause", &self.stop_cause())
            .finish()
    }
}

/// Errors from arming a stop source.
#[derive(Debug, thiserror::Error)]
pub enum StopSourceError {
    #[error("failed to register handler for signal {signal}: {source}")]
    Registration {
        signal: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start the {name} stop listener: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A trigger that converts some external event into a stop request.
///
/// Implementations must only ever call [`RunFlag::request_stop`] on the flag
/// they were armed with. Arming twice is a programming error.
pub trait StopSource: Send {
    /// Short name used in logs (e.g. "signal", "console").
    fn name(&self) -> &str;

    /// Start listening. Failure aborts startup.
    fn arm(&mut self, flag: &RunFlag) -> Result<(), StopSourceError>;
}

// Compile-time assertion: StopSource must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn StopSource) {}
};
