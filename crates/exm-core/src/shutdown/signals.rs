//! Termination signals as a stop source.
//!
//! Handlers are registered through `signal_hook::low_level` and only perform
//! a compare-and-swap on the run flag. Logging about the signal happens later,
//! on the supervising thread, once it observes the stop edge.

use std::ffi::c_int;

use signal_hook::consts::{SIGABRT, SIGINT, SIGTERM};
use signal_hook::low_level;
use signal_hook::SigId;

use super::{RunFlag, StopCause, StopSource, StopSourceError};

/// Signals converted into the stop edge: interrupt, terminate, abort.
pub const TERMINATION_SIGNALS: [c_int; 3] = [SIGINT, SIGTERM, SIGABRT];

/// Conventional name of a termination signal, if it is one we handle.
pub fn signal_name(signo: c_int) -> Option<&'static str> {
    match signo {
        SIGINT => Some("SIGINT"),
        SIGTERM => Some("SIGTERM"),
        SIGABRT => Some("SIGABRT"),
        _ => None,
    }
}

/// Stop source backed by OS signal handlers.
///
/// Handlers stay registered until the source is dropped.
pub struct SignalStopSource {
    signals: Vec<c_int>,
    registered: Vec<SigId>,
}

impl SignalStopSource {
    /// Handle [`TERMINATION_SIGNALS`].
    pub fn new() -> Self {
        Self::with_signals(TERMINATION_SIGNALS)
    }

    /// Handle an explicit set of signals.
    pub fn with_signals(signals: impl IntoIterator<Item = c_int>) -> Self {
        Self {
            signals: signals.into_iter().collect(),
            registered: Vec::new(),
        }
    }

    /// Signals this source listens for.
    pub fn signals(&self) -> &[c_int] {
        &self.signals
    }

    /// Number of handlers currently registered.
    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }
}

impl Default for SignalStopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSource for SignalStopSource {
    fn name(&self) -> &str {
        "signal"
    }

    fn arm(&mut self, flag: &RunFlag) -> Result<(), StopSourceError> {
        for &signal in &self.signals {
            let flag = flag.clone();
            // SAFETY: the action only performs a lock-free atomic
            // compare-and-swap through `RunFlag::request_stop`; it does not
            // allocate, lock or touch any other state.
            let id = unsafe {
                low_level::register(signal, move || {
                    flag.request_stop(StopCause::Signal(signal));
                })
            }
            .map_err(|source| StopSourceError::Registration { signal, source })?;
            self.registered.push(id);
        }

        tracing::debug!(signals = ?self.signals, "termination signal handlers registered");
        Ok(())
    }
}

impl Drop for SignalStopSource {
    fn drop(&mut self) {
        for id in self.registered.drain(..) {
            low_level::unregister(id);
        }
    }
}
