//! The polling thread and the supervising thread's stop wait.

use std::any::Any;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::platform::Poller;
use crate::shutdown::RunFlag;

/// Drive `poller` until `flag` stops: one `try_poll`, then a fixed sleep.
///
/// The flag is checked only at the top of the loop, so an in-flight
/// `try_poll` always completes. Returns the number of completed cycles.
pub fn run_polling_loop(poller: &mut dyn Poller, flag: &RunFlag, cycle_delay: Duration) -> u64 {
    let mut cycles = 0u64;
    while flag.is_running() {
        poller.try_poll();
        cycles += 1;
        thread::sleep(cycle_delay);
    }
    cycles
}

/// Handle to the single background polling thread.
///
/// The thread owns the poller while it runs and hands it back on join.
#[derive(Debug)]
pub struct PollingThread {
    handle: JoinHandle<Box<dyn Poller>>,
}

impl PollingThread {
    /// Start the polling loop on a named thread.
    pub fn spawn(
        name: &str,
        mut poller: Box<dyn Poller>,
        flag: RunFlag,
        cycle_delay: Duration,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                tracing::debug!(cycle_delay_ms = cycle_delay.as_millis() as u64, "polling started");
                let cycles = run_polling_loop(poller.as_mut(), &flag, cycle_delay);
                tracing::debug!(cycles, "polling stopped");
                poller
            })?;
        Ok(Self { handle })
    }

    /// `true` once the thread has exited, normally or by panicking.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread and take the poller back.
    ///
    /// A panic inside the poller is returned as its message.
    pub fn join(self) -> Result<Box<dyn Poller>, String> {
        self.handle
            .join()
            .map_err(|payload| panic_message(payload.as_ref()))
    }
}

/// Why the supervising thread stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The run flag was stopped.
    StopRequested,
    /// The polling thread exited while the flag was still running.
    PollerExited,
}

/// Block until the flag stops or the polling thread dies, checking every
/// `interval`.
pub fn wait_for_stop(flag: &RunFlag, interval: Duration, worker: &PollingThread) -> WaitOutcome {
    loop {
        if !flag.is_running() {
            return WaitOutcome::StopRequested;
        }
        if worker.is_finished() {
            return WaitOutcome::PollerExited;
        }
        thread::sleep(interval);
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
