//! Lifecycle supervisor: the ordering contract between startup, polling and
//! teardown.
//!
//! ```text
//! NotStarted -> CredentialsPending -> Initializing -> Polling -> Stopping -> Terminated
//!      |               |                 |  |                      ^
//!      |               |                 |  +----------------------+  (stop already requested,
//!      |               |                 |                               or no polling thread)
//!      +---------------+-----------------+----------------------------> Terminated (setup failure)
//! ```
//!
//! Guarantees:
//! - Controller and poller are built only after the credential gate passed.
//! - The polling thread starts only after `initialize` succeeded and no stop
//!   was requested yet.
//! - `terminate` runs only after the polling thread was joined, and at most once.
//! - Every fault from a collaborator, panics included, ends up in
//!   [`SupervisorResult`] instead of escaping.

pub mod polling;

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Duration;

use crate::arguments::{ArgumentCountError, Arguments};
#[cfg(feature = "credential-gate")]
use crate::credentials::{self, CredentialError, CredentialGate, CredentialKind};
use crate::platform::{InitializationFault, PlatformController, Poller, TerminationFault};
use crate::shutdown::{RunFlag, StopCause, StopSource, StopSourceError};

use polling::{PollingThread, WaitOutcome, panic_message, wait_for_stop};

/// Exit code reported for any setup failure or termination fault.
pub const FAILURE_EXIT_CODE: i32 = -1;

/// Supervisor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    CredentialsPending,
    Initializing,
    Polling,
    Stopping,
    Terminated,
}

impl LifecycleState {
    /// Check whether `self -> to` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (NotStarted, CredentialsPending)
                | (NotStarted, Initializing)
                | (CredentialsPending, Initializing)
                | (Initializing, Polling)
                | (Initializing, Stopping)
                | (Polling, Stopping)
                | (Stopping, Terminated)
                | (NotStarted, Terminated)
                | (CredentialsPending, Terminated)
                | (Initializing, Terminated)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::NotStarted => "not_started",
            LifecycleState::CredentialsPending => "credentials_pending",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Polling => "polling",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Terminated => "terminated",
        })
    }
}

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How often the supervising thread checks the run flag while polling.
    pub stop_poll_interval: Duration,
    /// Name given to the polling thread.
    pub poll_thread_name: String,
}

impl SupervisorConfig {
    pub const DEFAULT_STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stop_poll_interval: Self::DEFAULT_STOP_POLL_INTERVAL,
            poll_thread_name: "exm-poller".to_string(),
        }
    }
}

/// Everything that can make a supervised run fail.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("incorrect number of arguments provided: {0}")]
    ArgumentCount(#[from] ArgumentCountError),

    #[cfg(feature = "credential-gate")]
    #[error("asking for the {kind} failed: {source}")]
    CredentialAcquisition {
        kind: CredentialKind,
        #[source]
        source: CredentialError,
    },

    #[error("stop source {name:?} could not be armed: {source}")]
    StopSource {
        name: String,
        #[source]
        source: StopSourceError,
    },

    #[error("failed to allocate platform resources: {0}")]
    ResourceAllocation(#[source] io::Error),

    #[error("platform initialization failed: {0}")]
    Initialization(#[source] InitializationFault),

    #[error("failed to start the polling thread: {0}")]
    PollingThreadSpawn(#[source] io::Error),

    #[error("polling thread panicked: {0}")]
    PollingThreadPanicked(String),

    #[error(transparent)]
    Termination(#[from] TerminationFault),
}

/// Outcome of [`Supervisor::run`].
#[derive(Debug)]
pub struct SupervisorResult {
    exit_code: i32,
    transitions: Vec<LifecycleState>,
    stop_cause: Option<StopCause>,
    error: Option<SupervisorError>,
}

impl SupervisorResult {
    /// Process exit code: the controller's code, or [`FAILURE_EXIT_CODE`].
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Every state visited, in order, starting with `NotStarted`.
    pub fn transitions(&self) -> &[LifecycleState] {
        &self.transitions
    }

    pub fn final_state(&self) -> LifecycleState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(LifecycleState::NotStarted)
    }

    /// What produced the stop edge, if one was observed.
    pub fn stop_cause(&self) -> Option<StopCause> {
        self.stop_cause
    }

    /// First error of the run.
    pub fn error(&self) -> Option<&SupervisorError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Orchestrates the collaborators through one process lifetime.
///
/// # Example
///
/// ```ignore
/// let supervisor = Supervisor::from_factories(
///     config,
///     || Ok(ExecutionManagement::new()),
///     EpollPoller::new,
/// )
/// .with_stop_source(SignalStopSource::new());
/// let result = supervisor.run(paths);
/// std::process::exit(result.exit_code());
/// ```
pub struct Supervisor {
    config: SupervisorConfig,
    controller: ControllerFactory,
    poller: PollerFactory,
    stop_sources: Vec<Box<dyn StopSource>>,
    #[cfg(feature = "credential-gate")]
    credential_gate: Option<Box<dyn CredentialGate>>,
    run_flag: RunFlag,
}

type ControllerFactory = Box<dyn FnOnce() -> io::Result<Box<dyn PlatformController>> + Send>;
type PollerFactory = Box<dyn FnOnce() -> io::Result<Box<dyn Poller>> + Send>;

impl Supervisor {
    /// Supervise collaborators that already exist.
    pub fn new(
        config: SupervisorConfig,
        controller: impl PlatformController + 'static,
        poller: impl Poller + 'static,
    ) -> Self {
        Self::from_factories(config, move || Ok(controller), move || Ok(poller))
    }

    /// Supervise collaborators built lazily, once the credential gate has
    /// passed. A failing gate or bad arity never calls either factory.
    pub fn from_factories<C, P>(
        config: SupervisorConfig,
        controller: impl FnOnce() -> io::Result<C> + Send + 'static,
        poller: impl FnOnce() -> io::Result<P> + Send + 'static,
    ) -> Self
    where
        C: PlatformController + 'static,
        P: Poller + 'static,
    {
        Self {
            config,
            controller: Box::new(move || {
                controller().map(|c| Box::new(c) as Box<dyn PlatformController>)
            }),
            poller: Box::new(move || poller().map(|p| Box::new(p) as Box<dyn Poller>)),
            stop_sources: Vec::new(),
            #[cfg(feature = "credential-gate")]
            credential_gate: None,
            run_flag: RunFlag::new(),
        }
    }

    /// Add a trigger for the stop edge. Sources are armed in insertion order.
    pub fn with_stop_source(mut self, source: impl StopSource + 'static) -> Self {
        self.stop_sources.push(Box::new(source));
        self
    }

    /// Collect credentials before initialization.
    #[cfg(feature = "credential-gate")]
    pub fn with_credential_gate(mut self, gate: impl CredentialGate + 'static) -> Self {
        self.credential_gate = Some(Box::new(gate));
        self
    }

    /// Handle to the run flag this supervisor waits on.
    pub fn run_flag(&self) -> RunFlag {
        self.run_flag.clone()
    }

    /// Run the full lifecycle with the raw positional arguments.
    pub fn run<I, S>(self, raw_args: I) -> SupervisorResult
    where
        I: IntoIterator<Item = S>,
        S: Into<PathBuf>,
    {
        let Supervisor {
            config,
            controller: make_controller,
            poller: make_poller,
            mut stop_sources,
            #[cfg(feature = "credential-gate")]
            credential_gate,
            run_flag,
        } = self;
        let mut trace = LifecycleTrace::new(run_flag.clone());

        let arguments = match Arguments::from_paths(raw_args) {
            Ok(arguments) => arguments,
            Err(e) => return trace.abort(e.into()),
        };

        #[cfg(feature = "credential-gate")]
        let arguments = match credential_gate {
            Some(mut gate) => {
                trace.enter(LifecycleState::CredentialsPending);
                match credentials::acquire(gate.as_mut()) {
                    Ok(creds) => {
                        tracing::info!("credentials acquired");
                        arguments.with_credentials(creds)
                    }
                    Err((kind, source)) => {
                        return trace.abort(SupervisorError::CredentialAcquisition { kind, source });
                    }
                }
            }
            None => arguments,
        };

        // Armed after the credential prompts so a console listener cannot
        // swallow credential input.
        for source in stop_sources.iter_mut() {
            if let Err(e) = source.arm(&run_flag) {
                return trace.abort(SupervisorError::StopSource {
                    name: source.name().to_string(),
                    source: e,
                });
            }
            tracing::debug!(source = source.name(), "stop source armed");
        }

        trace.enter(LifecycleState::Initializing);
        let mut controller = match make_controller() {
            Ok(controller) => controller,
            Err(e) => return trace.abort(SupervisorError::ResourceAllocation(e)),
        };
        let poller = match make_poller() {
            Ok(poller) => poller,
            Err(e) => return trace.abort(SupervisorError::ResourceAllocation(e)),
        };

        match panic::catch_unwind(AssertUnwindSafe(|| controller.initialize(&arguments))) {
            Ok(Ok(())) => {}
            Ok(Err(fault)) => return trace.abort(SupervisorError::Initialization(fault)),
            Err(payload) => {
                let fault = InitializationFault::new(format!(
                    "platform controller panicked: {}",
                    panic_message(payload.as_ref())
                ));
                return trace.abort(SupervisorError::Initialization(fault));
            }
        }

        if let Some(cause) = run_flag.stop_cause() {
            tracing::info!(%cause, "stop requested before polling started");
            drop(poller);
            trace.enter(LifecycleState::Stopping);
            return terminate(controller, trace);
        }

        let cycle_delay = controller.cycle_delay();
        let worker = match PollingThread::spawn(
            &config.poll_thread_name,
            poller,
            run_flag.clone(),
            cycle_delay,
        ) {
            Ok(worker) => worker,
            Err(e) => {
                trace.record(SupervisorError::PollingThreadSpawn(e));
                run_flag.request_stop(StopCause::Internal);
                trace.enter(LifecycleState::Stopping);
                return terminate(controller, trace);
            }
        };
        trace.enter(LifecycleState::Polling);

        if wait_for_stop(&run_flag, config.stop_poll_interval, &worker) == WaitOutcome::PollerExited
        {
            tracing::error!("polling thread exited while the platform was running");
            run_flag.request_stop(StopCause::Internal);
        }
        if let Some(cause) = run_flag.stop_cause() {
            tracing::info!(%cause, "stop edge observed");
        }
        trace.enter(LifecycleState::Stopping);

        match worker.join() {
            Ok(poller) => drop(poller),
            Err(message) => trace.record(SupervisorError::PollingThreadPanicked(message)),
        }

        terminate(controller, trace)
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field(
                "stop_sources",
                &self.stop_sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("run_flag", &self.run_flag)
            .finish_non_exhaustive()
    }
}

/// Terminate the controller exactly once, then release it.
fn terminate(
    mut controller: Box<dyn PlatformController>,
    mut trace: LifecycleTrace,
) -> SupervisorResult {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| controller.terminate())) {
        Ok(outcome) => outcome,
        Err(payload) => Err(TerminationFault::Unknown(panic_message(payload.as_ref()))),
    };
    drop(controller);
    tracing::debug!("platform controller released");

    match outcome {
        Ok(code) => trace.finish(code),
        Err(fault) => {
            trace.record(fault.into());
            trace.finish(FAILURE_EXIT_CODE)
        }
    }
}

/// Visited states plus the first error of the run.
struct LifecycleTrace {
    states: Vec<LifecycleState>,
    flag: RunFlag,
    error: Option<SupervisorError>,
}

impl LifecycleTrace {
    fn new(flag: RunFlag) -> Self {
        Self {
            states: vec![LifecycleState::NotStarted],
            flag,
            error: None,
        }
    }

    fn current(&self) -> LifecycleState {
        self.states
            .last()
            .copied()
            .unwrap_or(LifecycleState::NotStarted)
    }

    fn enter(&mut self, to: LifecycleState) {
        let from = self.current();
        debug_assert!(
            from.can_transition_to(to),
            "invalid lifecycle transition: {from} -> {to}"
        );
        tracing::info!(%from, %to, "lifecycle transition");
        self.states.push(to);
    }

    fn record(&mut self, error: SupervisorError) {
        tracing::error!(state = %self.current(), "{error}");
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn abort(mut self, error: SupervisorError) -> SupervisorResult {
        self.record(error);
        self.finish(FAILURE_EXIT_CODE)
    }

    fn finish(mut self, code: i32) -> SupervisorResult {
        self.enter(LifecycleState::Terminated);
        let exit_code = if self.error.is_some() {
            FAILURE_EXIT_CODE
        } else {
            code
        };
        tracing::info!(exit_code, "supervisor finished");

        SupervisorResult {
            exit_code,
            transitions: self.states,
            stop_cause: self.flag.stop_cause(),
            error: self.error,
        }
    }
}
