//! Shared test doubles for supervisor integration tests.
//!
//! Every double writes into a [`CallLog`] so tests can assert on ordering
//! across threads: which collaborator was called, and when.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use exm_core::credentials::{CredentialError, CredentialGate};
use exm_core::{
    Arguments, ConfigKind, InitializationFault, PlatformController, Poller, TerminationFault,
};

// ---------------------------------------------------------------------------
// Call log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Initialize,
    /// Recorded when a `try_poll` call returns.
    Poll,
    Terminate,
}

#[derive(Debug, Clone, Copy)]
pub struct Call {
    pub kind: CallKind,
    pub at: Instant,
}

/// Thread-safe, append-only record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: CallKind) {
        self.lock().push(Call {
            kind,
            at: Instant::now(),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().clone()
    }

    pub fn kinds(&self) -> Vec<CallKind> {
        self.lock().iter().map(|c| c.kind).collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.lock().iter().filter(|c| c.kind == kind).count()
    }

    pub fn first(&self, kind: CallKind) -> Option<Instant> {
        self.lock().iter().find(|c| c.kind == kind).map(|c| c.at)
    }

    pub fn last(&self, kind: CallKind) -> Option<Instant> {
        self.lock().iter().rev().find(|c| c.kind == kind).map(|c| c.at)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Call>> {
        // A panicking double poisons the lock; the log itself stays usable.
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Platform controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitBehavior {
    Succeed,
    Fail,
    Panic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateBehavior {
    Return(i32),
    Fail,
    Panic,
}

/// Controller that logs its calls and behaves as scripted.
#[derive(Debug)]
pub struct RecordingController {
    log: CallLog,
    init: InitBehavior,
    terminate: TerminateBehavior,
    cycle_delay: Duration,
}

impl RecordingController {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            init: InitBehavior::Succeed,
            terminate: TerminateBehavior::Return(0),
            cycle_delay: Duration::from_millis(5),
        }
    }

    pub fn on_initialize(mut self, behavior: InitBehavior) -> Self {
        self.init = behavior;
        self
    }

    pub fn on_terminate(mut self, behavior: TerminateBehavior) -> Self {
        self.terminate = behavior;
        self
    }

    pub fn cycle_delay(mut self, delay: Duration) -> Self {
        self.cycle_delay = delay;
        self
    }
}

impl PlatformController for RecordingController {
    fn initialize(&mut self, _arguments: &Arguments) -> Result<(), InitializationFault> {
        self.log.record(CallKind::Initialize);
        match self.init {
            InitBehavior::Succeed => Ok(()),
            InitBehavior::Fail => Err(InitializationFault::new("scripted initialization failure")),
            InitBehavior::Panic => panic!("scripted initialization panic"),
        }
    }

    fn terminate(&mut self) -> Result<i32, TerminationFault> {
        self.log.record(CallKind::Terminate);
        match self.terminate {
            TerminateBehavior::Return(code) => Ok(code),
            TerminateBehavior::Fail => Err(TerminationFault::Known(
                "scripted termination failure".to_string(),
            )),
            TerminateBehavior::Panic => panic!("scripted termination panic"),
        }
    }

    fn cycle_delay(&self) -> Duration {
        self.cycle_delay
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Poller that takes a fixed time per pass and can be told to panic.
#[derive(Debug)]
pub struct RecordingPoller {
    log: CallLog,
    poll_duration: Duration,
    panic_after: Option<usize>,
    completed: usize,
}

impl RecordingPoller {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            poll_duration: Duration::ZERO,
            panic_after: None,
            completed: 0,
        }
    }

    pub fn poll_duration(mut self, duration: Duration) -> Self {
        self.poll_duration = duration;
        self
    }

    /// Panic on the pass after `polls` completed passes.
    pub fn panic_after(mut self, polls: usize) -> Self {
        self.panic_after = Some(polls);
        self
    }
}

impl Poller for RecordingPoller {
    fn try_poll(&mut self) {
        if self.panic_after == Some(self.completed) {
            panic!("scripted poller panic");
        }
        if !self.poll_duration.is_zero() {
            thread::sleep(self.poll_duration);
        }
        self.completed += 1;
        self.log.record(CallKind::Poll);
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Scripted answer for one credential prompt.
#[derive(Debug, Clone)]
pub enum Answer {
    Value(String),
    Empty,
    Cancelled,
}

impl Answer {
    pub fn value(s: impl Into<String>) -> Self {
        Answer::Value(s.into())
    }

    fn resolve(&self) -> Result<String, CredentialError> {
        match self {
            Answer::Value(v) => Ok(v.clone()),
            Answer::Empty => Ok(String::new()),
            Answer::Cancelled => Err(CredentialError::Cancelled),
        }
    }
}

/// Credential gate with scripted answers. Counts how often each prompt ran.
#[derive(Debug, Clone)]
pub struct ScriptedCredentials {
    api_key: Answer,
    bearer_token: Answer,
    asked: Arc<Mutex<(usize, usize)>>,
}

impl ScriptedCredentials {
    pub fn new(api_key: Answer, bearer_token: Answer) -> Self {
        Self {
            api_key,
            bearer_token,
            asked: Arc::new(Mutex::new((0, 0))),
        }
    }

    pub fn valid() -> Self {
        Self::new(Answer::value("vcc-api-key"), Answer::value("bearer-token"))
    }

    /// `(api key prompts, bearer token prompts)` so far.
    pub fn prompts(&self) -> (usize, usize) {
        *self.asked.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self, api_key: bool) {
        let mut asked = self.asked.lock().unwrap_or_else(|e| e.into_inner());
        if api_key {
            asked.0 += 1;
        } else {
            asked.1 += 1;
        }
    }
}

impl CredentialGate for ScriptedCredentials {
    fn acquire_api_key(&mut self) -> Result<String, CredentialError> {
        self.bump(true);
        self.api_key.resolve()
    }

    fn acquire_bearer_token(&mut self) -> Result<String, CredentialError> {
        self.bump(false);
        self.bearer_token.resolve()
    }
}

// ---------------------------------------------------------------------------
// Manifests
// ---------------------------------------------------------------------------

/// Temporary directory holding one manifest file per [`ConfigKind`].
///
/// The paths are in positional order.
pub fn manifest_dir() -> (tempfile::TempDir, Vec<PathBuf>) {
    let dir = tempfile::TempDir::new().expect("failed to create manifest dir");
    let paths = ConfigKind::ALL
        .iter()
        .map(|kind| {
            let path = dir.path().join(format!("{}.arxml", kind.placeholder()));
            std::fs::write(&path, "<AUTOSAR/>").expect("failed to write manifest");
            path
        })
        .collect();
    (dir, paths)
}

/// Four placeholder arguments for doubles that ignore the paths.
pub fn placeholder_args() -> Vec<String> {
    ConfigKind::ALL
        .iter()
        .map(|kind| kind.placeholder().to_string())
        .collect()
}
