use std::sync::Mutex;

use super::log::{ActionLog, LogEntry, lock};
use super::state::State;

/// Multi-step data accumulated while the session stays inside one family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scratch {
    /// Username and password have been typed into the login form.
    pub credentials_entered: bool,
    /// Captcha solves attempted since the credentials were entered.
    pub captcha_attempts: u32,
}

struct Inner {
    current: State,
    scratch: Scratch,
}

/// The current workflow state of one session.
///
/// A single mutex guards the state and the scratch data together, so a
/// family change and the scratch reset it implies happen atomically. Nothing
/// in here performs I/O.
pub struct StateModel {
    inner: Mutex<Inner>,
    log: ActionLog,
}

impl StateModel {
    pub fn new(instance_id: u32, log_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: State::Initialized,
                scratch: Scratch::default(),
            }),
            log: ActionLog::new(instance_id, log_capacity),
        }
    }

    pub fn read(&self) -> State {
        lock(&self.inner).current
    }

    /// Replace the current state. Returns `true` if it changed.
    ///
    /// Terminal states are never left.
    pub fn write(&self, next: State) -> bool {
        self.write_if(next, |_| true)
    }

    /// Move `from` → `to` only if the state is still `from`.
    pub fn advance(&self, from: State, to: State) -> bool {
        self.write_if(to, |current| current == from)
    }

    /// Write `target` unless the current state already belongs to its family.
    pub fn write_unless_family(&self, target: State) -> bool {
        self.write_if(target, |current| current.family() != target.family())
    }

    fn write_if(&self, next: State, allowed: impl FnOnce(State) -> bool) -> bool {
        {
            let mut inner = lock(&self.inner);
            let current = inner.current;
            if current == next || current.is_terminal() || !allowed(current) {
                return false;
            }
            if current.family() != next.family() {
                inner.scratch = Scratch::default();
            }
            inner.current = next;
        }
        self.log
            .record(next, format!("State changed to: {next}"), false, true);
        true
    }

    /// Read or update the scratch data under the state lock.
    pub fn scratch<R>(&self, f: impl FnOnce(&mut Scratch) -> R) -> R {
        f(&mut lock(&self.inner).scratch)
    }

    /// Append an informational entry tagged with the current state.
    pub fn note(&self, message: impl Into<String>) {
        self.log.record(self.read(), message, false, false);
    }

    /// Append an error entry tagged with the current state.
    pub fn note_error(&self, message: impl Into<String>) {
        self.log.record(self.read(), message, true, false);
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.log.snapshot()
    }
}
