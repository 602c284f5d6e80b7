//! Monitor state machine: `Initial -> Ok <-> Failed`.
//!
//! A probe drives its monitor through [`Monitor::fail`] and [`Monitor::clear`];
//! observers subscribe to the resulting [`MonitorEvent`]s. Once terminated, a
//! monitor is frozen and every mutator becomes a silent no-op.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;

/// Fields attached to an event (e.g. `dev`, `available`, `load`).
pub type EventData = BTreeMap<String, String>;

/// Observable monitor state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MonitorState {
    /// No sample taken yet.
    #[default]
    Initial,
    /// Last sample within threshold.
    Ok,
    /// Last sample outside threshold.
    Failed,
}

impl MonitorState {
    /// Lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by a [`Monitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Entered `Failed` (or explicit [`Monitor::alert`]).
    Alert(EventData),
    /// Left `Failed` for `Ok`.
    Cleared,
    /// Every `fail()` call, including repeats while already failed.
    Failure(EventData),
    /// The probe could not take a sample.
    Error(String),
}

impl MonitorEvent {
    /// Lowercase event name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Alert(_) => "alert",
            Self::Cleared => "cleared",
            Self::Failure(_) => "failure",
            Self::Error(_) => "error",
        }
    }
}

/// Boxed event observer.
pub type Subscriber = Box<dyn Fn(&MonitorEvent) + Send + Sync>;
type CancelHook = Box<dyn FnOnce() + Send>;

struct Inner {
    state: MonitorState,
    terminated: bool,
    cancel: Option<CancelHook>,
    subscribers: Vec<Subscriber>,
}

/// State machine for one probed condition.
pub struct Monitor {
    kind: String,
    inner: Mutex<Inner>,
}

impl Monitor {
    /// Monitor with a no-op cancel hook.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self::build(kind.into(), None)
    }

    /// Monitor whose `terminate` invokes `cancel` exactly once.
    #[must_use]
    pub fn with_cancel(kind: impl Into<String>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self::build(kind.into(), Some(Box::new(cancel)))
    }

    fn build(kind: String, cancel: Option<CancelHook>) -> Self {
        Self {
            kind,
            inner: Mutex::new(Inner {
                state: MonitorState::Initial,
                terminated: false,
                cancel,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Monitor type name (`disk`, `load`, ...).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.inner.lock().state
    }

    /// Whether `terminate` has run.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.lock().terminated
    }

    /// Register an observer. Subscribers run on the probe's thread while the
    /// monitor is locked, so they must not block or call back into it.
    pub fn subscribe(&self, subscriber: impl Fn(&MonitorEvent) + Send + Sync + 'static) {
        self.inner.lock().subscribers.push(Box::new(subscriber));
    }

    /// Sample within threshold.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        if inner.terminated {
            return;
        }
        let was_failed = inner.state == MonitorState::Failed;
        inner.state = MonitorState::Ok;
        if was_failed {
            emit(&inner, &MonitorEvent::Cleared);
        }
    }

    /// Sample outside threshold. Alerts only on the edge into `Failed`.
    pub fn fail(&self, data: EventData) {
        let mut inner = self.inner.lock();
        if inner.terminated {
            return;
        }
        let edge = inner.state != MonitorState::Failed;
        inner.state = MonitorState::Failed;
        if edge {
            emit(&inner, &MonitorEvent::Alert(data.clone()));
        }
        emit(&inner, &MonitorEvent::Failure(data));
    }

    /// Explicit alert, independent of state.
    pub fn alert(&self, data: EventData) {
        let inner = self.inner.lock();
        if !inner.terminated {
            emit(&inner, &MonitorEvent::Alert(data));
        }
    }

    /// Report a sampling fault. State is unchanged.
    pub fn error(&self, message: impl Into<String>) {
        let inner = self.inner.lock();
        if !inner.terminated {
            emit(&inner, &MonitorEvent::Error(message.into()));
        }
    }

    /// Stop the probe and freeze the monitor. Idempotent.
    ///
    /// Holding the lock while cancelling means no mutator can be mid-emission
    /// once this returns.
    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        if inner.terminated {
            return;
        }
        inner.terminated = true;
        if let Some(cancel) = inner.cancel.take() {
            cancel();
        }
    }
}

fn emit(inner: &Inner, event: &MonitorEvent) {
    for subscriber in &inner.subscribers {
        subscriber(event);
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Monitor")
            .field("kind", &self.kind)
            .field("state", &inner.state)
            .field("terminated", &inner.terminated)
            .field("subscribers", &inner.subscribers.len())
            .finish_non_exhaustive()
    }
}
