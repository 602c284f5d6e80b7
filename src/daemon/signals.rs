//! Process signals: SIGHUP reloads, SIGTERM/SIGINT shut down.

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::core::errors::{BodewellError, Result};

/// What the daemon loop should do in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// SIGHUP: re-read the config file.
    Reload,
    /// SIGINT or SIGTERM.
    Shutdown,
}

impl DaemonSignal {
    /// Map a raw signal number.
    #[must_use]
    pub fn from_raw(signal: i32) -> Option<Self> {
        match signal {
            SIGHUP => Some(Self::Reload),
            SIGINT | SIGTERM => Some(Self::Shutdown),
            _ => None,
        }
    }
}

/// Blocking source of [`DaemonSignal`]s.
pub struct SignalSource {
    signals: Signals,
}

impl SignalSource {
    /// Register handlers for SIGHUP, SIGINT and SIGTERM.
    pub fn install() -> Result<Self> {
        let signals = Signals::new([SIGHUP, SIGINT, SIGTERM]).map_err(|err| BodewellError::Runtime {
            details: format!("failed to install signal handlers: {err}"),
        })?;
        Ok(Self { signals })
    }

    /// Block until the next signal the daemon acts on.
    pub fn wait(&mut self) -> Option<DaemonSignal> {
        self.signals.forever().find_map(DaemonSignal::from_raw)
    }
}
