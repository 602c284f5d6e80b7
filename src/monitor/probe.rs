//! Probe runtime: one cancellable sampling thread per monitor.
//!
//! The monitor's cancel hook drops the sender half of a channel; the sampling
//! loop waits on the receiver between samples, so cancellation wakes it
//! immediately and no further sample starts.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use tracing::{debug, trace};

use crate::core::errors::{BodewellError, Result};
use crate::monitor::state::{Monitor, Subscriber};

/// A background sampler driving one monitor.
pub trait Probe: Send + 'static {
    /// Take one sample, calling `monitor.clear()`, `monitor.fail(..)` or
    /// `monitor.error(..)`. Returns the delay before the next sample.
    fn sample(&mut self, monitor: &Monitor) -> Duration;
}

/// Spawn `probe` on a named thread and return the monitor it drives.
///
/// `observer` is subscribed before the thread starts, so it sees the first
/// sample. The first sample runs after `first_delay`.
pub fn spawn_probe<P: Probe>(
    kind: &str,
    mut probe: P,
    first_delay: Duration,
    observer: Subscriber,
) -> Result<Arc<Monitor>> {
    let (cancel_tx, cancel_rx) = bounded::<()>(1);
    let monitor = Arc::new(Monitor::with_cancel(kind, move || drop(cancel_tx)));
    monitor.subscribe(observer);

    let sampled = Arc::clone(&monitor);
    let thread_kind = kind.to_string();
    thread::Builder::new()
        .name(format!("bodewell-probe-{kind}"))
        .spawn(move || {
            let mut delay = first_delay;
            loop {
                match cancel_rx.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                trace!(probe = %thread_kind, "taking sample");
                delay = probe.sample(&sampled);
            }
            debug!(probe = %thread_kind, "probe stopped");
        })
        .map_err(|err| BodewellError::Runtime {
            details: format!("failed to spawn {kind} probe thread: {err}"),
        })?;

    Ok(monitor)
}
