//! Load average probe.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::errors::{BodewellError, Result};
use crate::monitor::host::HostStats;
use crate::monitor::probe::{Probe, spawn_probe};
use crate::monitor::state::{EventData, Monitor, MonitorState, Subscriber};
use crate::monitor::types::{MonitorFactory, MonitorOptions};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
const FAILED_INTERVAL: Duration = Duration::from_secs(3);

/// Parsed `load` options.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSettings {
    /// Load average that counts as failing.
    pub threshold: f64,
    /// Delay between samples while healthy.
    pub interval: Duration,
}

impl LoadSettings {
    /// Parse `load` options; `threshold` is required.
    pub fn from_options(opts: &MonitorOptions) -> Result<Self> {
        let spec = opts
            .threshold
            .as_ref()
            .ok_or(BodewellError::MissingThreshold { kind: "load" })?;
        Ok(Self {
            threshold: spec.as_float()?,
            interval: opts.interval().unwrap_or(DEFAULT_INTERVAL),
        })
    }
}

/// Samples the 1, 5 and 15 minute load averages.
pub struct LoadProbe {
    host: Arc<dyn HostStats>,
    settings: LoadSettings,
}

impl LoadProbe {
    /// Probe over `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostStats>, settings: LoadSettings) -> Self {
        Self { host, settings }
    }
}

impl Probe for LoadProbe {
    fn sample(&mut self, monitor: &Monitor) -> Duration {
        debug!("taking a load sample");
        match self.host.load_average() {
            Err(err) => monitor.error(err.to_string()),
            Ok(loads) => {
                let threshold = self.settings.threshold;
                let exceeding: Vec<f64> = loads.into_iter().filter(|load| *load > threshold).collect();
                if exceeding.is_empty() {
                    monitor.clear();
                }
                for load in exceeding {
                    monitor.fail(EventData::from([
                        ("load".to_string(), format!("{load:.2}")),
                        ("threshold".to_string(), format!("{threshold:.2}")),
                    ]));
                }
            }
        }

        if monitor.state() == MonitorState::Failed {
            FAILED_INTERVAL
        } else {
            self.settings.interval
        }
    }
}

/// Factory registered as `load`.
pub struct LoadFactory {
    host: Arc<dyn HostStats>,
}

impl LoadFactory {
    /// Factory over `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostStats>) -> Self {
        Self { host }
    }
}

impl MonitorFactory for LoadFactory {
    fn validate(&self, opts: &MonitorOptions) -> Result<()> {
        LoadSettings::from_options(opts).map(|_| ())
    }

    fn create(&self, opts: &MonitorOptions, observer: Subscriber) -> Result<Arc<Monitor>> {
        let settings = LoadSettings::from_options(opts)?;
        spawn_probe(
            "load",
            LoadProbe::new(Arc::clone(&self.host), settings),
            Duration::ZERO,
            observer,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::{FAILED_INTERVAL, LoadProbe, LoadSettings};
    use crate::core::size::ThresholdSpec;
    use crate::monitor::host::fake::FakeHost;
    use crate::monitor::probe::Probe;
    use crate::monitor::state::{Monitor, MonitorEvent, MonitorState};
    use crate::monitor::types::MonitorOptions;

    #[test]
    fn threshold_is_required_and_numeric() {
        assert_eq!(
            LoadSettings::from_options(&MonitorOptions::new("load"))
                .expect_err("missing")
                .code(),
            "BW-1003"
        );
        let bad = MonitorOptions::new("load").with_threshold(ThresholdSpec::Text("lots".to_string()));
        assert_eq!(LoadSettings::from_options(&bad).expect_err("bad").code(), "BW-1004");
    }

    #[test]
    fn backs_off_while_failed() {
        let host = Arc::new(FakeHost::default());
        host.loads.lock().extend([[4.5, 3.0, 1.0], [5.0, 4.5, 2.0], [0.5, 0.5, 0.5]]);
        let mut probe = LoadProbe::new(
            Arc::clone(&host) as _,
            LoadSettings {
                threshold: 4.0,
                interval: Duration::from_millis(100),
            },
        );
        let monitor = Monitor::new("load");
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        monitor.subscribe(move |event: &MonitorEvent| sink.lock().push(event.kind()));

        assert_eq!(probe.sample(&monitor), FAILED_INTERVAL);
        assert_eq!(probe.sample(&monitor), FAILED_INTERVAL);
        assert_eq!(probe.sample(&monitor), Duration::from_millis(100));
        assert_eq!(monitor.state(), MonitorState::Ok);

        assert_eq!(
            *events.lock(),
            vec!["alert", "failure", "failure", "failure", "cleared"]
        );
    }
}
