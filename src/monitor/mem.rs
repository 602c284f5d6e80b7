//! Free memory probe with clear-side headroom.
//!
//! Fails below the threshold but, once failed, only clears when available
//! memory is back above the threshold raised by `headroom` percent. Inside that
//! band a failed monitor stays failed without re-reporting.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::errors::{BodewellError, Result};
use crate::core::size::{Threshold, format_bytes};
use crate::monitor::host::{HostStats, MemoryInfo};
use crate::monitor::probe::{Probe, spawn_probe};
use crate::monitor::state::{EventData, Monitor, MonitorState, Subscriber};
use crate::monitor::types::{MonitorFactory, MonitorOptions};

const DEFAULT_HEADROOM_PCT: f64 = 5.0;
const OK_INTERVAL: Duration = Duration::from_millis(1500);
const FAILED_INTERVAL: Duration = Duration::from_secs(15);

/// Parsed `mem` options.
#[derive(Debug, Clone, PartialEq)]
pub struct MemSettings {
    /// Minimum available memory.
    pub threshold: Threshold,
    /// Extra margin in percent required before a failed monitor clears.
    pub headroom_pct: f64,
}

impl MemSettings {
    /// Parse `mem` options; `threshold` is required.
    pub fn from_options(opts: &MonitorOptions) -> Result<Self> {
        let spec = opts
            .threshold
            .as_ref()
            .ok_or(BodewellError::MissingThreshold { kind: "mem" })?;
        let headroom_pct = opts.extra_f64("headroom")?.unwrap_or(DEFAULT_HEADROOM_PCT);
        if !(headroom_pct.is_finite() && headroom_pct >= 0.0) {
            return Err(BodewellError::InvalidConfig {
                details: format!("headroom must be a non-negative percentage, got {headroom_pct}"),
            });
        }
        Ok(Self {
            threshold: Threshold::parse(spec)?,
            headroom_pct,
        })
    }

    fn failed(&self, info: MemoryInfo) -> bool {
        self.threshold.below(info.available_bytes, info.total_bytes)
    }

    fn cleared(&self, info: MemoryInfo) -> bool {
        let factor = 1.0 + self.headroom_pct / 100.0;
        self.threshold
            .exceeded_by(info.available_bytes, info.total_bytes, factor)
    }
}

/// Samples available memory.
pub struct MemProbe {
    host: Arc<dyn HostStats>,
    settings: MemSettings,
}

impl MemProbe {
    /// Probe over `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostStats>, settings: MemSettings) -> Self {
        Self { host, settings }
    }
}

impl Probe for MemProbe {
    fn sample(&mut self, monitor: &Monitor) -> Duration {
        debug!("taking a memory sample");
        match self.host.memory() {
            Err(err) => monitor.error(err.to_string()),
            Ok(info) if self.settings.failed(info) => monitor.fail(EventData::from([
                ("available".to_string(), format_bytes(info.available_bytes)),
                ("total".to_string(), format_bytes(info.total_bytes)),
                ("threshold".to_string(), self.settings.threshold.to_string()),
            ])),
            Ok(info) if monitor.state() != MonitorState::Failed || self.settings.cleared(info) => {
                monitor.clear();
            }
            Ok(_) => {}
        }

        if monitor.state() == MonitorState::Failed {
            FAILED_INTERVAL
        } else {
            OK_INTERVAL
        }
    }
}

/// Factory registered as `mem`.
pub struct MemFactory {
    host: Arc<dyn HostStats>,
}

impl MemFactory {
    /// Factory over `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostStats>) -> Self {
        Self { host }
    }
}

impl MonitorFactory for MemFactory {
    fn validate(&self, opts: &MonitorOptions) -> Result<()> {
        MemSettings::from_options(opts).map(|_| ())
    }

    fn create(&self, opts: &MonitorOptions, observer: Subscriber) -> Result<Arc<Monitor>> {
        let settings = MemSettings::from_options(opts)?;
        spawn_probe(
            "mem",
            MemProbe::new(Arc::clone(&self.host), settings),
            Duration::ZERO,
            observer,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{FAILED_INTERVAL, MemProbe, MemSettings, OK_INTERVAL};
    use crate::core::errors::BodewellError;
    use crate::core::size::Threshold;
    use crate::monitor::host::MemoryInfo;
    use crate::monitor::host::fake::FakeHost;
    use crate::monitor::probe::Probe;
    use crate::monitor::state::{Monitor, MonitorState};
    use crate::monitor::types::MonitorOptions;

    const MIB: u64 = 1 << 20;

    fn info(available_mib: u64) -> MemoryInfo {
        MemoryInfo {
            total_bytes: 1024 * MIB,
            available_bytes: available_mib * MIB,
        }
    }

    #[test]
    fn headroom_defaults_and_parses() {
        let opts: MonitorOptions =
            toml::from_str("type = \"mem\"\nthreshold = \"100MiB\"").expect("parse");
        let settings = MemSettings::from_options(&opts).expect("settings");
        assert!((settings.headroom_pct - 5.0).abs() < f64::EPSILON);

        let opts: MonitorOptions =
            toml::from_str("type = \"mem\"\nthreshold = 0.1\nheadroom = 20").expect("parse");
        let settings = MemSettings::from_options(&opts).expect("settings");
        assert_eq!(settings.threshold, Threshold::Ratio(0.1));
        assert!((settings.headroom_pct - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clears_only_past_headroom() {
        let host = Arc::new(FakeHost::default());
        host.memory.lock().extend([Ok(info(90)), Ok(info(103)), Ok(info(106))]);
        let mut probe = MemProbe::new(
            Arc::clone(&host) as _,
            MemSettings {
                threshold: Threshold::Bytes(100 * MIB),
                headroom_pct: 5.0,
            },
        );
        let monitor = Monitor::new("mem");

        assert_eq!(probe.sample(&monitor), FAILED_INTERVAL);
        assert_eq!(monitor.state(), MonitorState::Failed);
        // 103 MiB is above the threshold but inside the 5% band.
        assert_eq!(probe.sample(&monitor), FAILED_INTERVAL);
        assert_eq!(monitor.state(), MonitorState::Failed);
        assert_eq!(probe.sample(&monitor), OK_INTERVAL);
        assert_eq!(monitor.state(), MonitorState::Ok);
    }

    #[test]
    fn band_does_not_hold_a_healthy_monitor() {
        let host = Arc::new(FakeHost::default());
        host.memory.lock().push_back(Ok(info(102)));
        let mut probe = MemProbe::new(
            Arc::clone(&host) as _,
            MemSettings {
                threshold: Threshold::Bytes(100 * MIB),
                headroom_pct: 5.0,
            },
        );
        let monitor = Monitor::new("mem");

        probe.sample(&monitor);
        assert_eq!(monitor.state(), MonitorState::Ok);
    }

    #[test]
    fn errors_keep_sampling_on_ok_schedule() {
        let host = Arc::new(FakeHost::default());
        host.memory.lock().push_back(Err(BodewellError::Sample {
            probe: "mem",
            details: "meminfo unreadable".to_string(),
        }));
        let mut probe = MemProbe::new(
            Arc::clone(&host) as _,
            MemSettings {
                threshold: Threshold::Bytes(MIB),
                headroom_pct: 5.0,
            },
        );
        let monitor = Monitor::new("mem");
        assert_eq!(probe.sample(&monitor), OK_INTERVAL);
        assert_eq!(monitor.state(), MonitorState::Initial);
    }
}
