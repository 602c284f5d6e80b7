//! Disk space probe.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::errors::{BodewellError, Result};
use crate::core::size::{Threshold, format_bytes};
use crate::monitor::host::{DiskUsage, HostStats};
use crate::monitor::probe::{Probe, spawn_probe};
use crate::monitor::state::{EventData, Monitor, Subscriber};
use crate::monitor::types::{MonitorFactory, MonitorOptions};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Parsed `disk` options.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskSettings {
    /// Minimum free space.
    pub threshold: Threshold,
    /// Single mount to check; every mount when unset.
    pub dev: Option<PathBuf>,
    /// Delay between samples.
    pub interval: Duration,
}

impl DiskSettings {
    /// Parse `disk` options; `threshold` is required.
    pub fn from_options(opts: &MonitorOptions) -> Result<Self> {
        let spec = opts
            .threshold
            .as_ref()
            .ok_or(BodewellError::MissingThreshold { kind: "disk" })?;
        Ok(Self {
            threshold: Threshold::parse(spec)?,
            dev: opts.extra_str("dev").map(PathBuf::from),
            interval: opts.interval().unwrap_or(DEFAULT_INTERVAL),
        })
    }
}

/// Samples free space on one mount or on all of them.
pub struct DiskProbe {
    host: Arc<dyn HostStats>,
    settings: DiskSettings,
}

impl DiskProbe {
    /// Probe over `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostStats>, settings: DiskSettings) -> Self {
        Self { host, settings }
    }

    fn usage(&self) -> Result<Vec<DiskUsage>> {
        match &self.settings.dev {
            Some(dev) => self.host.disk(dev).map(|usage| vec![usage]),
            None => self.host.disks(),
        }
    }

    fn event_data(&self, usage: &DiskUsage) -> EventData {
        EventData::from([
            ("dev".to_string(), usage.device.clone()),
            ("mount".to_string(), usage.mount.display().to_string()),
            ("available".to_string(), format_bytes(usage.available_bytes)),
            ("total".to_string(), format_bytes(usage.total_bytes)),
            ("threshold".to_string(), self.settings.threshold.to_string()),
        ])
    }
}

impl Probe for DiskProbe {
    fn sample(&mut self, monitor: &Monitor) -> Duration {
        debug!(
            dev = %self.settings.dev.as_ref().map_or_else(|| "all devices".to_string(), |dev| dev.display().to_string()),
            "taking a disk sample"
        );
        match self.usage() {
            Err(err) => monitor.error(err.to_string()),
            Ok(disks) => {
                let failing: Vec<&DiskUsage> = disks
                    .iter()
                    .filter(|usage| {
                        self.settings
                            .threshold
                            .below(usage.available_bytes, usage.total_bytes)
                    })
                    .collect();
                if failing.is_empty() {
                    monitor.clear();
                }
                for usage in failing {
                    monitor.fail(self.event_data(usage));
                }
            }
        }
        self.settings.interval
    }
}

/// Factory registered as `disk`.
pub struct DiskFactory {
    host: Arc<dyn HostStats>,
}

impl DiskFactory {
    /// Factory over `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostStats>) -> Self {
        Self { host }
    }
}

impl MonitorFactory for DiskFactory {
    fn validate(&self, opts: &MonitorOptions) -> Result<()> {
        DiskSettings::from_options(opts).map(|_| ())
    }

    fn create(&self, opts: &MonitorOptions, observer: Subscriber) -> Result<Arc<Monitor>> {
        let settings = DiskSettings::from_options(opts)?;
        spawn_probe(
            "disk",
            DiskProbe::new(Arc::clone(&self.host), settings),
            Duration::ZERO,
            observer,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::{DiskProbe, DiskSettings};
    use crate::core::size::{Threshold, ThresholdSpec};
    use crate::monitor::host::fake::FakeHost;
    use crate::monitor::probe::Probe;
    use crate::monitor::state::{Monitor, MonitorEvent, MonitorState};
    use crate::monitor::types::MonitorOptions;

    const GIB: u64 = 1 << 30;

    fn probe(host: &Arc<FakeHost>, threshold: &str, dev: Option<&str>) -> DiskProbe {
        DiskProbe::new(
            Arc::clone(host) as _,
            DiskSettings {
                threshold: Threshold::parse(&ThresholdSpec::Text(threshold.to_string()))
                    .expect("threshold"),
                dev: dev.map(PathBuf::from),
                interval: Duration::from_secs(5),
            },
        )
    }

    fn recorded(monitor: &Monitor) -> Arc<Mutex<Vec<MonitorEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        monitor.subscribe(move |event| sink.lock().push(event.clone()));
        events
    }

    #[test]
    fn settings_require_threshold() {
        let err = DiskSettings::from_options(&MonitorOptions::new("disk")).expect_err("missing");
        assert_eq!(err.code(), "BW-1003");

        let opts: MonitorOptions =
            toml::from_str("type = \"disk\"\nthreshold = \"10GiB\"\ndev = \"/var\"\ninterval = 2")
                .expect("parse");
        let settings = DiskSettings::from_options(&opts).expect("settings");
        assert_eq!(settings.threshold, Threshold::Bytes(10 * GIB));
        assert_eq!(settings.dev, Some(PathBuf::from("/var")));
        assert_eq!(settings.interval, Duration::from_secs(2));
    }

    #[test]
    fn every_failing_disk_fails_once_alert_once() {
        let host = Arc::new(FakeHost::default());
        *host.disks.lock() = vec![
            FakeHost::disk("/", GIB, 100 * GIB),
            FakeHost::disk("/home", 50 * GIB, 100 * GIB),
            FakeHost::disk("/var", 2 * GIB, 100 * GIB),
        ];
        let monitor = Monitor::new("disk");
        let events = recorded(&monitor);

        let delay = probe(&host, "5GiB", None).sample(&monitor);
        assert_eq!(delay, Duration::from_secs(5));
        assert_eq!(monitor.state(), MonitorState::Failed);

        let events = events.lock();
        let kinds: Vec<_> = events.iter().map(MonitorEvent::kind).collect();
        assert_eq!(kinds, vec!["alert", "failure", "failure"]);
        let MonitorEvent::Alert(data) = &events[0] else {
            panic!("expected alert first");
        };
        assert_eq!(data["mount"], "/");
        assert_eq!(data["available"], "1 GiB");
    }

    #[test]
    fn ratio_threshold_clears_when_space_returns() {
        let host = Arc::new(FakeHost::default());
        *host.disks.lock() = vec![FakeHost::disk("/", 5 * GIB, 100 * GIB)];
        let monitor = Monitor::new("disk");
        let events = recorded(&monitor);
        let mut probe = probe(&host, "10%", Some("/"));

        probe.sample(&monitor);
        assert_eq!(monitor.state(), MonitorState::Failed);

        *host.disks.lock() = vec![FakeHost::disk("/", 20 * GIB, 100 * GIB)];
        probe.sample(&monitor);
        assert_eq!(monitor.state(), MonitorState::Ok);
        assert_eq!(events.lock().last(), Some(&MonitorEvent::Cleared));
    }

    #[test]
    fn sample_errors_surface_as_error_events() {
        let host = Arc::new(FakeHost::default());
        *host.fail_disks.lock() = true;
        let monitor = Monitor::new("disk");
        let events = recorded(&monitor);

        probe(&host, "1GiB", None).sample(&monitor);
        assert_eq!(monitor.state(), MonitorState::Initial);
        assert!(matches!(events.lock().as_slice(), [MonitorEvent::Error(msg)] if msg.contains("BW-2001")));
    }
}
