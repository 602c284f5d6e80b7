//! Monitor-type registry: `type name -> factory`.
//!
//! Built once at startup and handed to the server; the server looks a type up
//! each time it installs a monitor.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{BodewellError, Result};
use crate::core::size::ThresholdSpec;
use crate::monitor::disk::DiskFactory;
use crate::monitor::host::HostStats;
use crate::monitor::load::LoadFactory;
use crate::monitor::mem::MemFactory;
use crate::monitor::state::{Monitor, Subscriber};

/// Options for one monitor, as written under `[monitor.<name>]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorOptions {
    /// Registered monitor type.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Failure threshold; its meaning depends on the type.
    #[serde(default)]
    pub threshold: Option<ThresholdSpec>,
    /// Sampling interval in seconds.
    #[serde(default)]
    pub interval: Option<f64>,
    /// Alert template.
    #[serde(default)]
    pub text: Option<String>,
    /// Recovery template.
    #[serde(default)]
    pub recover: Option<String>,
    /// Type-specific fields (`dev`, `headroom`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl MonitorOptions {
    /// Options for monitor type `kind`.
    #[must_use]
    pub fn new(kind: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            ..Self::default()
        }
    }

    /// Set the threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: ThresholdSpec) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Interval in seconds, if set.
    #[must_use]
    pub fn interval_secs(&self) -> Option<f64> {
        self.interval
    }

    /// Interval as a duration; non-positive values are ignored.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// A type-specific field rendered as a string.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<String> {
        self.extra.get(key).map(|value| match value {
            toml::Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }

    /// A type-specific numeric field.
    pub fn extra_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.extra.get(key) {
            None => Ok(None),
            #[allow(clippy::cast_precision_loss)]
            Some(toml::Value::Integer(value)) => Ok(Some(*value as f64)),
            Some(toml::Value::Float(value)) => Ok(Some(*value)),
            Some(toml::Value::String(text)) => {
                text.trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| BodewellError::InvalidConfig {
                        details: format!("'{key}' must be numeric, got '{text}'"),
                    })
            }
            Some(other) => Err(BodewellError::InvalidConfig {
                details: format!("'{key}' must be numeric, got {other}"),
            }),
        }
    }
}

/// Builds monitors of one type.
pub trait MonitorFactory: Send + Sync {
    /// Check options without starting anything.
    fn validate(&self, opts: &MonitorOptions) -> Result<()>;

    /// Validate options and start a probe-backed monitor, with `observer`
    /// subscribed before its first sample.
    fn create(&self, opts: &MonitorOptions, observer: Subscriber) -> Result<Arc<Monitor>>;
}

/// Factory from a closure; validation is whatever `create` would reject.
struct FnFactory<F>(F);

impl<F> MonitorFactory for FnFactory<F>
where
    F: Fn(&MonitorOptions) -> Result<Arc<Monitor>> + Send + Sync,
{
    fn validate(&self, _opts: &MonitorOptions) -> Result<()> {
        Ok(())
    }

    fn create(&self, opts: &MonitorOptions, observer: Subscriber) -> Result<Arc<Monitor>> {
        let monitor = (self.0)(opts)?;
        monitor.subscribe(observer);
        Ok(monitor)
    }
}

/// Registry of monitor types.
#[derive(Default, Clone)]
pub struct MonitorTypes {
    factories: HashMap<String, Arc<dyn MonitorFactory>>,
}

impl MonitorTypes {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `disk`, `load` and `mem` types over `host`.
    #[must_use]
    pub fn builtin(host: &Arc<dyn HostStats>) -> Self {
        let mut types = Self::new();
        types
            .factories
            .insert("disk".to_string(), Arc::new(DiskFactory::new(Arc::clone(host))));
        types
            .factories
            .insert("load".to_string(), Arc::new(LoadFactory::new(Arc::clone(host))));
        types
            .factories
            .insert("mem".to_string(), Arc::new(MemFactory::new(Arc::clone(host))));
        types
    }

    /// Register `factory` under `kind`. Re-registering the same factory is a
    /// no-op; a different one is a conflict.
    pub fn register(&mut self, kind: &str, factory: Arc<dyn MonitorFactory>) -> Result<()> {
        if let Some(existing) = self.factories.get(kind) {
            if Arc::ptr_eq(existing, &factory) {
                return Ok(());
            }
            return Err(BodewellError::MonitorTypeConflict {
                kind: kind.to_string(),
            });
        }
        self.factories.insert(kind.to_string(), factory);
        Ok(())
    }

    /// Register a closure factory.
    pub fn register_fn<F>(&mut self, kind: &str, create: F) -> Result<()>
    where
        F: Fn(&MonitorOptions) -> Result<Arc<Monitor>> + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(FnFactory(create)))
    }

    /// Factory registered under `kind`.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<Arc<dyn MonitorFactory>> {
        self.factories.get(kind).cloned()
    }

    /// Whether `kind` is registered.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Resolve the factory for monitor `name`, checking `opts.type`.
    pub fn resolve(&self, name: &str, opts: &MonitorOptions) -> Result<Arc<dyn MonitorFactory>> {
        let kind = opts
            .kind
            .as_deref()
            .filter(|kind| !kind.is_empty())
            .ok_or_else(|| BodewellError::MissingMonitorType {
                name: name.to_string(),
            })?;
        self.get(kind).ok_or_else(|| BodewellError::UnknownMonitorType {
            name: name.to_string(),
            kind: kind.to_string(),
        })
    }
}

impl fmt::Debug for MonitorTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorTypes")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{MonitorOptions, MonitorTypes};
    use crate::monitor::host::HostStats;
    use crate::monitor::host::fake::FakeHost;
    use crate::monitor::state::{EventData, Monitor, MonitorEvent};

    #[test]
    fn builtin_types_are_registered() {
        let host: Arc<dyn HostStats> = Arc::new(FakeHost::default());
        let types = MonitorTypes::builtin(&host);
        assert_eq!(types.kinds(), vec!["disk", "load", "mem"]);
    }

    #[test]
    fn redefining_a_type_conflicts() {
        let mut types = MonitorTypes::new();
        types
            .register_fn("manual", |_| Ok(Arc::new(Monitor::new("manual"))))
            .expect("first");
        let err = types
            .register_fn("manual", |_| Ok(Arc::new(Monitor::new("manual"))))
            .expect_err("second");
        assert_eq!(err.code(), "BW-1101");

        let factory = types.get("manual").expect("registered");
        types.register("manual", factory).expect("same factory is idempotent");
    }

    #[test]
    fn closure_factories_subscribe_the_observer() {
        let mut types = MonitorTypes::new();
        types
            .register_fn("manual", |_| Ok(Arc::new(Monitor::new("manual"))))
            .expect("register");
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let monitor = types
            .get("manual")
            .expect("factory")
            .create(
                &MonitorOptions::new("manual"),
                Box::new(move |_: &MonitorEvent| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .expect("create");
        monitor.alert(EventData::new());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolve_reports_missing_and_unknown_types() {
        let types = MonitorTypes::new();
        let missing = types
            .resolve("root", &MonitorOptions::default())
            .err()
            .expect("missing");
        assert_eq!(missing.code(), "BW-1001");

        let unknown = types
            .resolve("root", &MonitorOptions::new("cpu"))
            .err()
            .expect("unknown");
        assert_eq!(unknown.code(), "BW-1002");
    }

    #[test]
    fn extra_fields_coerce() {
        let opts: MonitorOptions =
            toml::from_str("type = \"mem\"\nheadroom = 10\ndev = \"/var\"\nratio = \"0.5\"\nbad = true")
                .expect("parse");
        assert_eq!(opts.extra_f64("headroom").expect("int"), Some(10.0));
        assert_eq!(opts.extra_f64("ratio").expect("text"), Some(0.5));
        assert_eq!(opts.extra_str("dev").as_deref(), Some("/var"));
        assert!(opts.extra_f64("bad").is_err());
        assert_eq!(opts.extra_f64("absent").expect("absent"), None);
    }
}
