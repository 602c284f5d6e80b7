//! Monitoring: the monitor state machine, probe runtime, built-in disk/load/mem
//! probes and the monitor-type registry.

pub mod disk;
pub mod host;
pub mod load;
pub mod mem;
pub mod probe;
pub mod state;
pub mod types;

pub use host::{HostStats, SystemHost};
pub use state::{EventData, Monitor, MonitorEvent, MonitorState};
pub use types::{MonitorFactory, MonitorOptions, MonitorTypes};
