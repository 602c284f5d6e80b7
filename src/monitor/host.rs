//! Host statistics consumed by the built-in probes.
//!
//! Probes only see the [`HostStats`] trait; [`SystemHost`] is the production
//! adapter backed by `sysinfo` and `statvfs`.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sysinfo::{Disks, System};

use crate::core::errors::{BodewellError, Result};

/// Space on one mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskUsage {
    /// Block device or filesystem source.
    pub device: String,
    /// Mount point.
    pub mount: PathBuf,
    /// Bytes available to unprivileged users.
    pub available_bytes: u64,
    /// Filesystem size in bytes.
    pub total_bytes: u64,
}

/// Memory snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Physical memory in bytes.
    pub total_bytes: u64,
    /// Memory available for new allocations.
    pub available_bytes: u64,
}

/// Narrow view of the host used by probes and message formatting.
pub trait HostStats: Send + Sync {
    /// Short host name used in messages.
    fn hostname(&self) -> String;
    /// All mounted filesystems whose mount point is absolute.
    fn disks(&self) -> Result<Vec<DiskUsage>>;
    /// Usage of the filesystem containing `path`.
    fn disk(&self, path: &Path) -> Result<DiskUsage>;
    /// 1, 5 and 15 minute load averages.
    fn load_average(&self) -> Result<[f64; 3]>;
    /// Current memory totals.
    fn memory(&self) -> Result<MemoryInfo>;
}

/// Live host backed by `sysinfo` and `statvfs`.
pub struct SystemHost {
    system: Mutex<System>,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemHost {
    /// Host with lazily refreshed `sysinfo` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl HostStats for SystemHost {
    fn hostname(&self) -> String {
        System::host_name().unwrap_or_else(|| "localhost".to_string())
    }

    fn disks(&self) -> Result<Vec<DiskUsage>> {
        let disks = Disks::new_with_refreshed_list();
        let usage: Vec<DiskUsage> = disks
            .list()
            .iter()
            .filter(|disk| disk.mount_point().is_absolute())
            .map(|disk| DiskUsage {
                device: disk.name().to_string_lossy().into_owned(),
                mount: disk.mount_point().to_path_buf(),
                available_bytes: disk.available_space(),
                total_bytes: disk.total_space(),
            })
            .collect();
        if usage.is_empty() {
            return Err(BodewellError::Sample {
                probe: "disk",
                details: "no mounted filesystems found".to_string(),
            });
        }
        Ok(usage)
    }

    #[cfg(unix)]
    #[allow(clippy::unnecessary_cast, clippy::useless_conversion)]
    fn disk(&self, path: &Path) -> Result<DiskUsage> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|errno| BodewellError::Sample {
            probe: "disk",
            details: format!("statvfs {}: {errno}", path.display()),
        })?;
        let fragment = stat.fragment_size() as u64;
        // Device name from the deepest mount containing `path`.
        let device = Disks::new_with_refreshed_list()
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map_or_else(
                || path.display().to_string(),
                |disk| disk.name().to_string_lossy().into_owned(),
            );
        Ok(DiskUsage {
            device,
            mount: path.to_path_buf(),
            available_bytes: (stat.blocks_available() as u64).saturating_mul(fragment),
            total_bytes: (stat.blocks() as u64).saturating_mul(fragment),
        })
    }

    #[cfg(not(unix))]
    fn disk(&self, path: &Path) -> Result<DiskUsage> {
        self.disks()?
            .into_iter()
            .filter(|disk| path.starts_with(&disk.mount))
            .max_by_key(|disk| disk.mount.as_os_str().len())
            .ok_or_else(|| BodewellError::Sample {
                probe: "disk",
                details: format!("no filesystem contains {}", path.display()),
            })
    }

    fn load_average(&self) -> Result<[f64; 3]> {
        let load = System::load_average();
        Ok([load.one, load.five, load.fifteen])
    }

    fn memory(&self) -> Result<MemoryInfo> {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total_bytes = system.total_memory();
        if total_bytes == 0 {
            return Err(BodewellError::Sample {
                probe: "mem",
                details: "memory statistics unavailable".to_string(),
            });
        }
        Ok(MemoryInfo {
            total_bytes,
            available_bytes: system.available_memory(),
        })
    }
}
