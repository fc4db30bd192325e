use crate::error::{BridgeError, Result};
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Raw resource usage of the current process
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub rss_bytes: u64,
    pub total_memory_bytes: u64,
    pub cpu_percent: f32,
}

impl ResourceUsage {
    pub fn memory_mb(&self) -> f64 {
        self.rss_bytes as f64 / (1024.0 * 1024.0)
    }

    /// RSS as a fraction of total system memory, 0 when the total is unknown
    pub fn memory_fraction(&self) -> f64 {
        if self.total_memory_bytes == 0 {
            0.0
        } else {
            self.rss_bytes as f64 / self.total_memory_bytes as f64
        }
    }
}

/// Source of process resource readings
#[cfg_attr(test, mockall::automock)]
pub trait ResourceProbe: Send + Sync {
    fn read(&self) -> Result<ResourceUsage>;
}

/// Reads the current process through `sysinfo`.
///
/// CPU usage is measured between consecutive reads, so the first reading is 0.
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Pid,
}

impl SysinfoProbe {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| {
            BridgeError::Configuration(format!("Process introspection unavailable: {e}"))
        })?;

        Ok(Self {
            system: Mutex::new(System::new()),
            pid,
        })
    }
}

impl ResourceProbe for SysinfoProbe {
    fn read(&self) -> Result<ResourceUsage> {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

        let process = system.process(self.pid).ok_or_else(|| {
            BridgeError::Configuration(format!("Process {} not visible to sysinfo", self.pid))
        })?;

        Ok(ResourceUsage {
            rss_bytes: process.memory(),
            total_memory_bytes: system.total_memory(),
            cpu_percent: process.cpu_usage(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_fraction() {
        let usage = ResourceUsage {
            rss_bytes: 512 * 1024 * 1024,
            total_memory_bytes: 1024 * 1024 * 1024,
            cpu_percent: 0.0,
        };
        assert_eq!(usage.memory_mb(), 512.0);
        assert_eq!(usage.memory_fraction(), 0.5);
    }

    #[test]
    fn test_unknown_total_memory() {
        let usage = ResourceUsage {
            rss_bytes: 100,
            total_memory_bytes: 0,
            cpu_percent: 0.0,
        };
        assert_eq!(usage.memory_fraction(), 0.0);
    }

    #[test]
    fn test_sysinfo_reads_current_process() {
        let probe = SysinfoProbe::new().unwrap();
        let usage = probe.read().unwrap();
        assert!(usage.rss_bytes > 0);
        assert!(usage.total_memory_bytes >= usage.rss_bytes);
    }
}
