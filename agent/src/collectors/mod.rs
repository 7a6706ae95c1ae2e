//! OS counter readers.
//!
//! [`CounterSource`] is the seam between the sampler and the operating system:
//! the sampler only sees [`HostReadings`], so it can be driven by synthetic
//! readings in tests. [`SysinfoSource`] is the production implementation.

use std::collections::BTreeMap;
use sysinfo::{Disks, Networks, System};
use thiserror::Error;

pub mod cpu;
pub mod disk;
pub mod mem;
pub mod net;

pub use disk::PartitionUsage;
pub use mem::MemStats;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollectError {
    #[error("partition {mountpoint} unreadable: {reason}")]
    Partition { mountpoint: String, reason: String },
    #[error("{family} counters unavailable: {reason}")]
    Unavailable {
        family: &'static str,
        reason: String,
    },
}

/// Cumulative disk bytes since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Cumulative network bytes since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetIo {
    pub sent_bytes: u64,
    pub recv_bytes: u64,
}

/// Disk counters keyed by device name.
pub type DiskDevices = BTreeMap<String, DiskIo>;

/// Network counters keyed by interface name.
pub type NetInterfaces = BTreeMap<String, NetIo>;

/// Everything one aggregate cycle needs from the OS.
#[derive(Debug, Clone)]
pub struct HostReadings {
    pub cpu_percent: f32,
    pub memory: MemStats,
    pub partitions: Vec<Result<PartitionUsage, CollectError>>,
    pub disk_io: Result<DiskDevices, CollectError>,
    pub net_io: Result<NetInterfaces, CollectError>,
}

pub trait CounterSource: Send {
    /// Takes a fresh reading of every host-wide counter.
    fn read(&mut self) -> HostReadings;

    /// Starts a per-core measurement window.
    fn begin_per_core(&mut self);

    /// Closes the window opened by [`begin_per_core`](Self::begin_per_core) and
    /// returns utilization per core, 0-100.
    fn end_per_core(&mut self) -> Vec<f32>;

    fn host_name(&self) -> Option<String>;
}

pub struct SysinfoSource {
    sys: System,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SysinfoSource {
    fn read(&mut self) -> HostReadings {
        let cpu_percent = cpu::collect(&mut self.sys);
        let memory = mem::collect(&mut self.sys);
        // Listed fresh every cycle so mounts and interfaces that come and go are followed.
        let disks = Disks::new_with_refreshed_list();
        let nets = Networks::new_with_refreshed_list();
        HostReadings {
            cpu_percent,
            memory,
            partitions: disk::collect_partitions(&disks),
            disk_io: disk::collect_io(&disks),
            net_io: net::collect(&nets),
        }
    }

    fn begin_per_core(&mut self) {
        self.sys.refresh_cpu_usage();
    }

    fn end_per_core(&mut self) -> Vec<f32> {
        self.sys.refresh_cpu_usage();
        cpu::per_core(&self.sys)
    }

    fn host_name(&self) -> Option<String> {
        System::host_name()
    }
}
