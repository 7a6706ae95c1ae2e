use super::{CollectError, DiskDevices, DiskIo};
use crate::point::MetricPoint;
use serde::Serialize;
use sysinfo::Disks;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PartitionUsage {
    pub mountpoint: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

impl PartitionUsage {
    pub fn new(mountpoint: impl Into<String>, total: u64, free: u64) -> Self {
        let free = free.min(total);
        let used = total - free;
        let percent = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };
        Self {
            mountpoint: mountpoint.into(),
            total,
            used,
            free,
            percent,
        }
    }
}

/// Mounted filesystems as of now. A mount reporting no capacity is returned as an error
/// so the caller can skip it without dropping the rest.
pub fn collect_partitions(disks: &Disks) -> Vec<Result<PartitionUsage, CollectError>> {
    disks
        .list()
        .iter()
        .map(|d| {
            let mountpoint = d.mount_point().to_string_lossy().to_string();
            if d.total_space() == 0 {
                return Err(CollectError::Partition {
                    mountpoint,
                    reason: "zero capacity reported".into(),
                });
            }
            Ok(PartitionUsage::new(
                mountpoint,
                d.total_space(),
                d.available_space(),
            ))
        })
        .collect()
}

/// Cumulative bytes read/written since boot, one entry per device so a device mounted
/// at several points is counted once. Rates are differenced per device, so a device
/// coming or going never shows up as a jump in the host total.
pub fn collect_io(disks: &Disks) -> Result<DiskDevices, CollectError> {
    if disks.list().is_empty() {
        return Err(CollectError::Unavailable {
            family: "disk",
            reason: "no block devices listed".into(),
        });
    }
    Ok(disks
        .list()
        .iter()
        .map(|d| {
            let usage = d.usage();
            (
                d.name().to_string_lossy().to_string(),
                DiskIo {
                    read_bytes: usage.total_read_bytes,
                    write_bytes: usage.total_written_bytes,
                },
            )
        })
        .collect())
}

/// Three `disk_space` points and one `disk_space_percent` point per partition.
pub fn space_points(host: &str, parts: &[PartitionUsage]) -> Vec<MetricPoint> {
    let mut out = Vec::with_capacity(parts.len() * 4);
    for p in parts {
        for (kind, v) in [("total", p.total), ("used", p.used), ("free", p.free)] {
            out.push(
                MetricPoint::new("disk_space", host)
                    .tag("type", kind)
                    .tag("mountpoint", p.mountpoint.as_str())
                    .value(v),
            );
        }
        out.push(
            MetricPoint::new("disk_space_percent", host)
                .tag("mountpoint", p.mountpoint.as_str())
                .value(p.percent),
        );
    }
    out
}
