use crate::point::MetricPoint;
use serde::Serialize;
use sysinfo::System;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemStats {
    pub total: u64,
    pub used: u64,
    pub available: u64,
}

impl MemStats {
    /// `used / total`, held to [0, 1]. Zero total reports 0.
    pub fn used_fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.used as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

pub fn collect(sys: &mut System) -> MemStats {
    sys.refresh_memory();
    MemStats {
        total: sys.total_memory(),
        used: sys.used_memory(),
        available: sys.available_memory(),
    }
}

pub fn points(host: &str, m: &MemStats) -> Vec<MetricPoint> {
    vec![
        MetricPoint::new("mem", host).tag("type", "used").value(m.used),
        MetricPoint::new("mem", host).tag("type", "total").value(m.total),
        MetricPoint::new("mem", host)
            .tag("type", "available")
            .value(m.available),
        MetricPoint::new("mem_percent", host)
            .tag("type", "used")
            .value(m.used_fraction()),
    ]
}
