use crate::point::MetricPoint;
use sysinfo::System;

/// Aggregate utilization since the previous CPU refresh, 0-100.
pub fn collect(sys: &mut System) -> f32 {
    sys.refresh_cpu_usage();
    sys.global_cpu_usage()
}

pub fn per_core(sys: &System) -> Vec<f32> {
    sys.cpus().iter().map(|c| c.cpu_usage()).collect()
}

pub fn aggregate_point(host: &str, percent: f64) -> MetricPoint {
    MetricPoint::new("cpu", host).tag("core", "all").value(percent)
}

/// One point per core followed by a synthetic `core=all` mean. With no cores
/// there is nothing to average and the synthetic point is skipped.
pub fn per_core_points(host: &str, loads: &[f32]) -> Vec<MetricPoint> {
    let mut points: Vec<MetricPoint> = loads
        .iter()
        .enumerate()
        .map(|(i, load)| {
            MetricPoint::new("cpu", host)
                .tag("core", i)
                .value(*load as f64)
        })
        .collect();
    if !loads.is_empty() {
        let total: f64 = loads.iter().map(|l| *l as f64).sum();
        points.push(aggregate_point(host, total / loads.len() as f64));
    }
    points
}
