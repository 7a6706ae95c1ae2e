//! Turns raw counter readings into metric points.

use crate::collectors::{cpu, disk, mem, CollectError, CounterSource, HostReadings};
use crate::point::MetricPoint;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

mod state;

pub use state::{rate, CounterState};

/// Owns the counter baselines for one host. Every cycle reads, differences and then
/// overwrites the baselines through `&mut self`, so cycles cannot interleave.
#[derive(Debug)]
pub struct Sampler {
    host: String,
    state: CounterState,
    issues: OpenIssues,
}

/// Read failures already warned about. A failure that persists is logged at `debug!`
/// after the first cycle; once it clears, the next occurrence warns again.
#[derive(Debug, Default)]
struct OpenIssues(HashSet<String>);

impl OpenIssues {
    /// Returns true when `key` was not already open.
    fn open(&mut self, key: &str, e: &CollectError, what: &'static str) -> bool {
        if self.0.insert(key.to_string()) {
            warn!(error = %e, "skipping {what}");
            true
        } else {
            debug!(error = %e, "still skipping {what}");
            false
        }
    }

    fn close(&mut self, key: &str) {
        if self.0.remove(key) {
            info!(source = key, "readable again");
        }
    }
}

impl Sampler {
    /// Builds a sampler whose baselines come from `initial`, so the first cycle has
    /// something to difference against.
    pub fn primed(host: impl Into<String>, initial: &HostReadings) -> Self {
        Self {
            host: host.into(),
            state: CounterState::primed(
                initial.disk_io.as_ref().ok().cloned(),
                initial.net_io.as_ref().ok().cloned(),
            ),
            issues: OpenIssues::default(),
        }
    }

    pub fn with_state(host: impl Into<String>, state: CounterState) -> Self {
        Self {
            host: host.into(),
            state,
            issues: OpenIssues::default(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> &CounterState {
        &self.state
    }

    /// One aggregate batch: cpu, mem, disk rates, disk space, net rates, in that order.
    ///
    /// Unreadable partitions are skipped. An unreadable I/O family is skipped and its
    /// baseline left as is. Each distinct failure is warned about once.
    pub fn sample_aggregate(
        &mut self,
        readings: HostReadings,
        elapsed_secs: f64,
    ) -> Vec<MetricPoint> {
        let host = self.host.as_str();
        let mut points = Vec::with_capacity(16 + readings.partitions.len() * 4);

        points.push(cpu::aggregate_point(host, readings.cpu_percent as f64));
        points.extend(mem::points(host, &readings.memory));

        match readings.disk_io {
            Ok(io) => {
                self.issues.close("disk");
                if let Some((read, write)) = self.state.advance_disk(io, elapsed_secs) {
                    points.push(rate_point("disk", host, "read", read));
                    points.push(rate_point("disk", host, "write", write));
                } else {
                    debug!("disk baseline set; rates start next cycle");
                }
            }
            Err(e) => {
                self.issues.open("disk", &e, "disk throughput");
            }
        }

        let parts: Vec<_> = readings
            .partitions
            .into_iter()
            .filter_map(|p| match p {
                Ok(p) => {
                    self.issues.close(&partition_key(&p.mountpoint));
                    Some(p)
                }
                Err(e) => {
                    if let CollectError::Partition { mountpoint, .. } = &e {
                        self.issues.open(&partition_key(mountpoint), &e, "partition");
                    } else {
                        warn!(error = %e, "skipping partition");
                    }
                    None
                }
            })
            .collect();
        points.extend(disk::space_points(host, &parts));

        match readings.net_io {
            Ok(io) => {
                self.issues.close("net");
                if let Some((sent, recv)) = self.state.advance_net(io, elapsed_secs) {
                    points.push(rate_point("net", host, "sent", sent));
                    points.push(rate_point("net", host, "recv", recv));
                } else {
                    debug!("net baseline set; rates start next cycle");
                }
            }
            Err(e) => {
                self.issues.open("net", &e, "network throughput");
            }
        }

        points
    }
}

fn partition_key(mountpoint: &str) -> String {
    format!("partition:{mountpoint}")
}

fn rate_point(measurement: &str, host: &str, kind: &str, bytes_per_sec: f64) -> MetricPoint {
    MetricPoint::new(measurement, host)
        .tag("type", kind)
        .value(bytes_per_sec)
}

/// Per-core utilization over an explicit measurement window, plus the synthetic
/// `core=all` mean. Leaves the counter baselines alone.
pub async fn sample_per_core<S: CounterSource + ?Sized>(
    source: &mut S,
    host: &str,
    window: Duration,
) -> Vec<MetricPoint> {
    source.begin_per_core();
    tokio::time::sleep(window).await;
    let loads = source.end_per_core();
    cpu::per_core_points(host, &loads)
}
