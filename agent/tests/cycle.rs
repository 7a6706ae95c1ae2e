use async_trait::async_trait;
use hostmon::collectors::{
    CollectError, CounterSource, DiskDevices, DiskIo, HostReadings, MemStats, NetInterfaces,
    NetIo, PartitionUsage,
};
use hostmon::config::RateWindow;
use hostmon::point::{MetricPoint, TagValue};
use hostmon::scheduler::{Phase, Scheduler, Settings};
use hostmon::transport::{Emitter, Sink, SinkError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays scripted readings; the last one repeats once the script runs out.
struct ScriptedSource {
    script: VecDeque<HostReadings>,
    last: HostReadings,
    cores: Vec<f32>,
}

impl ScriptedSource {
    fn new(script: Vec<HostReadings>) -> Self {
        let last = script[0].clone();
        Self {
            script: script.into(),
            last,
            cores: vec![20.0, 40.0],
        }
    }
}

impl CounterSource for ScriptedSource {
    fn read(&mut self) -> HostReadings {
        if let Some(r) = self.script.pop_front() {
            self.last = r;
        }
        self.last.clone()
    }

    fn begin_per_core(&mut self) {}

    fn end_per_core(&mut self) -> Vec<f32> {
        self.cores.clone()
    }

    fn host_name(&self) -> Option<String> {
        Some("scripted".into())
    }
}

#[derive(Clone, Default)]
struct Recorder {
    batches: Arc<Mutex<Vec<Vec<MetricPoint>>>>,
    failures_left: Arc<Mutex<usize>>,
}

#[async_trait]
impl Sink for Recorder {
    async fn write(&self, points: &[MetricPoint]) -> Result<(), SinkError> {
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(SinkError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
        }
        self.batches.lock().unwrap().push(points.to_vec());
        Ok(())
    }
}

fn reading(disk_read: u64, net_sent: u64, parts: Vec<PartitionUsage>) -> HostReadings {
    HostReadings {
        cpu_percent: 50.0,
        memory: MemStats {
            total: 8_000_000_000,
            used: 4_000_000_000,
            available: 4_000_000_000,
        },
        partitions: parts.into_iter().map(Ok).collect(),
        disk_io: Ok(DiskDevices::from([(
            "sda".to_string(),
            DiskIo {
                read_bytes: disk_read,
                write_bytes: 0,
            },
        )])),
        net_io: Ok(NetInterfaces::from([(
            "eth0".to_string(),
            NetIo {
                sent_bytes: net_sent,
                recv_bytes: 0,
            },
        )])),
    }
}

fn settings(rate_window: RateWindow) -> Settings {
    Settings {
        delay: Duration::from_secs(10),
        rate_window,
        per_core_window: None,
        max_attempts: 3,
        backoff_initial_ms: 100,
        backoff_max_ms: 400,
    }
}

fn value_of(batch: &[MetricPoint], measurement: &str, kind: &str) -> Option<f64> {
    batch
        .iter()
        .find(|p| p.measurement() == measurement && p.tag("type") == Some(&TagValue::from(kind)))
        .and_then(|p| p.value())
}

#[tokio::test(start_paused = true)]
async fn nominal_window_matches_configured_delay() {
    let rec = Recorder::default();
    let source = ScriptedSource::new(vec![
        reading(1000, 0, vec![]),
        reading(2024, 500, vec![]),
    ]);
    let emitter = Emitter::new(Box::new(rec.clone()), Duration::from_secs(1));
    let mut s = Scheduler::new(source, "box", emitter, settings(RateWindow::Nominal));
    assert_eq!(s.phase(), Phase::Idle);

    let report = s.run_cycle().await;
    assert!(report.delivered);
    assert_eq!(report.window_secs, 10.0);
    assert_eq!(s.phase(), Phase::Idle);

    let batches = rec.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(value_of(&batches[0], "disk", "read"), Some(102.4));
    assert_eq!(value_of(&batches[0], "net", "sent"), Some(50.0));
    assert_eq!(value_of(&batches[0], "mem_percent", "used"), Some(0.5));
    assert_eq!(batches[0].iter().filter(|p| p.measurement().starts_with("disk_space")).count(), 0);
}

#[tokio::test(start_paused = true)]
async fn measured_window_uses_elapsed_time() {
    let rec = Recorder::default();
    let source = ScriptedSource::new(vec![
        reading(0, 0, vec![]),
        reading(0, 0, vec![]),
        reading(4000, 0, vec![]),
    ]);
    let emitter = Emitter::new(Box::new(rec.clone()), Duration::from_secs(1));
    let mut s = Scheduler::new(source, "box", emitter, settings(RateWindow::Measured));

    // Nothing elapsed since priming, so the nominal delay stands in.
    let first = s.run_cycle().await;
    assert_eq!(first.window_secs, 10.0);

    tokio::time::sleep(Duration::from_secs(20)).await;
    let second = s.run_cycle().await;
    assert_eq!(second.window_secs, 20.0);
    let batches = rec.batches.lock().unwrap();
    assert_eq!(value_of(&batches[1], "disk", "read"), Some(200.0));
}

#[tokio::test(start_paused = true)]
async fn failed_writes_are_retried_then_dropped() {
    let rec = Recorder::default();
    *rec.failures_left.lock().unwrap() = 2;
    let source = ScriptedSource::new(vec![reading(0, 0, vec![PartitionUsage::new("/", 10, 5)])]);
    let emitter = Emitter::new(Box::new(rec.clone()), Duration::from_secs(1));
    let mut s = Scheduler::new(source, "box", emitter, settings(RateWindow::Nominal));

    assert!(s.run_cycle().await.delivered);
    assert_eq!(rec.batches.lock().unwrap().len(), 1);

    *rec.failures_left.lock().unwrap() = 5;
    let report = s.run_cycle().await;
    assert!(!report.delivered);
    assert_eq!(rec.batches.lock().unwrap().len(), 1);

    // The loop survives and the next cycle goes through once the sink recovers.
    *rec.failures_left.lock().unwrap() = 0;
    assert!(s.run_cycle().await.delivered);
    assert_eq!(rec.batches.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn per_core_stream_is_a_separate_batch() {
    let rec = Recorder::default();
    let source = ScriptedSource::new(vec![reading(0, 0, vec![])]);
    let emitter = Emitter::new(Box::new(rec.clone()), Duration::from_secs(1));
    let mut cfg = settings(RateWindow::Nominal);
    cfg.per_core_window = Some(Duration::from_secs(1));
    let mut s = Scheduler::new(source, "box", emitter, cfg);

    let report = s.run_cycle().await;
    assert_eq!(report.per_core_delivered, Some(true));
    let batches = rec.batches.lock().unwrap();
    assert_eq!(batches.len(), 2);
    let per_core = &batches[1];
    assert_eq!(per_core.len(), 3);
    let all = per_core.last().unwrap();
    assert_eq!(all.tag("core"), Some(&TagValue::from("all")));
    assert_eq!(all.value(), Some(30.0));
}

#[tokio::test(start_paused = true)]
async fn run_stops_on_shutdown() {
    let rec = Recorder::default();
    let source = ScriptedSource::new(vec![reading(0, 0, vec![])]);
    let emitter = Emitter::new(Box::new(rec.clone()), Duration::from_secs(1));
    let s = Scheduler::new(source, "box", emitter, settings(RateWindow::Nominal));

    // Cycles at t=0, 10, 20; shutdown at t=25.
    s.run(tokio::time::sleep(Duration::from_secs(25))).await;
    assert_eq!(rec.batches.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn unreadable_partition_does_not_abort_cycle() {
    let rec = Recorder::default();
    let mut r = reading(0, 0, vec![PartitionUsage::new("/", 10, 5)]);
    r.partitions.push(Err(CollectError::Partition {
        mountpoint: "/media/usb".into(),
        reason: "gone".into(),
    }));
    let source = ScriptedSource::new(vec![r]);
    let emitter = Emitter::new(Box::new(rec.clone()), Duration::from_secs(1));
    let mut s = Scheduler::new(source, "box", emitter, settings(RateWindow::Nominal));

    assert!(s.run_cycle().await.delivered);
    let batches = rec.batches.lock().unwrap();
    assert_eq!(batches[0].iter().filter(|p| p.measurement() == "disk_space").count(), 3);
}

#[tokio::test(start_paused = true)]
async fn unplugged_device_does_not_hide_traffic_on_the_rest() {
    let rec = Recorder::default();
    let mut both = reading(0, 0, vec![]);
    both.disk_io = Ok(DiskDevices::from([
        ("vda".to_string(), DiskIo { read_bytes: 1000, write_bytes: 0 }),
        ("vdb".to_string(), DiskIo { read_bytes: 5000, write_bytes: 0 }),
    ]));
    let mut one = reading(0, 0, vec![]);
    one.disk_io = Ok(DiskDevices::from([(
        "vda".to_string(),
        DiskIo { read_bytes: 3000, write_bytes: 0 },
    )]));
    let source = ScriptedSource::new(vec![both, one]);
    let emitter = Emitter::new(Box::new(rec.clone()), Duration::from_secs(1));
    let mut s = Scheduler::new(source, "box", emitter, settings(RateWindow::Nominal));

    assert!(s.run_cycle().await.delivered);
    let batches = rec.batches.lock().unwrap();
    assert_eq!(value_of(&batches[0], "disk", "read"), Some(200.0));
}
