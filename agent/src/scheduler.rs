//! The sampling loop.
//!
//! One cycle reads the host counters, turns them into a batch and hands it to the
//! emitter. Then the loop sleeps for the configured delay. The delay is added after the
//! cycle's own work, without drift compensation, so the real period is work time plus
//! delay. Rates are divided by the window chosen by [`RateWindow`].

use crate::collectors::CounterSource;
use crate::config::{AgentConfig, RateWindow};
use crate::point::MetricPoint;
use crate::sampler::{sample_per_core, Sampler};
use crate::transport::backoff::Backoff;
use crate::transport::Emitter;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub delay: Duration,
    pub rate_window: RateWindow,
    /// `Some(window)` enables the per-core stream.
    pub per_core_window: Option<Duration>,
    pub max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl From<&AgentConfig> for Settings {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            // Out-of-range delays are rejected by `AgentConfig::validate`.
            delay: Duration::try_from_secs_f64(cfg.common.delay_secs).unwrap_or(Duration::MAX),
            rate_window: cfg.common.rate_window,
            per_core_window: cfg
                .collectors
                .per_core
                .then(|| Duration::from_millis(cfg.collectors.per_core_window_ms)),
            max_attempts: cfg.sink.max_attempts.max(1),
            backoff_initial_ms: cfg.sink.backoff_initial_ms,
            backoff_max_ms: cfg.sink.backoff_max_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub points: usize,
    pub window_secs: f64,
    pub delivered: bool,
    /// `None` when the per-core stream is disabled.
    pub per_core_delivered: Option<bool>,
}

pub struct Scheduler<S: CounterSource> {
    source: S,
    sampler: Sampler,
    emitter: Emitter,
    settings: Settings,
    backoff: Backoff,
    phase: Phase,
    last_start: Instant,
}

impl<S: CounterSource> Scheduler<S> {
    /// Primes the counter baselines with one read of `source`.
    pub fn new(
        mut source: S,
        host: impl Into<String>,
        emitter: Emitter,
        settings: Settings,
    ) -> Self {
        let initial = source.read();
        let sampler = Sampler::primed(host, &initial);
        let backoff = Backoff::new(settings.backoff_initial_ms, settings.backoff_max_ms);
        Self {
            source,
            sampler,
            emitter,
            settings,
            backoff,
            phase: Phase::Idle,
            last_start: Instant::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    fn window_secs(&self, now: Instant) -> f64 {
        let nominal = self.settings.delay.as_secs_f64();
        match self.settings.rate_window {
            RateWindow::Nominal => nominal,
            RateWindow::Measured => {
                let measured = now.duration_since(self.last_start).as_secs_f64();
                if measured > 0.0 {
                    measured
                } else {
                    nominal
                }
            }
        }
    }

    /// Runs one Sampling phase and returns to Idle. Never fails: read and delivery
    /// errors are logged and the affected points dropped.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.phase = Phase::Sampling;
        let started = Instant::now();
        let window_secs = self.window_secs(started);
        self.last_start = started;

        let readings = self.source.read();
        let points = self.sampler.sample_aggregate(readings, window_secs);
        let delivered = self.deliver("aggregate", &points).await;

        let per_core_delivered = match self.settings.per_core_window {
            Some(window) => {
                let per_core =
                    sample_per_core(&mut self.source, self.sampler.host(), window).await;
                Some(self.deliver("per_core", &per_core).await)
            }
            None => None,
        };

        self.phase = Phase::Idle;
        let report = CycleReport {
            points: points.len(),
            window_secs,
            delivered,
            per_core_delivered,
        };
        info!(
            points = report.points,
            window_secs = report.window_secs,
            delivered = report.delivered,
            "cycle complete"
        );
        report
    }

    /// Up to `max_attempts` tries with backoff in between, then the batch is dropped.
    async fn deliver(&mut self, stream: &'static str, points: &[MetricPoint]) -> bool {
        if points.is_empty() {
            return true;
        }
        self.backoff.reset();
        let max = self.settings.max_attempts;
        for attempt in 1..=max {
            match self.emitter.emit(points).await {
                Ok(()) => {
                    debug!(stream, attempt, points = points.len(), "batch delivered");
                    return true;
                }
                Err(e) if attempt < max => {
                    let wait = self.backoff.next_delay();
                    warn!(
                        stream,
                        attempt,
                        error = %e,
                        retry_in_ms = wait.as_millis() as u64,
                        "write failed"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    warn!(
                        stream,
                        attempt,
                        error = %e,
                        points = points.len(),
                        "write failed; dropping batch"
                    );
                }
            }
        }
        false
    }

    /// Cycles until `shutdown` resolves. A cycle in flight when it resolves is abandoned
    /// at its next await point; the counter baselines are only touched synchronously.
    pub async fn run<F: Future<Output = ()>>(mut self, shutdown: F) {
        tokio::pin!(shutdown);
        info!(
            host = self.sampler.host(),
            delay_secs = self.settings.delay.as_secs_f64(),
            rate_window = ?self.settings.rate_window,
            per_core = self.settings.per_core_window.is_some(),
            "sampler started"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.run_cycle() => {}
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.settings.delay) => {}
            }
        }
        info!("sampler stopped");
    }
}
