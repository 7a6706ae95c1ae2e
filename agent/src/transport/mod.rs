//! Delivery of point batches to a time-series sink.

use crate::point::MetricPoint;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod backoff;
pub mod influx;
pub mod stdout;
pub mod tls;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport: {0}")]
    Transport(reqwest::Error),
    #[error("sink rejected batch with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("sink call timed out after {0:?}")]
    Timeout(Duration),
    #[error("encoding batch: {0}")]
    Encode(String),
    #[error("writing batch: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SinkError {
    /// The request URL is stripped so nothing in it ends up in logs.
    fn from(e: reqwest::Error) -> Self {
        SinkError::Transport(e.without_url())
    }
}

/// A store that accepts or rejects a batch as a whole and stamps it on arrival.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn write(&self, points: &[MetricPoint]) -> Result<(), SinkError>;

    /// Startup reachability check.
    async fn check(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Wraps a sink with a per-call deadline. One call per batch; retries belong to the caller.
pub struct Emitter {
    sink: Box<dyn Sink>,
    timeout: Duration,
}

impl Emitter {
    pub fn new(sink: Box<dyn Sink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    pub async fn emit(&self, points: &[MetricPoint]) -> Result<(), SinkError> {
        if points.is_empty() {
            return Ok(());
        }
        match tokio::time::timeout(self.timeout, self.sink.write(points)).await {
            Ok(res) => res,
            Err(_) => Err(SinkError::Timeout(self.timeout)),
        }
    }

    pub async fn check(&self) -> Result<(), SinkError> {
        match tokio::time::timeout(self.timeout, self.sink.check()).await {
            Ok(res) => res,
            Err(_) => Err(SinkError::Timeout(self.timeout)),
        }
    }
}
