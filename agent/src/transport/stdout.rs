use super::{Sink, SinkError};
use crate::point::MetricPoint;
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Serialize)]
struct Line<'a> {
    ts: &'a str,
    #[serde(flatten)]
    point: &'a MetricPoint,
}

/// Prints each point as a JSON line. Useful for dry runs and piping into other tools.
#[derive(Debug, Default)]
pub struct StdoutSink;

pub fn render(points: &[MetricPoint], ts: &str) -> Result<Vec<u8>, SinkError> {
    let mut buf = Vec::with_capacity(points.len() * 128);
    for point in points {
        serde_json::to_writer(&mut buf, &Line { ts, point })
            .map_err(|e| SinkError::Encode(e.to_string()))?;
        buf.push(b'\n');
    }
    Ok(buf)
}

#[async_trait]
impl Sink for StdoutSink {
    async fn write(&self, points: &[MetricPoint]) -> Result<(), SinkError> {
        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".into());
        let buf = render(points, &ts)?;
        let mut out = std::io::stdout().lock();
        out.write_all(&buf)?;
        out.flush()?;
        Ok(())
    }
}
