use super::{tls, Sink, SinkError};
use crate::config;
use crate::point::{encode_batch, MetricPoint};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// InfluxDB 1.x HTTP write endpoint. Lines are sent without timestamps so the server
/// stamps them on arrival. Credentials travel as Basic auth, never in the URL.
pub struct InfluxSink {
    client: Client,
    base: String,
    database: String,
    credentials: Option<(String, String)>,
}

impl InfluxSink {
    pub fn new(cfg: &config::Sink) -> Result<Self> {
        let ca = tls::load_ca(cfg.ca_cert.as_deref())?;
        let client = tls::build_client(ca, Duration::from_millis(cfg.timeout_ms))?;
        let credentials = match (&cfg.username, &cfg.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            (Some(u), None) => Some((u.clone(), String::new())),
            _ => None,
        };
        Ok(Self {
            client,
            base: base_url(cfg),
            database: cfg.database.clone(),
            credentials,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

pub fn base_url(cfg: &config::Sink) -> String {
    let scheme = if cfg.https { "https" } else { "http" };
    let host = if cfg.host.contains(':') && !cfg.host.starts_with('[') {
        format!("[{}]", cfg.host)
    } else {
        cfg.host.clone()
    };
    format!("{scheme}://{host}:{}", cfg.port)
}

async fn into_result(resp: reqwest::Response) -> Result<(), SinkError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SinkError::Rejected {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

#[async_trait]
impl Sink for InfluxSink {
    async fn write(&self, points: &[MetricPoint]) -> Result<(), SinkError> {
        let body = encode_batch(points);
        if body.is_empty() {
            return Err(SinkError::Encode("no point had an encodable field".into()));
        }
        let mut req = self
            .client
            .post(format!("{}/write", self.base))
            .query(&[("db", self.database.as_str())]);
        if let Some((u, p)) = &self.credentials {
            req = req.basic_auth(u, Some(p));
        }
        let resp = req
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;
        debug!(points = points.len(), status = %resp.status(), "influx write");
        into_result(resp).await
    }

    async fn check(&self) -> Result<(), SinkError> {
        let mut req = self.client.get(format!("{}/ping", self.base));
        if let Some((u, p)) = &self.credentials {
            req = req.basic_auth(u, Some(p));
        }
        let resp = req.send().await?;
        into_result(resp).await
    }
}
