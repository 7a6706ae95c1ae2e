use anyhow::{Context, Result};
use reqwest::{Certificate, Client};
use std::{fs, path::Path, time::Duration};

pub fn load_ca(ca: Option<&Path>) -> Result<Option<Certificate>> {
    let Some(p) = ca else {
        return Ok(None);
    };
    let pem = fs::read(p).with_context(|| format!("reading CA {}", p.display()))?;
    Ok(Some(Certificate::from_pem(&pem).context("parsing CA PEM")?))
}

pub fn build_client(ca: Option<Certificate>, timeout: Duration) -> Result<Client> {
    let mut b = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .connect_timeout(timeout)
        .tcp_nodelay(true)
        .pool_max_idle_per_host(2);
    if let Some(ca) = ca {
        b = b.add_root_certificate(ca);
    }
    b.build().context("building reqwest client")
}
