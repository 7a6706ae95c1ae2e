use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub common: Common,
    pub collectors: Collectors,
    pub logging: Logging,
    pub sink: Sink,
}

/// Divisor used when turning counter deltas into rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateWindow {
    /// Wall-clock time between the starts of consecutive cycles.
    Measured,
    /// The configured `delay_secs`, whatever the cycle actually took.
    Nominal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Common {
    pub host_tag: Option<String>,
    pub delay_secs: f64,
    pub rate_window: RateWindow,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Collectors {
    pub per_core: bool,
    pub per_core_window_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    Stdout,
    File,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub mode: LogMode,
    pub file_path: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Influx,
    Stdout,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Sink {
    pub kind: SinkKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub https: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ca_cert: Option<PathBuf>,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub check_on_start: bool,
}

impl Default for Common {
    fn default() -> Self {
        Self {
            host_tag: None,
            delay_secs: 10.0,
            rate_window: RateWindow::Measured,
        }
    }
}

impl Default for Collectors {
    fn default() -> Self {
        Self {
            per_core: false,
            per_core_window_ms: 1000,
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        let pd = ProjectDirs::from("io", "hostmon", "hostmon")
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| "./data".into());
        Self {
            mode: LogMode::Stdout,
            file_path: Some(pd.join("logs").join("hostmon.jsonl")),
        }
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self {
            kind: SinkKind::Influx,
            host: "localhost".into(),
            port: 8086,
            database: "monitor".into(),
            https: false,
            username: None,
            password: None,
            ca_cert: None,
            timeout_ms: 5000,
            max_attempts: 3,
            backoff_initial_ms: 500,
            backoff_max_ms: 4000,
            check_on_start: true,
        }
    }
}

/// sysinfo needs this much time between two CPU refreshes for a usable per-core sample.
const MIN_PER_CORE_WINDOW_MS: u64 = 200;

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        let d = self.common.delay_secs;
        if !(d.is_finite() && d > 0.0) {
            bail!("delay must be a positive number of seconds, got {d}");
        }
        if Duration::try_from_secs_f64(d).is_err() {
            bail!("delay of {d} seconds is too large");
        }
        if self.collectors.per_core_window_ms < MIN_PER_CORE_WINDOW_MS {
            bail!(
                "per_core_window_ms must be at least {MIN_PER_CORE_WINDOW_MS}, got {}",
                self.collectors.per_core_window_ms
            );
        }
        if self.sink.kind == SinkKind::Influx {
            if self.sink.host.trim().is_empty() {
                bail!("sink host is empty");
            }
            if self.sink.port == 0 {
                bail!("sink port must be non-zero");
            }
            if self.sink.database.trim().is_empty() {
                bail!("sink database is empty");
            }
        }
        if self.sink.timeout_ms == 0 {
            bail!("sink timeout_ms must be non-zero");
        }
        if self.sink.max_attempts == 0 {
            bail!("sink max_attempts must be at least 1");
        }
        if let Some(tag) = &self.common.host_tag {
            if tag.trim().is_empty() {
                bail!("host_tag is set but empty");
            }
        }
        Ok(())
    }
}

fn read_file(p: &Path) -> Result<AgentConfig> {
    let s = fs::read_to_string(p).with_context(|| format!("reading config file {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parsing config TOML {}", p.display()))
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {key}={v:?}: {e}")),
        None => Ok(None),
    }
}

/// Defaults, then the TOML file (`cli` path or `HOSTMON_CONFIG`), then `HOSTMON_*`
/// variables. CLI flag overrides are applied by the caller afterwards.
pub fn load_config_with_precedence(cli: Option<&PathBuf>) -> Result<AgentConfig> {
    load_config_from(cli, |k| env::var(k).ok())
}

/// [`load_config_with_precedence`] with the environment supplied by `lookup`.
pub fn load_config_from(
    cli: Option<&PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AgentConfig> {
    let mut cfg = AgentConfig::default();
    let path = match cli {
        Some(p) => Some(p.clone()),
        None => lookup("HOSTMON_CONFIG").map(PathBuf::from),
    };
    if let Some(p) = path {
        if !p.exists() {
            bail!("config file {} does not exist", p.display());
        }
        let f = read_file(&p)?;
        cfg = merge_config(&cfg, &f);
    }
    if let Some(d) = env_parse::<f64>(&lookup, "HOSTMON_DELAY_SECS")? {
        cfg.common.delay_secs = d;
    }
    if let Some(h) = env_parse::<String>(&lookup, "HOSTMON_INFLUX_HOST")? {
        cfg.sink.host = h;
    }
    if let Some(p) = env_parse::<u16>(&lookup, "HOSTMON_INFLUX_PORT")? {
        cfg.sink.port = p;
    }
    if let Some(db) = env_parse::<String>(&lookup, "HOSTMON_INFLUX_DB")? {
        cfg.sink.database = db;
    }
    Ok(cfg)
}

pub fn merge_config(a: &AgentConfig, b: &AgentConfig) -> AgentConfig {
    let mut out = a.clone();
    out.common = b.common.clone();
    out.collectors = b.collectors.clone();
    out.logging = b.logging.clone();
    out.sink = b.sink.clone();
    out
}
