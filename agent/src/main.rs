use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use hostmon::collectors::{CounterSource, SysinfoSource};
use hostmon::config::{load_config_with_precedence, AgentConfig, SinkKind};
use hostmon::logging::init_tracing;
use hostmon::scheduler::{Scheduler, Settings};
use hostmon::transport::{influx::InfluxSink, stdout::StdoutSink, Emitter, Sink};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "hostmon",
    version,
    about = "Samples CPU, memory, disk and network counters and writes them to InfluxDB"
)]
struct Cli {
    /// TOML config file
    #[arg(short, long, env = "HOSTMON_CONFIG")]
    config: Option<PathBuf>,
    /// Host name of InfluxDB. Default value is localhost.
    #[arg(long)]
    influx_host: Option<String>,
    /// Port of InfluxDB. Default value is 8086.
    #[arg(long)]
    influx_port: Option<u16>,
    /// InfluxDB database used to write metrics. Default value is monitor.
    #[arg(long)]
    influx_db: Option<String>,
    /// Delay between two observations, in seconds. Default value is 10.0.
    #[arg(long)]
    delay: Option<f64>,
    /// Also emit one cpu point per core every cycle
    #[arg(long, action = ArgAction::SetTrue)]
    per_core: bool,
    /// Where points are written
    #[arg(long, value_enum)]
    sink: Option<SinkKind>,
    /// Value of the `host` tag; defaults to the machine's hostname
    #[arg(long)]
    host_tag: Option<String>,
}

fn apply_cli(cfg: &mut AgentConfig, cli: Cli) {
    if let Some(h) = cli.influx_host {
        cfg.sink.host = h;
    }
    if let Some(p) = cli.influx_port {
        cfg.sink.port = p;
    }
    if let Some(db) = cli.influx_db {
        cfg.sink.database = db;
    }
    if let Some(d) = cli.delay {
        cfg.common.delay_secs = d;
    }
    if cli.per_core {
        cfg.collectors.per_core = true;
    }
    if let Some(k) = cli.sink {
        cfg.sink.kind = k;
    }
    if let Some(t) = cli.host_tag {
        cfg.common.host_tag = Some(t);
    }
}

fn build_sink(cfg: &AgentConfig) -> Result<Box<dyn Sink>> {
    Ok(match cfg.sink.kind {
        SinkKind::Influx => {
            let sink = InfluxSink::new(&cfg.sink).context("building InfluxDB client")?;
            info!(url = sink.base(), database = %cfg.sink.database, "influx sink");
            Box::new(sink)
        }
        SinkKind::Stdout => Box::new(StdoutSink),
    })
}

fn resolve_host(cfg: &AgentConfig, source: &impl CounterSource) -> String {
    if let Some(t) = &cfg.common.host_tag {
        return t.clone();
    }
    source.host_name().unwrap_or_else(|| {
        warn!("hostname unavailable; tagging points with host=localhost");
        "localhost".into()
    })
}

/// Builds the configured sink and, for InfluxDB, pings it once. An unreachable sink
/// at startup is fatal.
async fn connect_sink(cfg: &AgentConfig) -> Result<Emitter> {
    let emitter = Emitter::new(build_sink(cfg)?, Duration::from_millis(cfg.sink.timeout_ms));
    if cfg.sink.kind == SinkKind::Influx && cfg.sink.check_on_start {
        emitter
            .check()
            .await
            .with_context(|| format!("sink {}:{} unreachable", cfg.sink.host, cfg.sink.port))?;
    }
    Ok(emitter)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = ?e, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = load_config_with_precedence(cli.config.as_ref())?;
    apply_cli(&mut cfg, cli);
    cfg.validate().context("invalid configuration")?;
    let _guard = init_tracing(&cfg)?;

    let emitter = connect_sink(&cfg).await?;

    let source = SysinfoSource::new();
    let host = resolve_host(&cfg, &source);
    let scheduler = Scheduler::new(source, host, emitter, Settings::from(&cfg));
    // sysinfo needs a minimum gap between CPU refreshes before usage is meaningful.
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    scheduler.run(shutdown_signal()).await;
    Ok(())
}
