use crate::config::{AgentConfig, LogMode, SinkKind};
use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing_appender::non_blocking::WorkerGuard;

/// Installs the JSON subscriber. In file mode the returned guard must live as long as
/// the process or buffered lines are lost.
pub fn init_tracing(cfg: &AgentConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hostmon=info".into());
    match (cfg.logging.mode, &cfg.logging.file_path) {
        (LogMode::File, Some(path)) => {
            let dir = path.parent().unwrap_or(Path::new("."));
            fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let file_name = path
                .file_name()
                .with_context(|| format!("log path {} has no file name", path.display()))?;
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (nb, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(nb)
                .json()
                .flatten_event(true)
                .init();
            Ok(Some(guard))
        }
        // Points own stdout when the sink is stdout.
        _ if cfg.sink.kind == SinkKind::Stdout => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
            Ok(None)
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .json()
                .init();
            Ok(None)
        }
    }
}
