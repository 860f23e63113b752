use std::io::Write;
use std::sync::Mutex;

use drover_common::config::TelemetryConfig;
use log::{debug, LevelFilter};

use crate::error::{TelemetryError, TelemetryResult};

enum TelemetryStatus {
    Uninitialized,
    Initialized,
    Failed,
}

static TELEMETRY_STATUS: Mutex<TelemetryStatus> = Mutex::new(TelemetryStatus::Uninitialized);

pub struct ResourceOptions {
    /// The process kind shown in every log line (e.g. `driver` or `worker`).
    pub kind: &'static str,
    /// A level that takes precedence over the configured level,
    /// usually set from the command line.
    pub level: Option<LevelFilter>,
}

pub fn init_telemetry(config: &TelemetryConfig, resource: ResourceOptions) -> TelemetryResult<()> {
    let mut status = TELEMETRY_STATUS
        .lock()
        .map_err(|e| TelemetryError::internal(e.to_string()))?;

    match *status {
        TelemetryStatus::Uninitialized => match init_logs(config, &resource) {
            Ok(()) => {
                debug!("logging initialized for {}", resource.kind);
                *status = TelemetryStatus::Initialized;
                Ok(())
            }
            Err(e) => {
                *status = TelemetryStatus::Failed;
                Err(e)
            }
        },
        TelemetryStatus::Initialized => {
            Err(TelemetryError::internal("telemetry already initialized"))
        }
        TelemetryStatus::Failed => Err(TelemetryError::internal(
            "telemetry failed to initialize previously",
        )),
    }
}

fn init_logs(config: &TelemetryConfig, resource: &ResourceOptions) -> TelemetryResult<()> {
    let level = resolve_level(config, resource.level)?;
    let kind = resource.kind;
    // `RUST_LOG` still takes precedence over the resolved level.
    let logger = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.as_str().to_lowercase()),
    )
    .format(move |buf, record| {
        let level = record.level();
        let target = record.target();
        let style = buf.default_level_style(level);
        let timestamp = buf.timestamp();
        let args = record.args();
        writeln!(
            buf,
            "[{timestamp} {style}{level}{style:#} {kind} {target}] {args}"
        )
    })
    .build();
    let max_level = logger.filter();
    log::set_boxed_logger(Box::new(logger)).map_err(|e| TelemetryError::internal(e.to_string()))?;
    log::set_max_level(max_level);
    Ok(())
}

fn resolve_level(
    config: &TelemetryConfig,
    level: Option<LevelFilter>,
) -> TelemetryResult<LevelFilter> {
    match level {
        Some(x) => Ok(x),
        None => config
            .log_level
            .parse::<LevelFilter>()
            .map_err(|_| TelemetryError::invalid(format!("log level: {}", config.log_level))),
    }
}

pub fn shutdown_telemetry() {
    debug!("flushing logs...");
    log::logger().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: &str) -> TelemetryConfig {
        TelemetryConfig {
            log_level: level.to_string(),
        }
    }

    #[test]
    fn test_resolve_level() {
        assert!(matches!(
            resolve_level(&config("debug"), None),
            Ok(LevelFilter::Debug)
        ));
        assert!(matches!(
            resolve_level(&config("WARN"), None),
            Ok(LevelFilter::Warn)
        ));
        assert!(matches!(
            resolve_level(&config("info"), Some(LevelFilter::Error)),
            Ok(LevelFilter::Error)
        ));
        assert!(matches!(
            resolve_level(&config("loud"), None),
            Err(TelemetryError::InvalidArgument(_))
        ));
    }
}
