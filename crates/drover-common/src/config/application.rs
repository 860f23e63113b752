use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::config::deserialize_non_empty_string;
use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// The prefix of environment variables that override the configuration.
/// Nested keys are separated by double underscores,
/// e.g. `DROVER__DEPLOY__PORT` for `deploy.port`.
pub const CONFIG_ENV_PREFIX: &str = "DROVER__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub deploy: DeployConfig,
    pub ssh: SshConfig,
    pub pool: PoolConfig,
    pub worker: WorkerConfig,
    pub runtime: RuntimeConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> CommonResult<Self> {
        Self::figment()
            .extract()
            .map_err(|e| CommonError::InvalidArgument(e.to_string()))
    }

    /// Loads the embedded defaults only, ignoring the environment.
    pub fn defaults() -> CommonResult<Self> {
        Figment::from(Toml::string(DEFAULT_CONFIG))
            .extract()
            .map_err(|e| CommonError::InvalidArgument(e.to_string()))
    }

    fn figment() -> Figment {
        Figment::from(Toml::string(DEFAULT_CONFIG)).admerge(
            Env::prefixed(CONFIG_ENV_PREFIX).map(|p| p.as_str().replace("__", ".").into()),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    pub app_name: String,
    pub hosts: Vec<String>,
    pub port: u16,
    pub dirs: Vec<String>,
    pub packages: Vec<String>,
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub run: Option<String>,
    pub source_files: Vec<String>,
    pub package_query: String,
    pub script_runtime: String,
    pub settle_delay_ms: u64,
    pub leave_files: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    pub program: String,
    pub copy_program: String,
    pub password_program: String,
    pub port: u16,
    pub identity_files: Vec<String>,
    pub options: Vec<String>,
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub control_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub connect_retry_strategy: RetryStrategy,
    pub connect_timeout_ms: u64,
    pub acquire_poll_interval_ms: u64,
    pub parallel_connect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Fixed(FixedRetryStrategy),
    ExponentialBackoff(ExponentialBackoffRetryStrategy),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedRetryStrategy {
    pub max_count: usize,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentialBackoffRetryStrategy {
    pub max_count: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub stack_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() -> CommonResult<()> {
        let config = AppConfig::defaults()?;
        assert_eq!(config.deploy.app_name, "drover");
        assert_eq!(config.deploy.port, 9000);
        assert!(config.deploy.hosts.is_empty());
        assert!(config.deploy.run.is_none());
        assert!(config.ssh.control_dir.is_none());
        assert!(matches!(
            config.pool.connect_retry_strategy,
            RetryStrategy::Fixed(FixedRetryStrategy {
                max_count: 10,
                delay_ms: 500
            })
        ));
        assert_eq!(config.pool.acquire_poll_interval_ms, 100);
        Ok(())
    }

    #[test]
    fn test_environment_override() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("DROVER__DEPLOY__PORT", "7000");
            jail.set_env("DROVER__DEPLOY__RUN", "bin/worker.sh");
            jail.set_env("DROVER__POOL__PARALLEL_CONNECT", "true");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.deploy.port, 7000);
            assert_eq!(config.deploy.run.as_deref(), Some("bin/worker.sh"));
            assert!(config.pool.parallel_connect);
            Ok(())
        });
    }
}
