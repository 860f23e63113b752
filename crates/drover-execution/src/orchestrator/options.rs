use std::time::Duration;

use drover_common::config::AppConfig;
use drover_deploy::DeployOptions;

use crate::error::{ExecutionError, ExecutionResult};
use crate::pool::WorkerPoolOptions;

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub deploy: DeployOptions,
    /// Host descriptors in the form `{user{:secret}@}machine{:port}`.
    pub hosts: Vec<String>,
    /// The port of the first host without an explicit port.
    pub port: u16,
    /// The time to wait for the workers to start listening after provisioning.
    pub settle_delay: Duration,
    pub pool: WorkerPoolOptions,
}

impl OrchestratorOptions {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            deploy: DeployOptions::new(&config.deploy),
            hosts: config.deploy.hosts.clone(),
            port: config.deploy.port,
            settle_delay: Duration::from_millis(config.deploy.settle_delay_ms),
            pool: WorkerPoolOptions::new(&config.pool),
        }
    }

    pub fn validate(&self) -> ExecutionResult<()> {
        if self
            .deploy
            .run
            .as_deref()
            .is_none_or(|x| x.trim().is_empty())
        {
            return Err(ExecutionError::configuration("missing run script"));
        }
        if self.deploy.dirs.is_empty() {
            return Err(ExecutionError::configuration("missing directories to upload"));
        }
        if self.hosts.is_empty() {
            return Err(ExecutionError::configuration("missing hosts"));
        }
        Ok(())
    }
}
