use std::time::Duration;

use drover_common::config::PoolConfig;
use drover_server::RetryStrategy;

#[derive(Debug, Clone)]
pub struct WorkerPoolOptions {
    pub connect_retry_strategy: RetryStrategy,
    pub connect_timeout: Duration,
    /// The fixed delay between scans while every handle is leased.
    pub acquire_poll_interval: Duration,
    pub parallel_connect: bool,
}

impl WorkerPoolOptions {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            connect_retry_strategy: (&config.connect_retry_strategy).into(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            acquire_poll_interval: Duration::from_millis(config.acquire_poll_interval_ms),
            parallel_connect: config.parallel_connect,
        }
    }
}
