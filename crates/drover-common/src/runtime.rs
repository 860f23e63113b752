use tokio::runtime::{Handle, Runtime};

use crate::config::RuntimeConfig;
use crate::error::{CommonError, CommonResult};

/// Owns the multi-threaded runtime that drives provisioning, the worker pool,
/// and the worker server.
#[derive(Debug)]
pub struct RuntimeManager {
    runtime: Runtime,
}

impl RuntimeManager {
    pub fn try_new(config: &RuntimeConfig) -> CommonResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_stack_size(config.stack_size)
            .enable_all()
            .build()
            .map_err(|e| CommonError::internal(e.to_string()))?;
        Ok(Self { runtime })
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            primary: self.runtime.handle().clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    primary: Handle,
}

impl RuntimeHandle {
    pub fn primary(&self) -> &Handle {
        &self.primary
    }
}
