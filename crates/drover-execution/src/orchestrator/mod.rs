mod core;
mod options;

use std::sync::Arc;

use drover_deploy::transport::TransportFactory;
use drover_deploy::{ProvisionedHost, RemoteHost};
pub use options::OrchestratorOptions;

/// Provisions a worker on every host, runs a job against the pool of
/// started workers, and tears everything down again.
pub struct Orchestrator {
    options: OrchestratorOptions,
    factory: Arc<dyn TransportFactory>,
}

impl Orchestrator {
    pub fn new(options: OrchestratorOptions, factory: Arc<dyn TransportFactory>) -> Self {
        Self { options, factory }
    }
}

struct Provisioned {
    remote: RemoteHost,
    target: ProvisionedHost,
    /// Whether the worker was started, which makes the host eligible for the pool.
    started: bool,
}
