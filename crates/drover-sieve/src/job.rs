use std::sync::Arc;
use std::time::{Duration, Instant};

use drover_deploy::transport::TransportFactory;
use drover_execution::error::ExecutionResult;
use drover_execution::{Orchestrator, OrchestratorOptions};
use log::info;

use crate::sieve::primes_below;

#[derive(Debug, Clone)]
pub struct PrimesReport {
    pub primes: Vec<u64>,
    /// The time spent in the sieve itself.
    pub calculation_time: Duration,
    /// The time including provisioning and teardown.
    pub total_time: Duration,
}

/// Computes the primes below a bound on workers provisioned for the job.
pub struct PrimesJob {
    maximum: u64,
    options: OrchestratorOptions,
    factory: Arc<dyn TransportFactory>,
}

impl PrimesJob {
    /// Creates the job. The worker runs on the local machine if no host is given.
    pub fn new(
        maximum: u64,
        mut options: OrchestratorOptions,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        if options.hosts.is_empty() {
            options.hosts = vec!["localhost".to_string()];
        }
        Self {
            maximum,
            options,
            factory,
        }
    }

    pub async fn execute(&self) -> ExecutionResult<PrimesReport> {
        let start = Instant::now();
        let maximum = self.maximum;
        let orchestrator = Orchestrator::new(self.options.clone(), Arc::clone(&self.factory));
        let (primes, calculation_time) = orchestrator
            .run(|pool| async move {
                let start = Instant::now();
                let primes = primes_below(maximum, &pool).await?;
                Ok((primes, start.elapsed()))
            })
            .await?;
        let report = PrimesReport {
            primes,
            calculation_time,
            total_time: start.elapsed(),
        };
        info!("{} primes found", report.primes.len());
        info!("calculation elapsed time: {:?}", report.calculation_time);
        info!("total elapsed time: {:?}", report.total_time);
        Ok(report)
    }
}
