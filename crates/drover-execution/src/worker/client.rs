use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

use crate::error::{ExecutionError, ExecutionResult};
use crate::id::WorkerId;
use crate::worker::rpc::worker_service_client::WorkerServiceClient;
use crate::worker::rpc::{MultiplesRequest, StopWorkerRequest};

/// A connection to a worker.
///
/// The client is cheap to clone and clones share the same channel.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    id: WorkerId,
    address: String,
    timeout: Duration,
    inner: WorkerServiceClient<Channel>,
    health: HealthClient<Channel>,
}

impl WorkerClient {
    /// Connects to the worker at `host:port`.
    /// `timeout` bounds both the connection attempt and each liveness probe.
    pub async fn connect(
        id: WorkerId,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> ExecutionResult<Self> {
        let address = format!("{host}:{port}");
        let channel = Endpoint::new(format!("http://{address}"))?
            .connect_timeout(timeout)
            .connect()
            .await?;
        Ok(Self {
            id,
            address,
            timeout,
            inner: WorkerServiceClient::new(channel.clone()).max_decoding_message_size(usize::MAX),
            health: HealthClient::new(channel),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Checks that the worker answers the health service with a serving status.
    pub async fn probe(&self) -> ExecutionResult<()> {
        let mut health = self.health.clone();
        let request = HealthCheckRequest {
            service: String::new(),
        };
        let response = tokio::time::timeout(self.timeout, health.check(request))
            .await
            .map_err(|_| {
                ExecutionError::connection(format!("health check timed out for {}", self.address))
            })??;
        match response.into_inner().status() {
            ServingStatus::Serving => Ok(()),
            status => Err(ExecutionError::connection(format!(
                "worker {} at {} is {status:?}",
                self.id, self.address
            ))),
        }
    }

    /// Returns the multiples of `prime` strictly below `maximum`, starting at `2 * prime`.
    pub async fn multiples(&self, prime: u64, maximum: u64) -> ExecutionResult<Vec<u64>> {
        let mut client = self.inner.clone();
        let response = client
            .multiples(MultiplesRequest { prime, maximum })
            .await?;
        Ok(response.into_inner().values)
    }

    pub async fn stop(&self) -> ExecutionResult<()> {
        let mut client = self.inner.clone();
        client.stop_worker(StopWorkerRequest {}).await?;
        Ok(())
    }
}
