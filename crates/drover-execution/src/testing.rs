use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drover_deploy::HostDescriptor;
use drover_server::RetryStrategy;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tonic::transport::server::TcpIncoming;
use tonic::{Request, Response, Status};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};

use crate::error::{ExecutionError, ExecutionResult};
use crate::pool::WorkerPoolOptions;
use crate::worker::serve_worker;

pub(crate) struct TestWorker {
    pub port: u16,
    pub handle: JoinHandle<ExecutionResult<()>>,
}

/// Starts a worker on an ephemeral local port that runs until it is asked to stop.
pub(crate) async fn spawn_worker() -> ExecutionResult<TestWorker> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let handle = tokio::spawn(serve_worker(listener, std::future::pending()));
    Ok(TestWorker { port, handle })
}

/// A health service that counts the checks and always reports not serving.
struct UnhealthyService {
    checks: Arc<AtomicUsize>,
}

#[tonic::async_trait]
impl Health for UnhealthyService {
    async fn check(
        &self,
        _: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(HealthCheckResponse {
            status: ServingStatus::NotServing as i32,
        }))
    }

    type WatchStream = futures::stream::Empty<Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        _: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        Err(Status::unimplemented("watch"))
    }
}

pub(crate) struct UnhealthyWorker {
    pub port: u16,
    pub checks: Arc<AtomicUsize>,
    pub handle: JoinHandle<Result<(), tonic::transport::Error>>,
}

/// Starts a server that accepts connections but never passes a liveness check.
pub(crate) async fn spawn_unhealthy_worker() -> ExecutionResult<UnhealthyWorker> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let incoming = TcpIncoming::from_listener(listener, true, None)
        .map_err(|e| ExecutionError::InternalError(e.to_string()))?;
    let checks = Arc::new(AtomicUsize::new(0));
    let service = HealthServer::new(UnhealthyService {
        checks: Arc::clone(&checks),
    });
    let handle = tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming(incoming),
    );
    Ok(UnhealthyWorker {
        port,
        checks,
        handle,
    })
}

pub(crate) fn local_host(port: u16) -> HostDescriptor {
    HostDescriptor::new("tester", "127.0.0.1", port)
}

pub(crate) fn pool_options() -> WorkerPoolOptions {
    WorkerPoolOptions {
        connect_retry_strategy: RetryStrategy::Fixed {
            max_count: 2,
            delay: Duration::from_millis(10),
        },
        connect_timeout: Duration::from_secs(1),
        acquire_poll_interval: Duration::from_millis(5),
        parallel_connect: false,
    }
}
