use std::sync::Arc;

use log::debug;
use tokio::sync::Notify;
use tonic::{Request, Response, Status};

use crate::worker::rpc::worker_service_server::WorkerService;
use crate::worker::rpc::{
    MultiplesRequest, MultiplesResponse, StopWorkerRequest, StopWorkerResponse,
};

pub struct WorkerServer {
    stop: Arc<Notify>,
}

impl WorkerServer {
    /// Creates a server that notifies `stop` when a client asks the worker to stop.
    pub fn new(stop: Arc<Notify>) -> Self {
        Self { stop }
    }
}

/// Returns `2p, 3p, ...` strictly below `maximum`.
fn multiples(prime: u64, maximum: u64) -> Vec<u64> {
    let last = maximum.saturating_sub(1) / prime;
    (2..=last).map(|i| i * prime).collect()
}

#[tonic::async_trait]
impl WorkerService for WorkerServer {
    async fn multiples(
        &self,
        request: Request<MultiplesRequest>,
    ) -> Result<Response<MultiplesResponse>, Status> {
        let request = request.into_inner();
        debug!("{request:?}");
        let MultiplesRequest { prime, maximum } = request;
        if prime < 2 {
            return Err(Status::invalid_argument(format!("not a prime: {prime}")));
        }
        let values = multiples(prime, maximum);
        debug!("{} multiples of {prime} below {maximum}", values.len());
        Ok(Response::new(MultiplesResponse { values }))
    }

    async fn stop_worker(
        &self,
        request: Request<StopWorkerRequest>,
    ) -> Result<Response<StopWorkerResponse>, Status> {
        let request = request.into_inner();
        debug!("{request:?}");
        let StopWorkerRequest {} = request;
        self.stop.notify_one();
        let response = StopWorkerResponse {};
        debug!("{response:?}");
        Ok(Response::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiples() {
        assert_eq!(multiples(2, 11), vec![4, 6, 8, 10]);
        assert_eq!(multiples(3, 20), vec![6, 9, 12, 15, 18]);
        assert_eq!(multiples(3, 18), vec![6, 9, 12, 15]);
        assert!(multiples(7, 14).is_empty());
        assert!(multiples(5, 0).is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_prime_factor() {
        let server = WorkerServer::new(Arc::new(Notify::new()));
        let result = WorkerService::multiples(
            &server,
            Request::new(MultiplesRequest {
                prime: 0,
                maximum: 10,
            }),
        )
        .await;
        assert!(matches!(result, Err(status) if status.code() == tonic::Code::InvalidArgument));
    }
}
