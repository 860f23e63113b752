use std::future::Future;
use std::sync::Arc;

use drover_common::config::WorkerConfig;
use drover_server::{ServerBuilder, ServerBuilderOptions};
use log::info;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::error::{ExecutionError, ExecutionResult};
use crate::worker::rpc::worker_service_server::WorkerServiceServer;
use crate::worker::WorkerServer;

/// Serves the worker on the listener until a client stops the worker
/// or `signal` completes.
pub async fn serve_worker<F>(listener: TcpListener, signal: F) -> ExecutionResult<()>
where
    F: Future<Output = ()>,
{
    let stop = Arc::new(Notify::new());
    let service = WorkerServiceServer::new(WorkerServer::new(Arc::clone(&stop)))
        .max_decoding_message_size(usize::MAX);
    let shutdown = async move {
        tokio::select! {
            _ = stop.notified() => info!("the worker is asked to stop"),
            _ = signal => info!("the worker is interrupted"),
        }
    };
    ServerBuilder::new("drover-worker", ServerBuilderOptions::default())
        .add_service(service)
        .await
        .serve(listener, shutdown)
        .await
        .map_err(|e| ExecutionError::InternalError(e.to_string()))
}

pub async fn run_worker(config: &WorkerConfig) -> ExecutionResult<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("the worker is listening on {}", listener.local_addr()?);
    serve_worker(listener, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    info!("the worker has stopped");
    Ok(())
}
