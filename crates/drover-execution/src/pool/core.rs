use std::future::Future;
use std::sync::Arc;

use drover_deploy::HostDescriptor;
use drover_server::RetryOutcome;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::error::{ExecutionError, ExecutionResult};
use crate::id::{IdGenerator, WorkerId};
use crate::pool::{Lease, WorkerHandle, WorkerPool, WorkerPoolOptions};
use crate::worker::WorkerClient;

impl WorkerPool {
    /// Connects to the worker on each host.
    ///
    /// A host that cannot be reached and probed within the retry budget is
    /// left out of the pool with a warning, so the pool may be empty.
    pub async fn connect(
        hosts: &[HostDescriptor],
        options: WorkerPoolOptions,
    ) -> ExecutionResult<Self> {
        let mut ids = IdGenerator::<WorkerId>::new();
        let targets = hosts
            .iter()
            .map(|host| Ok((ids.next()?, host)))
            .collect::<ExecutionResult<Vec<_>>>()?;
        let attempts = targets
            .into_iter()
            .map(|(id, host)| Self::connect_worker(&options, id, host));
        let clients = if options.parallel_connect {
            join_all(attempts).await
        } else {
            let mut clients = vec![];
            for attempt in attempts {
                clients.push(attempt.await);
            }
            clients
        };
        let handles = clients
            .into_iter()
            .flatten()
            .map(|client| WorkerHandle {
                client,
                leased: false,
            })
            .collect::<Vec<_>>();
        info!("the worker pool has {} of {} workers", handles.len(), hosts.len());
        Ok(Self {
            options,
            handles: Arc::new(Mutex::new(handles)),
        })
    }

    async fn connect_worker(
        options: &WorkerPoolOptions,
        id: WorkerId,
        host: &HostDescriptor,
    ) -> Option<WorkerClient> {
        let machine = host.machine();
        let port = host.port();
        let timeout = options.connect_timeout;
        let outcome = options
            .connect_retry_strategy
            .run(move || async move {
                let client = WorkerClient::connect(id, machine, port, timeout).await?;
                client.probe().await?;
                Ok::<_, ExecutionError>(client)
            })
            .await;
        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                debug!("connected to worker {id} at {machine}:{port} in {attempts} attempt(s)");
                Some(value)
            }
            RetryOutcome::Exhausted { error, attempts } => {
                warn!("excluding {host} after {attempts} failed connection attempts: {error}");
                None
            }
        }
    }

    /// Runs `f` with an exclusively leased worker.
    ///
    /// Waits while every worker is leased, polling at a fixed interval.
    /// The lease is released when `f` returns, panics, or is cancelled
    /// together with the returned future.
    /// Fails with [`ExecutionError::EmptyPoolError`] once the pool has no workers left.
    pub async fn acquire<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(WorkerClient) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ExecutionError>,
    {
        let lease = self.lease().await?;
        let result = f(lease.client()).await;
        lease.release().await;
        result
    }

    async fn lease(&self) -> ExecutionResult<Lease> {
        loop {
            {
                let mut handles = self.handles.lock().await;
                let mut index = 0;
                while index < handles.len() {
                    let handle = &mut handles[index];
                    if handle.leased {
                        index += 1;
                        continue;
                    }
                    match handle.client.probe().await {
                        Ok(()) => {
                            handle.leased = true;
                            debug!(
                                "leased worker {} at {}",
                                handle.client.id(),
                                handle.client.address()
                            );
                            let client = handle.client.clone();
                            return Ok(Lease::new(Arc::clone(&self.handles), client));
                        }
                        Err(e) => {
                            warn!(
                                "dropping worker {} at {}: {e}",
                                handle.client.id(),
                                handle.client.address()
                            );
                            handles.remove(index);
                        }
                    }
                }
                if handles.is_empty() {
                    return Err(ExecutionError::EmptyPoolError);
                }
            }
            tokio::time::sleep(self.options.acquire_poll_interval).await;
        }
    }

    /// Asks every worker to stop and empties the pool.
    pub async fn shutdown(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        let results = join_all(handles.iter().map(|x| x.client.stop())).await;
        for (handle, result) in handles.iter().zip(results) {
            match result {
                Ok(()) => info!(
                    "stopped worker {} at {}",
                    handle.client.id(),
                    handle.client.address()
                ),
                Err(e) => warn!(
                    "failed to stop worker {} at {}: {e}",
                    handle.client.id(),
                    handle.client.address()
                ),
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.lock().await.is_empty()
    }

    pub async fn leased_count(&self) -> usize {
        self.handles
            .lock()
            .await
            .iter()
            .filter(|x| x.leased)
            .count()
    }
}
