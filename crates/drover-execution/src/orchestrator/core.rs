use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use drover_deploy::error::DeployError;
use drover_deploy::{parse_hosts, Deployer, HandshakeLock, ProvisionedHost, RemoteHost};
use futures::FutureExt;
use log::{debug, error, info};

use crate::error::{ExecutionError, ExecutionResult};
use crate::orchestrator::{Orchestrator, Provisioned};
use crate::pool::WorkerPool;

impl Orchestrator {
    /// Runs `f` against a pool of workers provisioned on the configured hosts.
    ///
    /// Hosts that fail to provision are logged and left out of the pool.
    /// The workers are stopped and the hosts cleaned up before the result of
    /// `f` is returned, whether `f` succeeds, fails, or panics.
    pub async fn run<F, Fut, T>(&self, f: F) -> ExecutionResult<T>
    where
        F: FnOnce(Arc<WorkerPool>) -> Fut,
        Fut: Future<Output = ExecutionResult<T>>,
    {
        self.options.validate()?;
        let descriptors =
            parse_hosts(&self.options.hosts, self.options.port).map_err(|e| match e {
                DeployError::ConfigurationError(x) => ExecutionError::ConfigurationError(x),
                e => e.into(),
            })?;
        let deployer = Deployer::new(self.options.deploy.clone());
        let handshake = HandshakeLock::new();
        let hosts = descriptors
            .into_iter()
            .map(|descriptor| {
                let transport = self.factory.create(&descriptor);
                RemoteHost::new(descriptor, transport, handshake.clone())
            })
            .collect::<Vec<_>>();

        let provisioned = self.setup(&deployer, hosts).await;
        tokio::time::sleep(self.options.settle_delay).await;

        let started = provisioned
            .iter()
            .filter(|x| x.started)
            .map(|x| x.remote.descriptor().clone())
            .collect::<Vec<_>>();
        let result = match WorkerPool::connect(&started, self.options.pool.clone()).await {
            Ok(pool) => {
                let pool = Arc::new(pool);
                let result = AssertUnwindSafe(f(Arc::clone(&pool)))
                    .catch_unwind()
                    .await;
                pool.shutdown().await;
                result
            }
            Err(e) => Ok(Err(e)),
        };

        self.teardown(&deployer, provisioned).await;
        match result {
            Ok(x) => x,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    async fn setup(&self, deployer: &Deployer, hosts: Vec<RemoteHost>) -> Vec<Provisioned> {
        let tasks = hosts
            .into_iter()
            .map(|remote| {
                let deployer = deployer.clone();
                tokio::spawn(async move {
                    let mut target = ProvisionedHost::new(remote.descriptor().clone());
                    let result = AssertUnwindSafe(remote.with_session(|host| {
                        let target = &mut target;
                        async move { deployer.startup(&host, target).await }
                    }))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(DeployError::InternalError(
                            "provisioning panicked".to_string(),
                        ))
                    });
                    (remote, target, result)
                })
            })
            .collect::<Vec<_>>();

        let mut provisioned = vec![];
        for task in tasks {
            match task.await {
                Ok((remote, target, Ok(()))) => {
                    info!("provisioned {}", remote.descriptor());
                    provisioned.push(Provisioned {
                        remote,
                        target,
                        started: true,
                    });
                }
                Ok((remote, target, Err(e))) => {
                    error!("failed to provision {}: {e}", remote.descriptor());
                    provisioned.push(Provisioned {
                        remote,
                        target,
                        started: false,
                    });
                }
                Err(e) => error!("provisioning task failed: {e}"),
            }
        }
        provisioned
    }

    async fn teardown(&self, deployer: &Deployer, provisioned: Vec<Provisioned>) {
        let tasks = provisioned
            .into_iter()
            .filter(|x| x.target.working_directory.is_some())
            .map(|Provisioned { remote, mut target, .. }| {
                let deployer = deployer.clone();
                tokio::spawn(async move {
                    let result = remote
                        .with_session(|host| {
                            let target = &mut target;
                            async move { deployer.teardown(&host, target).await }
                        })
                        .await;
                    (remote, result)
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            match task.await {
                Ok((remote, Ok(()))) => debug!("cleaned up {}", remote.descriptor()),
                Ok((remote, Err(e))) => error!("failed to clean up {}: {e}", remote.descriptor()),
                Err(e) => error!("cleanup task failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use drover_deploy::testing::{ScriptedTransport, ScriptedTransportFactory};
    use drover_deploy::transport::CommandOutput;
    use drover_deploy::DeployOptions;

    use super::*;
    use crate::orchestrator::OrchestratorOptions;
    use crate::testing::{pool_options, spawn_worker, TestWorker};

    fn options(workers: &[&TestWorker]) -> OrchestratorOptions {
        OrchestratorOptions {
            deploy: DeployOptions {
                app_name: "drover".to_string(),
                dirs: vec!["/no/such/payload".to_string()],
                packages: vec![],
                run: Some("lib/worker.sh".to_string()),
                source_files: vec![],
                package_query: "dpkg-query -W {package}".to_string(),
                script_runtime: "sh".to_string(),
                leave_files: false,
            },
            hosts: workers
                .iter()
                .map(|x| format!("tester@127.0.0.1:{}", x.port))
                .collect(),
            port: 9000,
            settle_delay: Duration::ZERO,
            pool: pool_options(),
        }
    }

    async fn wait_stopped(worker: TestWorker) -> ExecutionResult<()> {
        tokio::time::timeout(Duration::from_secs(5), worker.handle)
            .await
            .map_err(|_| ExecutionError::InternalError("the worker is still running".to_string()))??
    }

    fn assert_torn_down(factory: &ScriptedTransportFactory) {
        for (host, transport) in factory.transports() {
            let commands = transport.commands();
            assert!(
                commands.iter().any(|x| x.ends_with("worker_controller stop")),
                "{host}: {commands:?}"
            );
            assert!(
                commands.last().is_some_and(|x| x.starts_with("rm -rf ~/.drover/")),
                "{host}: {commands:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_run_job_on_provisioned_workers() -> ExecutionResult<()> {
        let first = spawn_worker().await?;
        let second = spawn_worker().await?;
        let factory = Arc::new(ScriptedTransportFactory::new(|_| ScriptedTransport::new()));
        let orchestrator = Orchestrator::new(options(&[&first, &second]), factory.clone());

        let values = orchestrator
            .run(|pool| async move {
                assert_eq!(pool.len().await, 2);
                pool.acquire(|client| async move { client.multiples(3, 20).await })
                    .await
            })
            .await?;

        assert_eq!(values, vec![6, 9, 12, 15, 18]);
        assert_eq!(factory.transports().len(), 2);
        assert_torn_down(&factory);
        wait_stopped(first).await?;
        wait_stopped(second).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_teardown_after_job_failure() -> ExecutionResult<()> {
        let worker = spawn_worker().await?;
        let factory = Arc::new(ScriptedTransportFactory::new(|_| ScriptedTransport::new()));
        let orchestrator = Orchestrator::new(options(&[&worker]), factory.clone());

        let result = orchestrator
            .run(|_| async { Err::<(), _>(ExecutionError::InternalError("job failed".to_string())) })
            .await;

        assert!(matches!(result, Err(ExecutionError::InternalError(x)) if x == "job failed"));
        assert_torn_down(&factory);
        wait_stopped(worker).await
    }

    #[tokio::test]
    async fn test_failed_host_is_left_out() -> ExecutionResult<()> {
        let good = spawn_worker().await?;
        let bad = spawn_worker().await?;
        let bad_port = bad.port;
        let factory = Arc::new(ScriptedTransportFactory::new(move |host| {
            if host.port() == bad_port {
                ScriptedTransport::new().on("mkdir", CommandOutput::new(1, "Permission denied"))
            } else {
                ScriptedTransport::new()
            }
        }));
        let orchestrator = Orchestrator::new(options(&[&good, &bad]), factory.clone());

        let count = orchestrator
            .run(|pool| async move { Ok(pool.len().await) })
            .await?;

        assert_eq!(count, 1);
        for (host, transport) in factory.transports() {
            let removed = transport.commands().iter().any(|x| x.starts_with("rm -rf"));
            assert_eq!(removed, host.port() != bad_port, "{host}");
        }
        wait_stopped(good).await?;
        bad.handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_panicked_host_is_torn_down() -> ExecutionResult<()> {
        let factory = Arc::new(ScriptedTransportFactory::new(|_| {
            ScriptedTransport::new().panic_on(" start -- ")
        }));
        let mut options = options(&[]);
        options.hosts = vec!["tester@127.0.0.1:9".to_string()];
        let orchestrator = Orchestrator::new(options, factory.clone());

        let count = orchestrator
            .run(|pool| async move { Ok(pool.len().await) })
            .await?;

        assert_eq!(count, 0);
        assert_torn_down(&factory);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_options() {
        let factory = Arc::new(ScriptedTransportFactory::new(|_| ScriptedTransport::new()));
        let mut missing_run = options(&[]);
        missing_run.hosts = vec!["localhost".to_string()];
        missing_run.deploy.run = None;
        let mut missing_dirs = missing_run.clone();
        missing_dirs.deploy.run = Some("lib/worker.sh".to_string());
        missing_dirs.deploy.dirs.clear();
        let missing_hosts = options(&[]);

        let mut malformed_host = options(&[]);
        malformed_host.hosts = vec!["me@localhost:port".to_string()];

        for options in [missing_run, missing_dirs, missing_hosts, malformed_host] {
            let orchestrator = Orchestrator::new(options, factory.clone());
            let result = orchestrator.run(|_| async { Ok(()) }).await;
            assert!(matches!(result, Err(ExecutionError::ConfigurationError(_))));
        }
        assert!(factory.transports().is_empty());
    }
}
