use std::convert::Infallible;
use std::future::Future;

use log::debug;
use tokio::net::TcpListener;
use tonic::body::BoxBody;
use tonic::codegen::http::{Request, Response};
use tonic::codegen::Service;
use tonic::server::NamedService;
use tonic::transport::server::{Router, TcpIncoming};
use tonic_health::server::HealthReporter;

pub struct ServerBuilderOptions {
    pub nodelay: bool,
    pub keepalive: Option<std::time::Duration>,
}

impl Default for ServerBuilderOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: None,
        }
    }
}

/// Builds a gRPC server that always exposes the standard health service.
/// Clients use the health service as a cheap liveness probe.
pub struct ServerBuilder {
    name: &'static str,
    options: ServerBuilderOptions,
    health_reporter: HealthReporter,
    router: Router,
}

impl ServerBuilder {
    pub fn new(name: &'static str, options: ServerBuilderOptions) -> Self {
        let (health_reporter, health_server) = tonic_health::server::health_reporter();

        let router = tonic::transport::Server::builder()
            .tcp_nodelay(options.nodelay)
            .tcp_keepalive(options.keepalive)
            .add_service(health_server);

        Self {
            name,
            options,
            health_reporter,
            router,
        }
    }

    pub async fn add_service<S>(mut self, service: S) -> Self
    where
        S: Service<Request<BoxBody>, Response = Response<BoxBody>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.health_reporter.set_serving::<S>().await;
        self.router = self.router.add_service(service);
        self
    }

    pub async fn serve<F>(
        self,
        // We must use the TCP listener from tokio.
        // The TCP listener from the standard library does not work with graceful shutdown.
        // See also: https://github.com/hyperium/tonic/issues/1424
        listener: TcpListener,
        signal: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()>,
    {
        debug!(
            "serving {} on {}",
            self.name,
            listener
                .local_addr()
                .map(|x| x.to_string())
                .unwrap_or_else(|_| "unknown address".to_string())
        );
        let incoming =
            TcpIncoming::from_listener(listener, self.options.nodelay, self.options.keepalive)?;

        self.router
            .serve_with_incoming_shutdown(incoming, signal)
            .await?;

        Ok(())
    }
}
