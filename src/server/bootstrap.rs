//! gRPC server construction and lifecycle
//!
//! ```ignore
//! let listener = listen(50051).await?;
//! let (server, aggregator) = new_server(&config, &ProcessEnv, "orders", services, probe)?;
//! let mut handle = serve(server.router().add_service(orders), listener)?;
//! tokio::spawn(aggregator.run(handle.subscribe()));
//! wait_for_signal().await?;
//! handle.shutdown().await?;
//! ```

use super::health::HealthService;
use super::shutdown::{shutdown_channel, ShutdownController, ShutdownSignal};
use crate::credentials::{server_credentials, CredentialError, ServerCredentials};
use crate::deploy::{DeployConfig, EnvSource};
use crate::health::{DependencyProbe, HealthAggregator, HealthRegistry, ServiceHealthMap};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tonic_health::pb::health_server::HealthServer;
use tracing::info;

/// Errors that can occur while starting or stopping a server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no port configured for the gRPC server")]
    MissingPort,

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),

    #[error("failed to build server credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("failed to apply TLS config: {0}")]
    Tls(#[source] tonic::transport::Error),

    #[error("server terminated with error: {0}")]
    Serve(#[source] tonic::transport::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("server is already shut down")]
    AlreadyShutdown,
}

/// Bind a TCP listener on every interface
///
/// Port 0 is rejected rather than letting the OS pick, since peers must know
/// where to reach the service.
pub async fn listen(port: u16) -> Result<TcpListener, ServerError> {
    if port == 0 {
        return Err(ServerError::MissingPort);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { port, source })?;

    info!(%addr, "Listening for gRPC connections");
    Ok(listener)
}

/// A configured server with the health endpoint already attached
pub struct GrpcServer {
    service_name: String,
    builder: Server,
    health: HealthServer<HealthService>,
    credentials: ServerCredentials,
}

impl GrpcServer {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn credentials(&self) -> &ServerCredentials {
        &self.credentials
    }

    /// Router with the health service registered
    ///
    /// Callers add their own services with `Router::add_service`.
    pub fn router(mut self) -> Router {
        self.builder.add_service(self.health)
    }
}

/// Build a server for `service_name` and the aggregator feeding its health endpoint
///
/// Credentials follow the deployment mode: plaintext in development, mutual
/// TLS under the peer-pinned strategy, plaintext behind the platform front end
/// under platform identity. Missing or malformed TLS material is an error.
pub fn new_server(
    config: &DeployConfig,
    env: &impl EnvSource,
    service_name: &str,
    services: ServiceHealthMap,
    probe: Arc<dyn DependencyProbe>,
) -> Result<(GrpcServer, HealthAggregator), ServerError> {
    let credentials = server_credentials(config, env, service_name)?;

    let mut builder = Server::builder();
    if let Some(tls) = credentials.tls_config() {
        builder = builder.tls_config(tls).map_err(ServerError::Tls)?;
    }

    let registry = HealthRegistry::new();
    let health = HealthService::new(registry.clone()).into_server();
    let aggregator = HealthAggregator::new(registry, services, probe);

    info!(
        service = service_name,
        mode = %config.mode(),
        encrypted = credentials.is_encrypted(),
        client_cert = credentials.requires_client_cert(),
        "gRPC server configured"
    );

    Ok((
        GrpcServer {
            service_name: service_name.to_string(),
            builder,
            health,
            credentials,
        },
        aggregator,
    ))
}

/// Start serving `router` on `listener` in a background task
#[must_use = "dropping the handle shuts the server down"]
pub fn serve(router: Router, listener: TcpListener) -> Result<ServerHandle, ServerError> {
    let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
    let (controller, signal) = shutdown_channel();

    let incoming = TcpListenerStream::new(listener);
    let task = tokio::spawn(async move {
        let mut signal = signal;
        router
            .serve_with_incoming_shutdown(incoming, async move { signal.wait().await })
            .await
    });

    info!(%local_addr, "gRPC server started");

    Ok(ServerHandle {
        controller,
        task: Some(task),
        local_addr,
    })
}

/// Handle to a running server
///
/// Dropping the handle starts a graceful shutdown of the server and of every
/// task subscribed through [`ServerHandle::subscribe`], but nothing waits for
/// the drain. Call [`ServerHandle::shutdown`] to wait for it.
#[must_use = "dropping the handle shuts the server down"]
pub struct ServerHandle {
    controller: ShutdownController,
    task: Option<JoinHandle<Result<(), tonic::transport::Error>>>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal that fires when this server starts shutting down
    pub fn subscribe(&self) -> ShutdownSignal {
        self.controller.subscribe()
    }

    /// Stop accepting connections and wait for in-flight calls to drain
    ///
    /// A second call returns [`ServerError::AlreadyShutdown`].
    pub async fn shutdown(&mut self) -> Result<(), ServerError> {
        let task = self.task.take().ok_or(ServerError::AlreadyShutdown)?;

        self.controller.shutdown();
        task.await?.map_err(ServerError::Serve)?;

        info!(local_addr = %self.local_addr, "gRPC server stopped");
        Ok(())
    }
}
