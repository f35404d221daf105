use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::error::Error;
use crate::gateway::MigrationGateway;

/// HTTP listener in front of a [`MigrationGateway`].
pub struct GatewayServer {
    gateway: Arc<MigrationGateway>,
    listen_addr: SocketAddr,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl GatewayServer {
    /// Creates a new instance of `GatewayServer`.
    #[must_use]
    pub fn new(gateway: Arc<MigrationGateway>, listen_addr: SocketAddr) -> Self {
        Self {
            gateway,
            listen_addr,
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Bind and start serving. Returns the bound address, which differs from
    /// the configured one when port `0` was requested.
    pub async fn start(&self) -> Result<SocketAddr, Error> {
        if self.task_tracker.is_closed() {
            return Err(Error::AlreadyStarted);
        }

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| Error::Io("error binding listener", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Io("error reading listener address", e))?;

        let router = self.gateway.router();
        let shutdown_token = self.shutdown_token.clone();
        let serve_token = shutdown_token.clone();

        self.task_tracker.spawn(async move {
            let serve = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(serve_token.cancelled_owned());

            if let Err(e) = serve.await {
                error!("gateway server exited: {e}");
                shutdown_token.cancel();
            }
        });

        self.task_tracker.close();

        info!(%local_addr, "gateway listening");

        Ok(local_addr)
    }

    /// Stop accepting connections, let in-flight requests finish, then wait
    /// for detached replication and shadow tasks.
    pub async fn shutdown(&self) {
        info!("gateway shutting down...");

        self.shutdown_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        self.gateway.drain().await;

        info!("gateway shutdown");
    }

    /// Resolves once shutdown has been requested or the listener has failed.
    pub async fn wait(&self) {
        self.shutdown_token.cancelled().await;
    }
}
