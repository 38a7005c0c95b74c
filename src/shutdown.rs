use actix_web::dev::ServerHandle;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::worker::CleanupScheduler;

/// Handles graceful shutdown of the application
///
/// This module orchestrates graceful shutdown by:
/// 1. Listening for shutdown signals (SIGTERM, SIGINT/CTRL+C)
/// 2. Stopping the HTTP server; in-flight uploads run to their terminal state
///    within the server's shutdown timeout
/// 3. Cancelling pending retention and record-expiry timers
pub struct ShutdownCoordinator {
    server_handle: ServerHandle,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    cleanup: Arc<CleanupScheduler>,
}

impl ShutdownCoordinator {
    pub fn new(
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
        cleanup: Arc<CleanupScheduler>,
    ) -> Self {
        Self {
            server_handle,
            server_task,
            cleanup,
        }
    }

    /// Wait for shutdown signal and perform graceful shutdown
    ///
    /// Also returns if the server task ends on its own (e.g. a fatal error).
    pub async fn wait_for_shutdown(mut self) -> Result<(), std::io::Error> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install CTRL+C signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM signal handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received CTRL+C signal, shutting down VidCrush server...");
            }
            _ = terminate => {
                info!("Received SIGTERM signal, shutting down VidCrush server...");
            }
            result = &mut self.server_task => {
                error!("HTTP server exited unexpectedly");
                self.cleanup.shutdown().await;
                return match result {
                    Ok(result) => result,
                    Err(e) => Err(std::io::Error::other(e)),
                };
            }
        }

        self.shutdown().await
    }

    /// Perform the actual shutdown sequence
    async fn shutdown(self) -> Result<(), std::io::Error> {
        // 1. Stop HTTP server; pending uploads get until the shutdown timeout
        info!("Stopping HTTP server (no longer accepting new requests)...");
        self.server_handle.stop(true).await;

        match self.server_task.await {
            Ok(Ok(_)) => info!("HTTP server shut down successfully"),
            Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
            Err(e) => error!("HTTP server task panicked: {:?}", e),
        }

        // 2. Cancel scheduled cleanup
        info!("Cancelling scheduled cleanup tasks...");
        self.cleanup.shutdown().await;
        info!("Cleanup scheduler stopped");

        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}
