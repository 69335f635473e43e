//! Listener setup and graceful shutdown.

use std::net::SocketAddr;

use thiserror::Error;

use super::http::{create_router, AppState};
use crate::config::Config;
use crate::media::{FetchError, ProbePipeline};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error(transparent)]
    Setup(#[from] FetchError),
}

/// Socket address the server listens on.
pub fn listen_addr(config: &Config) -> SocketAddr {
    SocketAddr::new(config.server.bind, config.server.port)
}

/// Bind, serve until SIGINT/SIGTERM, then drain in-flight requests.
pub async fn serve(config: &Config) -> Result<(), ServerError> {
    let pipeline = ProbePipeline::from_config(config)?;
    let addr = listen_addr(config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let local = listener.local_addr().map_err(ServerError::Serve)?;

    tracing::info!(
        address = %local,
        analyzer = %config.analyzer.program,
        scratch_dir = %pipeline.scratch().dir().display(),
        "mediaprobe listening"
    );

    let app = create_router(AppState::new(pipeline));
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(ServerError::Serve)?;

    tracing::info!("server stopped");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addr_from_config() {
        let mut config = Config::default();
        config.server.bind = "127.0.0.1".parse().unwrap();
        config.server.port = 9000;
        assert_eq!(listen_addr(&config).to_string(), "127.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = Config::default();
        config.server.bind = "127.0.0.1".parse().unwrap();
        config.server.port = taken.local_addr().unwrap().port();

        let err = serve(&config).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
