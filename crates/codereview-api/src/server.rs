use crate::{create_router, AppState};
use anyhow::Context;
use codereview_core::Settings;
use codereview_pipeline::spawn_inference_probe;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

pub struct Server {
    state: AppState,
    addr: SocketAddr,
    probe_interval: Option<Duration>,
}

impl Server {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        crate::metrics::register_metrics();

        let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid listen address {}:{}",
                    settings.server.host, settings.server.port
                )
            })?;
        let state = AppState::from_settings(settings).await?;
        let probe_interval = match settings.inference.health_probe_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            state,
            addr,
            probe_interval,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let _probe = self.probe_interval.map(|interval| {
            info!(interval_secs = interval.as_secs(), "Starting inference health probe");
            spawn_inference_probe(
                self.state.pipeline.generator().clone(),
                self.state.pipeline.inference_health().clone(),
                interval,
            )
        });

        let router = create_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("binding {}", self.addr))?;

        info!("Code review agent listening on http://{}", self.addr);
        info!("  POST /analyze-code");
        info!("  GET  /analysis-history");
        info!("  GET  /health");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
