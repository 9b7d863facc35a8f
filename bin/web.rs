use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{info, warn};
use simple_logger::SimpleLogger;
use tokio::sync::oneshot;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use delegator::web::{router, AppState};
use delegator::{PostgresClient, Settings};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::new()
        .context("Failed to load configuration. Check config.yaml and DELEGATOR__* variables")?;

    SimpleLogger::new()
        .with_level(settings.log_level_filter())
        .init()
        .context("Failed to initialise logger")?;

    let postgres = PostgresClient::new(settings.postgres.clone())
        .await
        .context("Failed to initialize database connection")?;

    let app = router(AppState::new(Arc::new(postgres)));

    let bind_addr = settings.web.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Serving delegations API on http://{}", bind_addr);

    // Fires once a signal arrives so the grace period can start counting
    let (stopping_tx, stopping_rx) = oneshot::channel();
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                if let Err(e) = wait_for_signal().await {
                    warn!("Signal handling failed, shutting down: {:#}", e);
                }
                let _ = stopping_tx.send(());
            })
            .await
    };

    let grace = settings.web.shutdown_timeout();
    tokio::select! {
        res = server => res.context("HTTP server failed")?,
        _ = async {
            let _ = stopping_rx.await;
            tokio::time::sleep(grace).await;
        } => {
            warn!("In-flight requests did not finish within {:?}, exiting", grace);
        },
    }

    info!("Web server stopped");
    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), draining requests...")
            },
            _ = sigterm.recv() => info!("Received SIGTERM, draining requests..."),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal (Ctrl+C), draining requests...");
    }

    Ok(())
}
