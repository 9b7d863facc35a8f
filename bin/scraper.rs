use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, warn};
use simple_logger::SimpleLogger;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use delegator::{
    PostgresClient, ScraperOptions, ScraperService, Settings, ShutdownSignal, Subscriber,
    TzktClient,
};

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
    postgres.migrate().await?;

    let checkpoint = postgres
        .initialise_checkpoint(settings.scraper.initial_checkpoint)
        .await?;
    info!("Resuming after delegation id {}", checkpoint.last_id);

    let http = reqwest::Client::builder()
        .timeout(settings.scraper.http_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let tzkt = TzktClient::new(http, settings.scraper.tzkt_url.clone());

    let scraper = ScraperService::new(
        Arc::new(tzkt),
        Arc::new(postgres),
        ScraperOptions::default()
            .with_batch_size(settings.scraper.batch_size)
            .with_poll_interval(settings.scraper.poll_interval()),
    );

    let mut shutdown = ShutdownSignal::new();
    if let Some(timeout) = settings.scraper.run_timeout() {
        info!("Run will stop after {:?}", timeout);
        shutdown = shutdown.with_deadline(timeout);
    }

    let (events, mut run_handle) = scraper.start(shutdown.clone());
    let subscriber = logging_subscriber().spawn(events);

    info!("Scraper running. Press Ctrl+C to stop.");
    // The run also ends on its own after a fatal backfill error or the deadline
    let finished = tokio::select! {
        res = wait_for_signal() => {
            res?;
            info!("Finishing current batch...");
            shutdown.cancel();
            None
        },
        res = &mut run_handle => Some(res),
    };

    let result = match finished {
        Some(result) => result,
        None => run_handle.await,
    };
    if let Err(e) = result {
        error!("Scraper task failed: {}", e);
    }
    subscriber.close().await;

    info!("Scraper stopped");
    Ok(())
}

fn logging_subscriber() -> Subscriber {
    Subscriber::new()
        .on_backfill_started(|e| {
            info!(
                "Backfill started at {} from checkpoint {}",
                e.started_at, e.checkpoint
            )
        })
        .on_backfill_sync_completed(|e| {
            info!(
                "Backfill batch: {} delegations (batch size {}), checkpoint {}",
                e.fetched, e.batch_size, e.checkpoint
            )
        })
        .on_backfill_done(|e| {
            info!(
                "Backfill done: {} delegations in {:?}",
                e.total_processed, e.elapsed
            )
        })
        .on_backfill_error(|e| error!("Backfill failed: {}", e.error))
        .on_polling_started(|e| info!("Polling every {:?}", e.interval))
        .on_polling_sync_completed(|e| {
            if e.fetched == 0 {
                info!("Poll: no new records, checkpoint {}", e.checkpoint);
            } else {
                info!(
                    "Poll: {} new delegations, checkpoint {}",
                    e.fetched, e.checkpoint
                );
            }
        })
        .on_polling_shutdown(|e| warn!("Scraper shutting down: {}", e.reason))
        .on_polling_error(|e| error!("Poll failed: {}", e.error))
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received shutdown signal (Ctrl+C)"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal (Ctrl+C)");
    }

    Ok(())
}
