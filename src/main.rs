use anyhow::Result;
use clap::Parser;
use rollupd::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use rollupd::aggregator::StatsAggregator;
use rollupd::cli::{AuditArgs, Cli, Commands};
use rollupd::queue::JobQueue;

struct UtcTimer;

impl FormatTime for UtcTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_timer(UtcTimer)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            init_tracing(false);
            serve().await
        }
        Commands::Audit(args) => {
            init_tracing(args.verbose);
            audit(args).await
        }
    }
}

/// One-shot backfill of the partition containing `--from`. Usage errors exit cleanly.
async fn audit(args: AuditArgs) -> Result<()> {
    let request = match args.validate() {
        Ok(r) => r,
        Err(e) => {
            tracing::info!("{}", e);
            println!("{}", cli::audit_usage());
            return Ok(());
        }
    };

    let app_config = config::AppConfig::load()?;
    let pool = db::connect(&app_config.database.path, app_config.database.max_pool_size).await?;
    let stats_repo = Arc::new(stats_repo::StatsRepo::new(pool));
    stats_repo.init().await?;

    let auditor = auditor::Auditor::new(
        stats_repo,
        Duration::from_millis(app_config.auditor.tick_ms),
    );
    let report = auditor
        .audit(request.from, request.to, request.granularity, false)
        .await;
    if report.failed > 0 {
        anyhow::bail!("audit of {} failed", request.granularity);
    }
    Ok(())
}

async fn serve() -> Result<()> {
    let app_config = config::AppConfig::load()?;
    let orchestrator_config = app_config.scheduler.orchestrator_config()?;

    let pool = db::connect(&app_config.database.path, app_config.database.max_pool_size).await?;
    let stats_repo = Arc::new(stats_repo::StatsRepo::new(pool.clone()));
    stats_repo.init().await?;
    let job_queue = Arc::new(queue::SqliteJobQueue::new(pool));
    job_queue.init().await?;
    let recovered = job_queue.recover_active().await?;
    if recovered > 0 {
        tracing::info!(recovered, "Recovered jobs left active by a previous run");
    }

    let queue: Arc<dyn JobQueue> = job_queue;
    let aggregator: Arc<dyn StatsAggregator> = stats_repo;
    let (shutdown_tx, shutdown_rx) = shutdown::channel();

    let auditor = Arc::new(
        auditor::Auditor::new(
            aggregator.clone(),
            Duration::from_millis(app_config.auditor.tick_ms),
        )
        .with_shutdown(shutdown_rx.clone()),
    );
    let ctx = Arc::new(jobs::JobContext {
        queue: queue.clone(),
        aggregator,
        auditor,
    });
    let worker_handle = worker::spawn(ctx, app_config.worker_config(), shutdown_rx.clone());
    let orchestrator_handle = orchestrator::Orchestrator::new(queue.clone(), orchestrator_config)
        .spawn(shutdown_rx.clone());

    let app = routes::app(queue);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = orchestrator_handle.await;
    let _ = worker_handle.await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
