use crate::backend::PgBackend;
use crate::cli::actions::{Action, RunOptions};
use crate::cli::telemetry::shutdown_tracer;
use crate::gatherers::GathererRegistry;
use crate::scheduler::Coordinator;
use crate::status;
use anyhow::{Context, Result, anyhow};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info};

/// Handle the run action
///
/// # Errors
///
/// Returns an error if the monitoring database or the status port is unavailable at startup.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Run(options) => run(options).await,
    }
}

async fn connect(options: &RunOptions) -> Result<PgPool> {
    match timeout(
        Duration::from_secs(5),
        PgPoolOptions::new()
            .min_connections(1)
            .max_connections(options.max_connections)
            .max_lifetime(Duration::from_secs(60 * 5))
            .test_before_acquire(true)
            .connect(options.dsn.expose_secret()),
    )
    .await
    {
        Ok(Ok(pool)) => Ok(pool),
        Ok(Err(err)) => Err(err).context("Failed to connect to monitoring database"),
        Err(_) => Err(anyhow!(
            "Failed to connect to monitoring database: timed out after 5s"
        )),
    }
}

async fn run(options: RunOptions) -> Result<()> {
    let pool = connect(&options).await?;

    info!("Connected to monitoring database");

    let registry = GathererRegistry::new();
    let metrics = prometheus::Registry::new();
    registry.register_metrics(&metrics)?;

    let backend = Arc::new(PgBackend::new(pool.clone(), options.source));

    let (stop, stopped) = watch::channel(false);
    let coordinator = Coordinator::new(backend, registry.clone());
    let reloads = tokio::spawn(coordinator.run(pool.clone(), options.reload_interval, stopped));

    let (listener, bind_addr) = status::bind(options.port, options.listen.as_deref()).await?;

    println!(
        "{} {} - Listening on {bind_addr}\n\nHosts reloaded every {}s, statement timeout {}s",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        options.reload_interval.as_secs(),
        options.source.statement_timeout.as_secs(),
    );

    let app = status::router(pool.clone(), registry, metrics);

    if let Err(e) = status::serve(listener, app).await {
        error!(error = %e, "server error");
    }

    info!("shutting down");

    let _ = stop.send(true);
    if let Err(e) = reloads.await {
        error!(error = %e, "host reload task failed");
    }

    pool.close().await;

    shutdown_tracer();

    Ok(())
}
