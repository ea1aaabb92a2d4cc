use std::sync::Arc;

use youtarr_core::config::CoreConfig;
use youtarr_core::database::{
    self,
    repositories::{SqlxChannelRepository, SqlxVideoRepository},
};
use youtarr_core::grouping::ChannelGrouper;
use youtarr_core::logging::init_logging;
use youtarr_core::reconcile::Reconciler;
use youtarr_core::scheduler::{ReconcileScheduler, SchedulerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CoreConfig::from_env()?;

    let _log_guard = init_logging(&config.log_dir)?;

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let channels = SqlxChannelRepository::new(pool.clone());
    let groups = ChannelGrouper::from_config(&config)
        .generate_download_groups(&channels, None, None)
        .await?;
    for group in &groups {
        tracing::info!(
            quality = %group.quality,
            subfolder = ?group.subfolder,
            channels = group.len(),
            "Download group"
        );
    }

    let videos = Arc::new(SqlxVideoRepository::new(pool.clone()));
    let reconciler = Arc::new(
        Reconciler::new(videos, config.output_dir.clone()).with_options(config.reconcile_options()),
    );

    // `--once` reconciles immediately and exits
    if std::env::args().any(|arg| arg == "--once") {
        let report = reconciler.reconcile(config.reconcile_time_budget()).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        pool.close().await;
        return Ok(());
    }

    let scheduler = Arc::new(ReconcileScheduler::new(
        SchedulerConfig::from_core(&config),
        reconciler,
    ));
    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = scheduler.start(cancel.clone());

    tracing::info!(
        output_dir = %config.output_dir.display(),
        "youtarr-core initialized successfully"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    cancel.cancel();
    handle.await?;
    pool.close().await;

    Ok(())
}
