// Mindbox maintenance runner
// Runs the document backup and avatar cleanup jobs once or on a schedule

use anyhow::{anyhow, Context};
use mindbox::app;
use mindbox::services::{JobFrequency, SchedulerService};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_BACKUP_FREQUENCY: &str = "daily";
const DEFAULT_AVATAR_CLEANUP_FREQUENCY: &str = "weekly";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mindbox=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = env::var("MINDBOX_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
    let command = env::args().nth(1).unwrap_or_else(|| "run".to_string());

    tracing::info!("Starting Mindbox maintenance ({})", command);

    let state = app::setup(PathBuf::from(data_dir), true)
        .await
        .context("failed to initialize data directory")?;

    match command.as_str() {
        "backup" => match state.maintenance.backup_document().await? {
            Some(record) => tracing::info!("Backup written to {:?}", record.path),
            None => tracing::info!("No document yet, nothing to back up"),
        },
        "prune-avatars" => {
            let pruned = state.maintenance.prune_stale_avatars(None).await?;
            tracing::info!("Pruned {} stale avatar(s)", pruned.len());
        }
        "run" => {
            let backup_frequency = frequency_from_env(
                "MINDBOX_BACKUP_FREQUENCY",
                DEFAULT_BACKUP_FREQUENCY,
            )?;
            let cleanup_frequency = frequency_from_env(
                "MINDBOX_AVATAR_CLEANUP_FREQUENCY",
                DEFAULT_AVATAR_CLEANUP_FREQUENCY,
            )?;

            let scheduler = SchedulerService::new(state.maintenance.clone()).await?;
            scheduler.schedule_backup(backup_frequency).await?;
            scheduler.schedule_avatar_cleanup(cleanup_frequency).await?;
            scheduler.start().await?;

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;

            tracing::info!("Shutdown requested");
            scheduler.shutdown().await?;
        }
        other => {
            return Err(anyhow!(
                "unknown command '{}' (expected backup, prune-avatars or run)",
                other
            ))
        }
    }

    Ok(())
}

fn frequency_from_env(key: &str, default: &str) -> anyhow::Result<JobFrequency> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse()
        .map_err(|e: String| anyhow!("{}: {}", key, e))
}
