//! Maintenance jobs
//!
//! The two housekeeping tasks run by the scheduler and the maintenance
//! binary: document backups and stale avatar pruning.

use crate::config;
use crate::database::Repository;
use crate::error::Result;
use crate::services::backup::{BackupRecord, BackupService};
use crate::storage::AvatarStore;
use std::time::{Duration, SystemTime};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct MaintenanceService {
    repo: Repository,
    avatars: AvatarStore,
    backup: BackupService,
}

impl MaintenanceService {
    pub fn new(repo: Repository, avatars: AvatarStore, backup: BackupService) -> Self {
        Self {
            repo,
            avatars,
            backup,
        }
    }

    pub fn backup_service(&self) -> &BackupService {
        &self.backup
    }

    /// Back up the document and rotate old backups
    pub async fn backup_document(&self) -> Result<Option<BackupRecord>> {
        self.backup.create_backup().await
    }

    /// Delete avatars that belong to no user and are older than
    /// `max_age_days` (30 by default)
    pub async fn prune_stale_avatars(&self, max_age_days: Option<i64>) -> Result<Vec<String>> {
        let days = max_age_days.unwrap_or(config::STALE_AVATAR_MAX_AGE_DAYS).max(0) as u64;
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        self.prune_avatars_before(cutoff).await
    }

    /// Delete avatars that belong to no user and were last modified
    /// before `cutoff`
    pub async fn prune_avatars_before(&self, cutoff: SystemTime) -> Result<Vec<String>> {
        let active_user_ids = self.repo.user_ids().await;
        let pruned = self.avatars.prune(&active_user_ids, cutoff).await?;

        tracing::info!("Avatar cleanup removed {} file(s)", pruned.len());

        Ok(pruned)
    }
}
