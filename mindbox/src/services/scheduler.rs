/// Scheduler Service
/// Runs the maintenance jobs (document backup, avatar cleanup) on cron
/// schedules, each job independently of the other
use crate::error::{AppError, Result};
use crate::services::MaintenanceService;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// How often a maintenance job runs.
///
/// Step values must fit their cron field, so minutes stay below 60,
/// hours below 24 and days at most 31. Weekly and monthly runs are pinned to
/// the calendar (Sunday, the 1st) instead of a day-of-month step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFrequency {
    Minutes(u32),
    Hours(u32),
    Days(u32),
    Weekly,
    Monthly,
}

impl JobFrequency {
    /// Six-field cron expression; daily and slower jobs run at 2 AM
    pub fn to_cron(self) -> String {
        match self {
            JobFrequency::Minutes(1) => "0 * * * * *".to_string(),
            JobFrequency::Minutes(m) => format!("0 */{} * * * *", m),
            JobFrequency::Hours(1) => "0 0 * * * *".to_string(),
            JobFrequency::Hours(h) => format!("0 0 */{} * * *", h),
            JobFrequency::Days(1) => "0 0 2 * * *".to_string(),
            JobFrequency::Days(d) => format!("0 0 2 */{} * *", d),
            JobFrequency::Weekly => "0 0 2 * * Sun".to_string(),
            JobFrequency::Monthly => "0 0 2 1 * *".to_string(),
        }
    }
}

impl FromStr for JobFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        match s.as_str() {
            "daily" => return Ok(JobFrequency::Days(1)),
            "weekly" => return Ok(JobFrequency::Weekly),
            "monthly" => return Ok(JobFrequency::Monthly),
            _ => {}
        }

        let Some(unit) = s.chars().last() else {
            return Err("Empty frequency string".to_string());
        };
        let value: u32 = s[..s.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| format!("Invalid number in frequency: {}", s))?;

        let (frequency, max) = match unit {
            'm' => (JobFrequency::Minutes(value), 59),
            'h' => (JobFrequency::Hours(value), 23),
            'd' => (JobFrequency::Days(value), 31),
            _ => {
                return Err(format!(
                    "Invalid frequency unit '{}'. Use 'm' (minutes), 'h' (hours), or 'd' (days)",
                    unit
                ))
            }
        };

        if !(1..=max).contains(&value) {
            return Err(format!("Frequency '{}' must be between 1{} and {}{}", s, unit, max, unit));
        }

        Ok(frequency)
    }
}

/// The maintenance jobs the scheduler knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceJob {
    Backup,
    AvatarCleanup,
}

impl fmt::Display for MaintenanceJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintenanceJob::Backup => write!(f, "document backup"),
            MaintenanceJob::AvatarCleanup => write!(f, "avatar cleanup"),
        }
    }
}

/// Scheduler service for the maintenance jobs
pub struct SchedulerService {
    scheduler: Arc<RwLock<JobScheduler>>,
    maintenance: Arc<MaintenanceService>,
    job_ids: Arc<RwLock<HashMap<MaintenanceJob, Uuid>>>,
}

impl SchedulerService {
    /// Create new scheduler service
    pub async fn new(maintenance: MaintenanceService) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            maintenance: Arc::new(maintenance),
            job_ids: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<()> {
        let scheduler = self.scheduler.read().await;
        scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;
        tracing::info!("Maintenance scheduler started");
        Ok(())
    }

    pub async fn schedule_backup(&self, frequency: JobFrequency) -> Result<()> {
        self.schedule(MaintenanceJob::Backup, frequency).await
    }

    pub async fn schedule_avatar_cleanup(&self, frequency: JobFrequency) -> Result<()> {
        self.schedule(MaintenanceJob::AvatarCleanup, frequency).await
    }

    /// Schedule a job, replacing its previous schedule if any
    pub async fn schedule(&self, kind: MaintenanceJob, frequency: JobFrequency) -> Result<()> {
        self.cancel(kind).await?;

        let cron_expr = frequency.to_cron();
        let maintenance = Arc::clone(&self.maintenance);

        let job = Job::new_async(cron_expr.clone(), move |_uuid, _l| {
            let maintenance = Arc::clone(&maintenance);
            Box::pin(async move {
                tracing::info!("Running scheduled {}", kind);
                run_job(&maintenance, kind).await;
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create {} job: {}", kind, e)))?;

        let job_id = job.guid();

        let mut job_ids = self.job_ids.write().await;
        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to schedule job: {}", e)))?;

        job_ids.insert(kind, job_id);

        tracing::info!("Scheduled {}: {:?} ({})", kind, frequency, cron_expr);
        Ok(())
    }

    /// Cancel a scheduled job. Cancelling an unscheduled job is a no-op.
    pub async fn cancel(&self, kind: MaintenanceJob) -> Result<()> {
        let mut job_ids = self.job_ids.write().await;

        if let Some(job_id) = job_ids.remove(&kind) {
            let scheduler = self.scheduler.write().await;
            scheduler
                .remove(&job_id)
                .await
                .map_err(|e| AppError::Scheduler(format!("Failed to remove job: {}", e)))?;

            tracing::info!("Cancelled scheduled {}", kind);
        }

        Ok(())
    }

    /// Whether a job currently has a schedule
    pub async fn is_scheduled(&self, kind: MaintenanceJob) -> bool {
        self.job_ids.read().await.contains_key(&kind)
    }

    /// Shutdown scheduler gracefully
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to shutdown scheduler: {}", e)))?;
        tracing::info!("Maintenance scheduler shutdown");
        Ok(())
    }
}

/// Run one job to completion, logging the outcome. Failures never escape
/// the scheduler.
async fn run_job(maintenance: &MaintenanceService, kind: MaintenanceJob) {
    match kind {
        MaintenanceJob::Backup => match maintenance.backup_document().await {
            Ok(Some(record)) => tracing::info!("Scheduled backup created: {:?}", record.path),
            Ok(None) => tracing::info!("Scheduled backup skipped, no document yet"),
            Err(e) => tracing::error!("Scheduled backup failed: {}", e),
        },
        MaintenanceJob::AvatarCleanup => match maintenance.prune_stale_avatars(None).await {
            Ok(pruned) => tracing::info!("Scheduled avatar cleanup pruned {}", pruned.len()),
            Err(e) => tracing::error!("Scheduled avatar cleanup failed: {}", e),
        },
    }
}
