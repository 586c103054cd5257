//! Services module
//!
//! Business logic services that coordinate between callers and the repository.

pub mod backup;
pub mod entries;
pub mod files;
pub mod maintenance;
pub mod scheduler;
pub mod stats;
pub mod users;

pub use backup::{BackupRecord, BackupService};
pub use entries::EntriesService;
pub use files::FilesService;
pub use maintenance::MaintenanceService;
pub use scheduler::{JobFrequency, MaintenanceJob, SchedulerService};
pub use stats::StatsService;
pub use users::UsersService;
