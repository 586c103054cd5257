//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config;
use crate::database::{self, Repository};
use crate::error::Result;
use crate::services::{
    BackupService, EntriesService, FilesService, MaintenanceService, StatsService, UsersService,
};
use crate::storage::AvatarStore;
use std::path::PathBuf;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub repo: Repository,
    pub avatars: AvatarStore,
    pub users: UsersService,
    pub files: FilesService,
    pub entries: EntriesService,
    pub stats: StatsService,
    pub maintenance: MaintenanceService,
}

impl AppState {
    pub fn document_path(&self) -> PathBuf {
        self.data_dir.join(config::DOCUMENT_FILE_NAME)
    }
}

/// Application setup - called once on startup.
///
/// Creates the data, avatar and backup directories and wires every service
/// to one repository over `<data_dir>/mindbox_data.json`.
pub async fn setup(data_dir: PathBuf, serialized: bool) -> Result<AppState> {
    tracing::info!("Initializing application");
    tracing::info!("Data directory: {:?}", data_dir);

    // Create necessary directories
    tokio::fs::create_dir_all(&data_dir).await?;
    let backups_dir = data_dir.join(config::BACKUPS_DIR_NAME);
    tokio::fs::create_dir_all(&backups_dir).await?;

    let avatars = AvatarStore::new(data_dir.join(config::AVATARS_DIR_NAME));
    avatars.initialize().await?;

    let document_path = data_dir.join(config::DOCUMENT_FILE_NAME);
    let repo = database::open_repository(&document_path, serialized).await?;

    let backup = BackupService::new(document_path, backups_dir);

    let state = AppState {
        users: UsersService::new(repo.clone(), avatars.clone()),
        files: FilesService::new(repo.clone()),
        entries: EntriesService::new(repo.clone()),
        stats: StatsService::new(repo.clone(), avatars.clone()),
        maintenance: MaintenanceService::new(repo.clone(), avatars.clone(), backup),
        data_dir,
        repo,
        avatars,
    };

    tracing::info!("Application initialized successfully");

    Ok(state)
}
