//! Backup service
//!
//! Copies the document file into the backups directory under a timestamped
//! name, records its SHA-256 checksum and keeps only the newest backups.

use crate::config;
use crate::database::Document;
use crate::error::{AppError, Result};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

/// A backup file on disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub size: u64,
    pub checksum: String,
}

/// Backup service
#[derive(Clone)]
pub struct BackupService {
    document_path: PathBuf,
    backups_dir: PathBuf,
    retention: usize,
}

impl BackupService {
    pub fn new(document_path: PathBuf, backups_dir: PathBuf) -> Self {
        Self::with_retention(document_path, backups_dir, config::BACKUP_RETENTION_COUNT)
    }

    pub fn with_retention(document_path: PathBuf, backups_dir: PathBuf, retention: usize) -> Self {
        Self {
            document_path,
            backups_dir,
            retention,
        }
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Copy the document into the backups directory. Returns `None` when
    /// there is no document yet.
    pub async fn create_backup(&self) -> Result<Option<BackupRecord>> {
        if !fs::try_exists(&self.document_path).await? {
            tracing::info!("No document at {:?}, nothing to back up", self.document_path);
            return Ok(None);
        }

        fs::create_dir_all(&self.backups_dir).await?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let backup_path = self
            .backups_dir
            .join(format!("{}_{}.json", self.backup_stem(), timestamp));

        let data = fs::read(&self.document_path).await?;
        fs::write(&backup_path, &data).await?;

        let record = BackupRecord {
            path: backup_path,
            size: data.len() as u64,
            checksum: calculate_checksum(&data),
        };

        tracing::info!("Backup created: {:?}", record.path);

        self.apply_retention_policy().await?;

        Ok(Some(record))
    }

    /// Backups in the directory, newest first
    pub async fn list_backups(&self) -> Result<Vec<PathBuf>> {
        if !fs::try_exists(&self.backups_dir).await? {
            return Ok(Vec::new());
        }

        let prefix = format!("{}_", self.backup_stem());
        let mut backups = Vec::new();
        let mut entries = fs::read_dir(&self.backups_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_backup = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".json"));

            if is_backup && entry.file_type().await?.is_file() {
                backups.push(path);
            }
        }

        // Timestamps are zero-padded, so name order is chronological
        backups.sort();
        backups.reverse();

        Ok(backups)
    }

    /// Delete every backup beyond the newest `retention`
    pub async fn apply_retention_policy(&self) -> Result<Vec<PathBuf>> {
        let backups = self.list_backups().await?;
        let mut removed = Vec::new();

        for backup in backups.into_iter().skip(self.retention) {
            match fs::remove_file(&backup).await {
                Ok(()) => {
                    tracing::debug!("Deleted old backup: {:?}", backup);
                    removed.push(backup);
                }
                Err(e) => tracing::warn!("Failed to delete backup file {:?}: {}", backup, e),
            }
        }

        if !removed.is_empty() {
            tracing::info!("Retention policy removed {} backup(s)", removed.len());
        }

        Ok(removed)
    }

    /// Replace the document with a backup. The backup must parse as a
    /// document; the current file is only touched once it does.
    pub async fn restore_backup(&self, backup_path: &Path) -> Result<()> {
        tracing::info!("Restoring backup: {:?}", backup_path);

        let data = fs::read(backup_path).await?;
        serde_json::from_slice::<Document>(&data)
            .map_err(|e| AppError::Backup(format!("Backup is not a valid document: {}", e)))?;

        if let Some(parent) = self.document_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.document_path.with_extension("json.restore");
        fs::write(&temp_path, &data).await?;
        fs::rename(&temp_path, &self.document_path).await?;

        tracing::info!("Backup restored successfully");

        Ok(())
    }

    fn backup_stem(&self) -> &str {
        self.document_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("mindbox_data")
    }
}

/// Calculate SHA-256 checksum
fn calculate_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
