//! Files service
//!
//! Folders grouping a user's entries. Deleting a file deletes its entries.

use crate::database::repository::entries_for;
use crate::database::{CreateFileRequest, File, FileDetail, FileSummary, Repository, UpdateFileRequest};
use crate::error::{AppError, Result};
use chrono::Utc;

/// Service for managing files
#[derive(Clone)]
pub struct FilesService {
    repo: Repository,
}

impl FilesService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Create a file for an existing user
    pub async fn create_file(&self, user_id: &str, req: CreateFileRequest) -> Result<File> {
        if req.name.trim().is_empty() {
            return Err(AppError::Validation("name is required".to_string()));
        }

        if self.repo.get_user(user_id).await.is_none() {
            return Err(AppError::UserNotFound(user_id.to_string()));
        }

        tracing::info!("Creating file '{}' for user: {}", req.name, user_id);

        let file = File::new(user_id.to_string(), req.name, req.icon, req.color);
        self.repo.upsert_file(file.clone()).await?;

        tracing::info!("File created successfully: {}", file.id);

        Ok(file)
    }

    /// Get a file by ID
    pub async fn get_file(&self, id: &str) -> Option<File> {
        self.repo.get_file(id).await
    }

    /// List a user's files
    pub async fn list_files(&self, user_id: &str) -> Vec<File> {
        self.repo.list_files_by_user(user_id).await
    }

    /// List a user's files with the number of entries in each
    pub async fn list_files_with_counts(&self, user_id: &str) -> Vec<FileSummary> {
        let document = self.repo.snapshot().await;

        document
            .files
            .iter()
            .filter(|file| file.user_id == user_id)
            .map(|file| FileSummary {
                file: file.clone(),
                entries_count: document
                    .entries
                    .iter()
                    .filter(|entry| entry.file_id == file.id)
                    .count(),
            })
            .collect()
    }

    /// A file with its entries, newest first
    pub async fn get_file_detail(&self, id: &str) -> Option<FileDetail> {
        let document = self.repo.snapshot().await;
        let file = document.files.iter().find(|file| file.id == id)?.clone();
        let entries = entries_for(&document, &file.user_id, Some(id));

        Some(FileDetail {
            entries_count: entries.len(),
            entries,
            file,
        })
    }

    /// Update the provided fields and refresh `updated_at`
    pub async fn update_file(&self, id: &str, req: UpdateFileRequest) -> Result<File> {
        if req.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }

        tracing::debug!("Updating file: {}", id);

        let now = Utc::now();
        let file = self
            .repo
            .update_file(id, |file| {
                if let Some(name) = req.name {
                    file.name = name;
                }
                if let Some(icon) = req.icon {
                    file.icon = icon;
                }
                if let Some(color) = req.color {
                    file.color = color;
                }
                file.updated_at = now;
                Ok(())
            })
            .await?
            .ok_or_else(|| AppError::FileNotFound(id.to_string()))?;

        tracing::debug!("File updated successfully: {}", file.id);

        Ok(file)
    }

    /// Delete a file together with all of its entries
    pub async fn delete_file(&self, id: &str) -> Result<()> {
        tracing::info!("Deleting file: {}", id);

        if !self.repo.delete_file(id).await? {
            return Err(AppError::FileNotFound(id.to_string()));
        }

        tracing::info!("File deleted successfully: {}", id);

        Ok(())
    }
}
