//! Entries service
//!
//! Journal entries: creation with at least one element, partial updates,
//! per-user listings (newest first) and the "recent entries" view of a file.

use crate::config;
use crate::database::{CreateEntryRequest, Entry, Repository, UpdateEntryRequest};
use crate::error::{AppError, Result};
use chrono::Utc;

/// Service for managing entries
#[derive(Clone)]
pub struct EntriesService {
    repo: Repository,
}

impl EntriesService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Create an entry in an existing file for an existing user
    pub async fn create_entry(&self, req: CreateEntryRequest) -> Result<Entry> {
        if req.elements.is_empty() {
            return Err(AppError::Validation(
                "an entry needs at least one element".to_string(),
            ));
        }

        if self.repo.get_user(&req.user_id).await.is_none() {
            return Err(AppError::UserNotFound(req.user_id));
        }

        if self.repo.get_file(&req.file_id).await.is_none() {
            return Err(AppError::FileNotFound(req.file_id));
        }

        tracing::info!(
            "Creating entry in file {} ({} elements)",
            req.file_id,
            req.elements.len()
        );

        let entry = Entry::new(req.user_id, req.file_id, req.mood, req.elements);
        self.repo.upsert_entry(entry.clone()).await?;

        tracing::info!("Entry created successfully: {}", entry.id);

        Ok(entry)
    }

    /// Get an entry by ID
    pub async fn get_entry(&self, id: &str) -> Option<Entry> {
        self.repo.get_entry(id).await
    }

    /// List a user's entries, optionally within one file, newest first
    pub async fn list_entries(&self, user_id: &str, file_id: Option<&str>) -> Vec<Entry> {
        self.repo.list_entries(user_id, file_id).await
    }

    /// Replace mood and/or elements and refresh `updated_at`
    pub async fn update_entry(&self, id: &str, req: UpdateEntryRequest) -> Result<Entry> {
        tracing::debug!("Updating entry: {}", id);

        let now = Utc::now();
        let entry = self
            .repo
            .update_entry(id, |entry| {
                if let Some(mood) = req.mood {
                    entry.mood = mood;
                }
                if let Some(elements) = req.elements {
                    entry.elements = elements;
                }
                entry.updated_at = now;
                Ok(())
            })
            .await?
            .ok_or_else(|| AppError::EntryNotFound(id.to_string()))?;

        tracing::debug!("Entry updated successfully: {}", entry.id);

        Ok(entry)
    }

    /// Delete an entry
    pub async fn delete_entry(&self, id: &str) -> Result<()> {
        tracing::info!("Deleting entry: {}", id);

        if !self.repo.delete_entry(id).await? {
            return Err(AppError::EntryNotFound(id.to_string()));
        }

        tracing::info!("Entry deleted successfully: {}", id);

        Ok(())
    }

    /// The newest entries of a file (10 unless `limit` says otherwise)
    pub async fn recent_entries(&self, file_id: &str, limit: Option<usize>) -> Result<Vec<Entry>> {
        let file = self
            .repo
            .get_file(file_id)
            .await
            .ok_or_else(|| AppError::FileNotFound(file_id.to_string()))?;

        let mut entries = self.repo.list_entries(&file.user_id, Some(file_id)).await;
        entries.truncate(limit.unwrap_or(config::RECENT_ENTRIES_LIMIT));

        Ok(entries)
    }
}
