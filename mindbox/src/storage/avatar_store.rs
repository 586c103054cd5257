//! Avatar image storage
//!
//! Stores one JPEG per user at `<root>/<user_id>.jpg` and hands out the
//! public URL it is served under. Image decoding and resizing happen
//! before the bytes reach this store.

use crate::config;
use crate::error::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const AVATAR_EXTENSION: &str = "jpg";

/// An avatar file found on disk
#[derive(Debug, Clone)]
pub struct AvatarFile {
    /// File stem, which is the owning user id
    pub stem: String,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Avatar store rooted at one directory
#[derive(Debug, Clone)]
pub struct AvatarStore {
    root: PathBuf,
}

impl AvatarStore {
    /// Create a new avatar store at the given root directory
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Initialize the avatar store (create directory if needed)
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        tracing::info!("Avatar store initialized at: {:?}", self.root);
        Ok(())
    }

    /// Write a user's avatar, replacing any previous one. Returns its URL.
    pub async fn write(&self, user_id: &str, data: &[u8]) -> Result<String> {
        fs::create_dir_all(&self.root).await?;

        let path = self.get_path(user_id);

        // Write to temp file first (atomic write)
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(temp_path, &path).await?;

        tracing::debug!("Wrote avatar for {} ({} bytes)", user_id, data.len());

        Ok(Self::url_for(user_id))
    }

    /// Delete a user's avatar; missing files are fine
    pub async fn delete(&self, user_id: &str) -> Result<()> {
        let path = self.get_path(user_id);

        if !path.exists() {
            return Ok(()); // Already deleted
        }

        fs::remove_file(&path).await?;

        tracing::debug!("Deleted avatar for {}", user_id);

        Ok(())
    }

    pub async fn exists(&self, user_id: &str) -> bool {
        self.get_path(user_id).exists()
    }

    /// Size in bytes of a user's avatar, if one is stored
    pub async fn size(&self, user_id: &str) -> Option<u64> {
        fs::metadata(self.get_path(user_id))
            .await
            .ok()
            .map(|metadata| metadata.len())
    }

    /// List every avatar file in the store
    pub async fn list_all(&self) -> Result<Vec<AvatarFile>> {
        let mut avatars = Vec::new();

        if !self.root.exists() {
            return Ok(avatars);
        }

        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.extension().and_then(|ext| ext.to_str()) != Some(AVATAR_EXTENSION) {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            avatars.push(AvatarFile {
                stem: stem.to_string(),
                path: path.clone(),
                modified: metadata.modified()?,
                size: metadata.len(),
            });
        }

        Ok(avatars)
    }

    /// Delete avatars whose stem is not an active user id and whose
    /// modification time is before `cutoff`. Returns the pruned stems.
    pub async fn prune(
        &self,
        active_user_ids: &HashSet<String>,
        cutoff: SystemTime,
    ) -> Result<Vec<String>> {
        let mut pruned = Vec::new();

        for avatar in self.list_all().await? {
            if active_user_ids.contains(&avatar.stem) || avatar.modified >= cutoff {
                continue;
            }

            fs::remove_file(&avatar.path).await?;
            tracing::info!("Pruned stale avatar: {:?}", avatar.path);
            pruned.push(avatar.stem);
        }

        Ok(pruned)
    }

    /// Public URL an avatar is served under
    pub fn url_for(user_id: &str) -> String {
        format!("{}/{}.{}", config::AVATAR_URL_PREFIX, user_id, AVATAR_EXTENSION)
    }

    /// Get file path for a user's avatar
    fn get_path(&self, user_id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", user_id, AVATAR_EXTENSION))
    }

    /// Get avatar store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}
