//! Users service
//!
//! Registration, profile updates, logins, avatars and storage usage.
//! Integrates Repository and AvatarStore.

use crate::config;
use crate::database::{RegisterUserRequest, Repository, UpdateUserRequest, User};
use crate::error::{AppError, Result};
use crate::storage::usage::{usage_bytes, StorageUsage};
use crate::storage::AvatarStore;
use chrono::Utc;

/// Service for managing users
#[derive(Clone)]
pub struct UsersService {
    repo: Repository,
    avatars: AvatarStore,
}

impl UsersService {
    pub fn new(repo: Repository, avatars: AvatarStore) -> Self {
        Self { repo, avatars }
    }

    /// Register a new user. Fails when a required field is blank or the
    /// email is already registered; the existing user is left untouched.
    pub async fn register(&self, req: RegisterUserRequest) -> Result<User> {
        for (field, value) in [
            ("first_name", &req.first_name),
            ("last_name", &req.last_name),
            ("email", &req.email),
            ("phone", &req.phone),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{} is required", field)));
            }
        }

        tracing::info!("Registering user: {}", req.email);

        let user = User::new(
            req.first_name,
            req.last_name,
            req.email,
            req.phone,
            req.about.unwrap_or_default(),
        );

        if self
            .repo
            .insert_user_unless_email_taken(user.clone())
            .await?
            .is_some()
        {
            tracing::info!("Registration rejected, email in use: {}", user.email);
            return Err(AppError::EmailTaken(user.email));
        }

        tracing::info!("User registered successfully: {}", user.id);

        Ok(user)
    }

    /// Get a user by ID
    pub async fn get_user(&self, id: &str) -> Option<User> {
        self.repo.get_user(id).await
    }

    /// Get a user by email
    pub async fn get_user_by_email(&self, email: &str) -> Option<User> {
        self.repo.find_user_by_email(email).await
    }

    /// Update the provided profile fields; settings are merged key by key
    pub async fn update_user(&self, id: &str, req: UpdateUserRequest) -> Result<User> {
        tracing::debug!("Updating user: {}", id);

        let user = self
            .repo
            .update_user(id, |user| {
                if let Some(first_name) = req.first_name {
                    user.first_name = first_name;
                }
                if let Some(last_name) = req.last_name {
                    user.last_name = last_name;
                }
                if let Some(phone) = req.phone {
                    user.phone = phone;
                }
                if let Some(about) = req.about {
                    user.about = about;
                }
                if let Some(settings) = req.settings {
                    user.settings.merge(settings)?;
                }
                Ok(())
            })
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))?;

        tracing::debug!("User updated successfully: {}", user.id);

        Ok(user)
    }

    /// Stamp `last_login` with the current time
    pub async fn record_login(&self, id: &str) -> Result<User> {
        let now = Utc::now();

        self.repo
            .update_user(id, |user| {
                user.last_login = now;
                Ok(())
            })
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Log in by email: look the user up and record the login
    pub async fn login(&self, email: &str) -> Result<User> {
        let user = self
            .repo
            .find_user_by_email(email)
            .await
            .ok_or_else(|| AppError::UserNotFound(email.to_string()))?;

        tracing::info!("User logged in: {}", user.id);

        self.record_login(&user.id).await
    }

    /// Store a new avatar image and point the user at it
    pub async fn update_avatar(&self, id: &str, image: &[u8]) -> Result<String> {
        if self.repo.get_user(id).await.is_none() {
            return Err(AppError::UserNotFound(id.to_string()));
        }

        let url = self.avatars.write(id, image).await?;

        let stored_url = url.clone();
        self.repo
            .update_user(id, move |user| {
                user.avatar = stored_url;
                Ok(())
            })
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))?;

        tracing::info!("Avatar updated for user: {}", id);

        Ok(url)
    }

    /// Delete the user's avatar and fall back to the default one
    pub async fn remove_avatar(&self, id: &str) -> Result<User> {
        let user = self
            .repo
            .update_user(id, |user| {
                user.avatar = config::DEFAULT_AVATAR_URL.to_string();
                Ok(())
            })
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))?;

        self.avatars.delete(id).await?;

        tracing::info!("Avatar removed for user: {}", id);

        Ok(user)
    }

    /// Storage used by a user, measured against the quota
    pub async fn storage_usage(&self, id: &str) -> Result<StorageUsage> {
        let document = self.repo.snapshot().await;
        let user = document
            .users
            .iter()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))?;

        let avatar_size = if user.has_custom_avatar() {
            self.avatars.size(id).await
        } else {
            None
        };

        let used = usage_bytes(user, &document.entries, avatar_size)?;

        Ok(StorageUsage::new(used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DocumentStore, Element, Entry};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_service() -> (UsersService, Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DocumentStore::new(temp_dir.path().join("mindbox_data.json"));
        let repo = Repository::new(store);
        let avatars = AvatarStore::new(temp_dir.path().join("avatars"));
        (UsersService::new(repo.clone(), avatars), repo, temp_dir)
    }

    fn request(email: &str) -> RegisterUserRequest {
        RegisterUserRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            phone: "555-0100".to_string(),
            about: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let (service, _repo, _temp) = create_test_service();

        let user = service.register(request("a@x.com")).await.unwrap();
        assert_eq!(user.full_name(), "Ada Lovelace");
        assert_eq!(user.avatar, config::DEFAULT_AVATAR_URL);

        assert_eq!(service.get_user(&user.id).await, Some(user.clone()));
        assert_eq!(service.get_user_by_email("a@x.com").await, Some(user));
        assert!(service.get_user("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_register_requires_fields() {
        let (service, _repo, _temp) = create_test_service();

        let mut req = request("a@x.com");
        req.phone = "  ".to_string();

        let result = service.register(req).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (service, _repo, _temp) = create_test_service();

        let first = service.register(request("a@x.com")).await.unwrap();

        let mut again = request("a@x.com");
        again.first_name = "Impostor".to_string();
        let result = service.register(again).await;

        assert!(matches!(result, Err(AppError::EmailTaken(_))));
        assert_eq!(service.get_user(&first.id).await, Some(first));
    }

    #[tokio::test]
    async fn test_update_user_partial() {
        let (service, _repo, _temp) = create_test_service();

        let user = service.register(request("a@x.com")).await.unwrap();

        let updated = service
            .update_user(
                &user.id,
                UpdateUserRequest {
                    about: Some("Analyst".to_string()),
                    settings: Some(json!({"theme": "light"}).as_object().unwrap().clone()),
                    ..UpdateUserRequest::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.about, "Analyst");
        assert_eq!(updated.first_name, "Ada");
        assert_eq!(updated.settings.theme, "light");
        assert_eq!(updated.settings.language, "ar");

        let missing = service
            .update_user("ghost", UpdateUserRequest::default())
            .await;
        assert!(matches!(missing, Err(AppError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_login_updates_last_login() {
        let (service, _repo, _temp) = create_test_service();

        let user = service.register(request("a@x.com")).await.unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;

        let logged_in = service.login("a@x.com").await.unwrap();
        assert!(logged_in.last_login > user.last_login);
        assert_eq!(logged_in.created_at, user.created_at);

        assert!(service.login("nobody@x.com").await.is_err());
    }

    #[tokio::test]
    async fn test_storage_usage_counts_entries_and_avatar() {
        let (service, repo, _temp) = create_test_service();

        let user = service.register(request("a@x.com")).await.unwrap();
        assert_eq!(service.storage_usage(&user.id).await.unwrap().used_bytes, 0);

        let entry = Entry::new(
            user.id.clone(),
            "f1".to_string(),
            None,
            vec![Element::text("hello").into()],
        );
        let footprint = serde_json::to_vec(&entry).unwrap().len() as u64 * 2;
        repo.upsert_entry(entry).await.unwrap();

        let url = service.update_avatar(&user.id, &[0u8; 300]).await.unwrap();
        assert_eq!(url, format!("/public/avatars/{}.jpg", user.id));

        let usage = service.storage_usage(&user.id).await.unwrap();
        assert_eq!(usage.used_bytes, footprint + 300);

        service.remove_avatar(&user.id).await.unwrap();
        let usage = service.storage_usage(&user.id).await.unwrap();
        assert_eq!(usage.used_bytes, footprint);

        assert!(service.storage_usage("ghost").await.is_err());
    }
}
