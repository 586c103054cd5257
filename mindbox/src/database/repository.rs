//! Repository layer for document operations
//!
//! This module provides CRUD operations for users, files and entries.
//! Every write is a full round-trip: load the document, mutate it in
//! memory, save it back. A miss is an absent result, never an error.

use super::models::*;
use super::store::{Document, DocumentStore};
use crate::error::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Repository over the single JSON document.
///
/// `Repository::new` keeps the unsynchronized read-modify-write behaviour:
/// two concurrent writers may both load the same snapshot and the later
/// save wins. `Repository::serialized` routes every write through one
/// shared lock so load-mutate-save sequences never interleave.
#[derive(Clone)]
pub struct Repository {
    store: DocumentStore,
    write_lock: Option<Arc<Mutex<()>>>,
}

impl Repository {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            write_lock: None,
        }
    }

    /// Repository whose writes (and those of all its clones) are serialized
    pub fn serialized(store: DocumentStore) -> Self {
        Self {
            store,
            write_lock: Some(Arc::new(Mutex::new(()))),
        }
    }

    pub fn is_serialized(&self) -> bool {
        self.write_lock.is_some()
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Load the whole document once
    pub async fn snapshot(&self) -> Document {
        self.store.load().await
    }

    /// Load, apply `f`, and save. Nothing is saved when `f` fails.
    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Document) -> Result<T>,
    {
        let _guard = match &self.write_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let mut document = self.store.load().await;
        let out = f(&mut document)?;
        self.store.save(&document).await?;

        Ok(out)
    }

    // ===== Users =====

    /// Get a user by ID
    pub async fn get_user(&self, id: &str) -> Option<User> {
        find(&self.snapshot().await.users, id).cloned()
    }

    /// Find the first user with the given email
    pub async fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.snapshot()
            .await
            .users
            .into_iter()
            .find(|user| user.email == email)
    }

    /// Insert or replace a user
    pub async fn upsert_user(&self, user: User) -> Result<()> {
        let id = user.id.clone();
        let replaced = self.mutate(|doc| Ok(upsert(&mut doc.users, user))).await?;
        tracing::debug!("Upserted user: {} (replaced: {})", id, replaced);
        Ok(())
    }

    /// Insert a user unless another user already has the same email.
    ///
    /// Returns the existing user on conflict. The check and the insert
    /// share one document round-trip, which only excludes concurrent
    /// registrations when the repository is serialized.
    pub async fn insert_user_unless_email_taken(&self, user: User) -> Result<Option<User>> {
        let id = user.id.clone();
        let existing = self
            .mutate(|doc| {
                if let Some(existing) = doc.users.iter().find(|u| u.email == user.email) {
                    return Ok(Some(existing.clone()));
                }
                doc.users.push(user);
                Ok(None)
            })
            .await?;

        if existing.is_none() {
            tracing::debug!("Inserted user: {}", id);
        }
        Ok(existing)
    }

    /// Apply a change to a stored user, returning the updated record
    pub async fn update_user<F>(&self, id: &str, apply: F) -> Result<Option<User>>
    where
        F: FnOnce(&mut User) -> Result<()>,
    {
        self.mutate(|doc| update(&mut doc.users, id, apply)).await
    }

    /// Ids of every known user, including records kept in raw form
    pub async fn user_ids(&self) -> HashSet<String> {
        let document = self.snapshot().await;
        let raw_ids = document
            .unrecognized
            .users
            .iter()
            .filter_map(|raw| raw.get("id").and_then(|id| id.as_str()))
            .map(str::to_string);

        document
            .users
            .iter()
            .map(|user| user.id.clone())
            .chain(raw_ids)
            .collect()
    }

    // ===== Files =====

    /// Get a file by ID
    pub async fn get_file(&self, id: &str) -> Option<File> {
        find(&self.snapshot().await.files, id).cloned()
    }

    /// List the files owned by a user
    pub async fn list_files_by_user(&self, user_id: &str) -> Vec<File> {
        self.snapshot()
            .await
            .files
            .into_iter()
            .filter(|file| file.user_id == user_id)
            .collect()
    }

    /// Insert or replace a file
    pub async fn upsert_file(&self, file: File) -> Result<()> {
        let id = file.id.clone();
        let replaced = self.mutate(|doc| Ok(upsert(&mut doc.files, file))).await?;
        tracing::debug!("Upserted file: {} (replaced: {})", id, replaced);
        Ok(())
    }

    /// Apply a change to a stored file, returning the updated record
    pub async fn update_file<F>(&self, id: &str, apply: F) -> Result<Option<File>>
    where
        F: FnOnce(&mut File) -> Result<()>,
    {
        self.mutate(|doc| update(&mut doc.files, id, apply)).await
    }

    /// Delete a file and every entry filed under it.
    ///
    /// Both collections change in the same document save. Returns whether
    /// the file existed.
    pub async fn delete_file(&self, id: &str) -> Result<bool> {
        let (removed, entries_removed) = self
            .mutate(|doc| {
                let removed = remove(&mut doc.files, id);
                let before = doc.entries.len() + doc.unrecognized.entries.len();
                doc.entries.retain(|entry| entry.file_id != id);
                doc.unrecognized
                    .entries
                    .retain(|raw| raw.get("file_id").and_then(|f| f.as_str()) != Some(id));
                let after = doc.entries.len() + doc.unrecognized.entries.len();
                Ok((removed, before - after))
            })
            .await?;

        tracing::debug!(
            "Deleted file: {} (existed: {}, cascaded entries: {})",
            id,
            removed,
            entries_removed
        );
        Ok(removed)
    }

    /// Number of entries filed under a file
    pub async fn count_entries_in_file(&self, file_id: &str) -> usize {
        self.snapshot()
            .await
            .entries
            .iter()
            .filter(|entry| entry.file_id == file_id)
            .count()
    }

    // ===== Entries =====

    /// Get an entry by ID
    pub async fn get_entry(&self, id: &str) -> Option<Entry> {
        find(&self.snapshot().await.entries, id).cloned()
    }

    /// List a user's entries, optionally within one file, newest first
    pub async fn list_entries(&self, user_id: &str, file_id: Option<&str>) -> Vec<Entry> {
        let document = self.snapshot().await;
        entries_for(&document, user_id, file_id)
    }

    /// Insert or replace an entry
    pub async fn upsert_entry(&self, entry: Entry) -> Result<()> {
        let id = entry.id.clone();
        let replaced = self.mutate(|doc| Ok(upsert(&mut doc.entries, entry))).await?;
        tracing::debug!("Upserted entry: {} (replaced: {})", id, replaced);
        Ok(())
    }

    /// Apply a change to a stored entry, returning the updated record
    pub async fn update_entry<F>(&self, id: &str, apply: F) -> Result<Option<Entry>>
    where
        F: FnOnce(&mut Entry) -> Result<()>,
    {
        self.mutate(|doc| update(&mut doc.entries, id, apply)).await
    }

    /// Delete an entry, returning whether it existed
    pub async fn delete_entry(&self, id: &str) -> Result<bool> {
        let removed = self.mutate(|doc| Ok(remove(&mut doc.entries, id))).await?;
        tracing::debug!("Deleted entry: {} (existed: {})", id, removed);
        Ok(removed)
    }
}

/// A user's entries from a snapshot, optionally within one file, newest first
pub fn entries_for(document: &Document, user_id: &str, file_id: Option<&str>) -> Vec<Entry> {
    let mut entries: Vec<Entry> = document
        .entries
        .iter()
        .filter(|entry| entry.user_id == user_id)
        .filter(|entry| file_id.map_or(true, |f| entry.file_id == f))
        .cloned()
        .collect();

    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries
}

fn find<'a, T: Record>(records: &'a [T], id: &str) -> Option<&'a T> {
    records.iter().find(|record| record.id() == id)
}

/// Replace the record with the same id in place, or append it.
/// Returns true when an existing record was replaced.
fn upsert<T: Record>(records: &mut Vec<T>, record: T) -> bool {
    match records.iter_mut().find(|existing| existing.id() == record.id()) {
        Some(existing) => {
            *existing = record;
            true
        }
        None => {
            records.push(record);
            false
        }
    }
}

fn update<T, F>(records: &mut [T], id: &str, apply: F) -> Result<Option<T>>
where
    T: Record + Clone,
    F: FnOnce(&mut T) -> Result<()>,
{
    match records.iter_mut().find(|record| record.id() == id) {
        Some(record) => {
            apply(record)?;
            Ok(Some(record.clone()))
        }
        None => Ok(None),
    }
}

fn remove<T: Record>(records: &mut Vec<T>, id: &str) -> bool {
    let before = records.len();
    records.retain(|record| record.id() != id);
    records.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn create_test_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DocumentStore::new(temp_dir.path().join("mindbox_data.json"));
        (Repository::new(store), temp_dir)
    }

    fn test_user(email: &str) -> User {
        User::new(
            "Test".to_string(),
            "User".to_string(),
            email.to_string(),
            "555-0100".to_string(),
            String::new(),
        )
    }

    #[tokio::test]
    async fn test_missing_ids_are_absent() {
        let (repo, _temp) = create_test_repo();

        repo.upsert_user(test_user("a@x.com")).await.unwrap();

        assert!(repo.get_user("nope").await.is_none());
        assert!(repo.get_file("nope").await.is_none());
        assert!(repo.get_entry("nope").await.is_none());
        assert!(repo.find_user_by_email("b@x.com").await.is_none());
    }

    #[tokio::test]
    async fn test_upsert_then_find_round_trip() {
        let (repo, _temp) = create_test_repo();

        let user = test_user("a@x.com");
        repo.upsert_user(user.clone()).await.unwrap();
        assert_eq!(repo.get_user(&user.id).await, Some(user.clone()));

        let file = File::new(user.id.clone(), "Work".to_string(), None, None);
        repo.upsert_file(file.clone()).await.unwrap();
        assert_eq!(repo.get_file(&file.id).await, Some(file.clone()));

        let entry = Entry::new(
            user.id.clone(),
            file.id.clone(),
            Some("😴".to_string()),
            vec![Element::checklist(vec![ChecklistItem::new("ship", true)]).into()],
        );
        repo.upsert_entry(entry.clone()).await.unwrap();
        assert_eq!(repo.get_entry(&entry.id).await, Some(entry));
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let (repo, _temp) = create_test_repo();

        let first = File::new("u1".to_string(), "One".to_string(), None, None);
        let second = File::new("u1".to_string(), "Two".to_string(), None, None);
        repo.upsert_file(first.clone()).await.unwrap();
        repo.upsert_file(second.clone()).await.unwrap();

        let mut renamed = first.clone();
        renamed.name = "Uno".to_string();
        repo.upsert_file(renamed).await.unwrap();

        let files = repo.list_files_by_user("u1").await;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id, first.id);
        assert_eq!(files[0].name, "Uno");
        assert_eq!(files[1].id, second.id);
    }

    #[tokio::test]
    async fn test_find_user_by_email() {
        let (repo, _temp) = create_test_repo();

        let user = test_user("a@x.com");
        repo.upsert_user(user.clone()).await.unwrap();
        repo.upsert_user(test_user("b@x.com")).await.unwrap();

        let found = repo.find_user_by_email("a@x.com").await.unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_insert_user_unless_email_taken() {
        let (repo, _temp) = create_test_repo();

        let first = test_user("a@x.com");
        assert!(repo
            .insert_user_unless_email_taken(first.clone())
            .await
            .unwrap()
            .is_none());

        let clash = test_user("a@x.com");
        let existing = repo
            .insert_user_unless_email_taken(clash.clone())
            .await
            .unwrap();
        assert_eq!(existing.map(|u| u.id), Some(first.id.clone()));
        assert!(repo.get_user(&clash.id).await.is_none());
        assert_eq!(repo.user_ids().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_failure_saves_nothing() {
        let (repo, _temp) = create_test_repo();

        let file = File::new("u1".to_string(), "Old".to_string(), None, None);
        repo.upsert_file(file.clone()).await.unwrap();

        let result = repo
            .update_file(&file.id, |f| {
                f.name = "New".to_string();
                Err(crate::error::AppError::Validation("nope".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(repo.get_file(&file.id).await.unwrap().name, "Old");

        let missing = repo.update_file("ghost", |_| Ok(())).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_file_cascades_entries() {
        let (repo, _temp) = create_test_repo();

        let doomed = File::new("u1".to_string(), "Doomed".to_string(), None, None);
        let kept = File::new("u1".to_string(), "Kept".to_string(), None, None);
        repo.upsert_file(doomed.clone()).await.unwrap();
        repo.upsert_file(kept.clone()).await.unwrap();

        for file_id in [&doomed.id, &doomed.id, &kept.id] {
            let entry = Entry::new(
                "u1".to_string(),
                file_id.clone(),
                None,
                vec![Element::text("x").into()],
            );
            repo.upsert_entry(entry).await.unwrap();
        }

        assert!(repo.delete_file(&doomed.id).await.unwrap());

        // One persisted state: reload straight from disk
        let document = repo.store().load().await;
        assert!(document.files.iter().all(|f| f.id != doomed.id));
        assert!(document.entries.iter().all(|e| e.file_id != doomed.id));
        assert_eq!(document.entries.len(), 1);
        assert_eq!(repo.count_entries_in_file(&kept.id).await, 1);

        assert!(!repo.delete_file(&doomed.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_entries_newest_first() {
        let (repo, _temp) = create_test_repo();

        let now = Utc::now();
        for (offset, file_id) in [(3, "f1"), (0, "f2"), (5, "f1"), (1, "f1")] {
            let mut entry = Entry::new(
                "u1".to_string(),
                file_id.to_string(),
                None,
                vec![Element::text("x").into()],
            );
            entry.created_at = now - Duration::hours(offset);
            repo.upsert_entry(entry).await.unwrap();
        }
        let mut other = Entry::new("u2".to_string(), "f1".to_string(), None, Vec::new());
        other.created_at = now + Duration::hours(1);
        repo.upsert_entry(other).await.unwrap();

        let all = repo.list_entries("u1", None).await;
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let in_file = repo.list_entries("u1", Some("f1")).await;
        assert_eq!(in_file.len(), 3);
        assert!(in_file.iter().all(|e| e.file_id == "f1"));
        assert!(in_file.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let (repo, _temp) = create_test_repo();

        let entry = Entry::new("u1".to_string(), "f1".to_string(), None, Vec::new());
        repo.upsert_entry(entry.clone()).await.unwrap();

        assert!(repo.delete_entry(&entry.id).await.unwrap());
        assert!(repo.get_entry(&entry.id).await.is_none());
        assert!(!repo.delete_entry(&entry.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_serialized_writes_are_not_lost() {
        let temp_dir = TempDir::new().unwrap();
        let store = DocumentStore::new(temp_dir.path().join("mindbox_data.json"));
        let repo = Repository::serialized(store);
        assert!(repo.is_serialized());

        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let file = File::new("u1".to_string(), format!("File {}", i), None, None);
                repo.upsert_file(file).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(repo.list_files_by_user("u1").await.len(), 20);
    }

    #[tokio::test]
    async fn test_legacy_records_survive_writes() {
        let (repo, _temp) = create_test_repo();

        let first = test_user("a@x.com");
        repo.upsert_user(first.clone()).await.unwrap();

        // An entry in the old layout: date/time instead of timestamps, no owner
        let path = repo.store().path().to_path_buf();
        let mut raw: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        let legacy = serde_json::json!({
            "id": "legacy",
            "file_id": "f-old",
            "date": "2023-01-02",
            "time": "10:00",
            "mood": "😊",
            "elements": [{"type": "text", "content": "old"}]
        });
        raw["entries"].as_array_mut().unwrap().push(legacy.clone());
        tokio::fs::write(&path, serde_json::to_string_pretty(&raw).unwrap())
            .await
            .unwrap();

        assert_eq!(repo.get_user(&first.id).await, Some(first.clone()));
        assert!(repo.get_entry("legacy").await.is_none());

        repo.upsert_user(test_user("b@x.com")).await.unwrap();

        let on_disk: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(on_disk["users"].as_array().unwrap().len(), 2);
        assert_eq!(on_disk["entries"].as_array().unwrap(), &vec![legacy]);

        // Deleting the file the legacy entry points at takes it along
        repo.delete_file("f-old").await.unwrap();
        assert!(repo.snapshot().await.unrecognized.is_empty());
    }

    #[tokio::test]
    async fn test_raw_user_ids_are_known() {
        let (repo, _temp) = create_test_repo();

        tokio::fs::write(
            repo.store().path(),
            r#"{"users": [{"id": "old-user", "email": "o@x.com"}]}"#,
        )
        .await
        .unwrap();

        assert!(repo.user_ids().await.contains("old-user"));
    }

    #[tokio::test]
    async fn test_save_errors_propagate() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        tokio::fs::write(&blocker, b"plain file").await.unwrap();

        // The document's parent is a regular file, so nothing can be saved
        let repo = Repository::new(DocumentStore::new(blocker.join("mindbox_data.json")));

        assert!(repo.upsert_user(test_user("a@x.com")).await.is_err());
        assert!(repo
            .upsert_file(File::new("u1".to_string(), "Work".to_string(), None, None))
            .await
            .is_err());
        assert!(repo.delete_file("f1").await.is_err());
        assert!(repo.user_ids().await.is_empty());
        assert_eq!(
            tokio::fs::read(&blocker).await.unwrap(),
            b"plain file".to_vec()
        );
    }

    #[tokio::test]
    async fn test_failed_save_leaves_document_unchanged() {
        let (repo, temp) = create_test_repo();

        let user = test_user("a@x.com");
        repo.upsert_user(user.clone()).await.unwrap();
        let before = tokio::fs::read(repo.store().path()).await.unwrap();

        // Occupy the temp path with a directory so the atomic write fails
        tokio::fs::create_dir(temp.path().join("mindbox_data.json.tmp"))
            .await
            .unwrap();

        assert!(repo.upsert_user(test_user("b@x.com")).await.is_err());
        assert!(repo.delete_entry("anything").await.is_err());
        assert_eq!(tokio::fs::read(repo.store().path()).await.unwrap(), before);
        assert_eq!(repo.user_ids().await.len(), 1);
    }
}
