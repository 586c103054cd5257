//! Database module
//!
//! This module provides all persistence functionality including:
//! - The single JSON document store
//! - Model definitions
//! - Repository layer for CRUD operations

pub mod models;
pub mod repository;
pub mod store;

pub use models::*;
pub use repository::Repository;
pub use store::{Document, DocumentStore};

use crate::error::Result;
use std::path::Path;

/// Open a repository over the document at `document_path`.
///
/// The parent directory is created if needed; the document itself is only
/// written on the first mutation. With `serialized` set, all writes go
/// through one lock.
pub async fn open_repository(document_path: &Path, serialized: bool) -> Result<Repository> {
    tracing::info!("Opening document store at: {:?}", document_path);

    // Ensure parent directory exists
    if let Some(parent) = document_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let store = DocumentStore::new(document_path.to_path_buf());
    let repo = if serialized {
        Repository::serialized(store)
    } else {
        Repository::new(store)
    };

    tracing::info!("Document store ready (serialized writes: {})", serialized);

    Ok(repo)
}
