//! Document store
//!
//! Persists the whole dataset (users, files, entries) as one pretty-printed
//! JSON document. There is no partial write: callers load the whole
//! document, mutate it, and save the whole document back.

use super::models::{Entry, File, User};
use crate::error::Result;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::ser::{SerializeSeq, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// The root object holding every collection.
///
/// Records that do not decode into their typed model (older layouts, hand
/// edits) are kept verbatim in `unrecognized` and written back on save, so
/// one odd record never costs the rest of the document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawDocument")]
pub struct Document {
    pub users: Vec<User>,
    pub files: Vec<File>,
    pub entries: Vec<Entry>,
    pub unrecognized: Unrecognized,
}

/// Records kept as raw JSON, per collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unrecognized {
    pub users: Vec<Value>,
    pub files: Vec<Value>,
    pub entries: Vec<Value>,
}

impl Unrecognized {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.files.is_empty() && self.entries.is_empty()
    }
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    users: Vec<Value>,
    #[serde(default)]
    files: Vec<Value>,
    #[serde(default)]
    entries: Vec<Value>,
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        let (users, unrecognized_users) = decode_records::<User>("users", raw.users);
        let (files, unrecognized_files) = decode_records::<File>("files", raw.files);
        let (entries, unrecognized_entries) = decode_records::<Entry>("entries", raw.entries);

        Self {
            users,
            files,
            entries,
            unrecognized: Unrecognized {
                users: unrecognized_users,
                files: unrecognized_files,
                entries: unrecognized_entries,
            },
        }
    }
}

fn decode_records<T: DeserializeOwned>(collection: &str, values: Vec<Value>) -> (Vec<T>, Vec<Value>) {
    let mut records = Vec::with_capacity(values.len());
    let mut unrecognized = Vec::new();

    for value in values {
        match T::deserialize(&value) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Keeping unrecognized record in {} as-is: {}", collection, e);
                unrecognized.push(value);
            }
        }
    }

    (records, unrecognized)
}

/// One collection on disk: typed records first, then the verbatim ones
struct StoredCollection<'a, T>(&'a [T], &'a [Value]);

impl<T: Serialize> Serialize for StoredCollection<'_, T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.0.len() + self.1.len()))?;
        for record in self.0 {
            seq.serialize_element(record)?;
        }
        for raw in self.1 {
            seq.serialize_element(raw)?;
        }
        seq.end()
    }
}

impl Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Document", 3)?;
        state.serialize_field("users", &StoredCollection(&self.users, &self.unrecognized.users))?;
        state.serialize_field("files", &StoredCollection(&self.files, &self.unrecognized.files))?;
        state.serialize_field(
            "entries",
            &StoredCollection(&self.entries, &self.unrecognized.entries),
        )?;
        state.end()
    }
}

/// Reads and writes the document file
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
}

impl DocumentStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the current document.
    ///
    /// A missing, unreadable or unparsable file yields an empty document.
    /// The discarded error is logged, never returned; an unparsable file is
    /// first copied aside.
    pub async fn load(&self) -> Document {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Document {:?} not found, starting empty", self.path);
                return Document::default();
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read document {:?}, treating as empty: {}",
                    self.path,
                    e
                );
                return Document::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(
                    "Failed to parse document {:?}, treating as empty: {}",
                    self.path,
                    e
                );
                self.set_aside(&content).await;
                Document::default()
            }
        }
    }

    /// Keep a copy of an unparsable document next to it, so the next save
    /// does not destroy the only copy
    async fn set_aside(&self, content: &str) {
        let stem = self
            .path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("document");
        let aside = self.path.with_file_name(format!(
            "{}.corrupt-{}.json",
            stem,
            Utc::now().format("%Y%m%d_%H%M%S_%3f")
        ));

        match fs::write(&aside, content).await {
            Ok(()) => tracing::warn!("Unparsable document copied to {:?}", aside),
            Err(e) => tracing::warn!("Failed to copy unparsable document aside: {}", e),
        }
    }

    /// Save the document, replacing whatever was on disk
    pub async fn save(&self, document: &Document) -> Result<()> {
        let content = serde_json::to_string_pretty(document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Write to temp file first (atomic replace)
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;

        tracing::debug!(
            "Saved document {:?} ({} users, {} files, {} entries)",
            self.path,
            document.users.len(),
            document.files.len(),
            document.entries.len()
        );

        Ok(())
    }

    /// Path of the document file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
