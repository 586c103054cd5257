//! Application configuration constants
//!
//! Central location for file layout, policy limits and defaults
//! used throughout the application.

// ===== Data Layout =====

/// File name of the JSON document holding every user, file and entry
pub const DOCUMENT_FILE_NAME: &str = "mindbox_data.json";

/// Directory (under the data dir) holding avatar images
pub const AVATARS_DIR_NAME: &str = "avatars";

/// Directory (under the data dir) holding document backups
pub const BACKUPS_DIR_NAME: &str = "backups";

/// Public URL prefix avatars are served from
pub const AVATAR_URL_PREFIX: &str = "/public/avatars";

/// Avatar URL assigned to users who never uploaded one
pub const DEFAULT_AVATAR_URL: &str = "/public/default-avatar.png";

// ===== Storage Policy =====

/// Per-user storage quota in bytes (100 MiB).
/// Reported against usage only; nothing is rejected for exceeding it.
pub const STORAGE_QUOTA_BYTES: u64 = 100 * 1024 * 1024;

/// How the quota is shown to users
pub const STORAGE_QUOTA_LABEL: &str = "100 MB";

/// Serialized entry sizes are multiplied by this to approximate on-disk
/// footprint including formatting and encoding overhead.
pub const ENTRY_SIZE_OVERHEAD_FACTOR: u64 = 2;

// ===== Maintenance =====

/// Number of document backups kept by rotation
pub const BACKUP_RETENTION_COUNT: usize = 10;

/// Orphaned avatars older than this many days are pruned
pub const STALE_AVATAR_MAX_AGE_DAYS: i64 = 30;

// ===== Listing & Statistics =====

/// Default number of entries returned by "recent entries"
pub const RECENT_ENTRIES_LIMIT: usize = 10;

/// Default trailing window (days) for the activity histogram
pub const ACTIVITY_WINDOW_DAYS: i64 = 30;

/// Trailing window (days) counted as "recently active" by the productivity score
pub const PRODUCTIVITY_WINDOW_DAYS: i64 = 7;

// ===== Entity Defaults =====

pub const DEFAULT_MOOD: &str = "😊";
pub const DEFAULT_FILE_ICON: &str = "📁";
pub const DEFAULT_FILE_COLOR: &str = "#9d4edd";
pub const DEFAULT_THEME: &str = "dark";
pub const DEFAULT_LANGUAGE: &str = "ar";
