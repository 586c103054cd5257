//! Storage accounting
//!
//! Approximates how much disk a user occupies and renders byte counts
//! for display. The quota is reported, never enforced.

use crate::config;
use crate::database::{Entry, User};
use crate::error::Result;
use serde::Serialize;

/// Usage report against the per-user quota
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub used_formatted: String,
    pub limit_bytes: u64,
    pub limit_formatted: String,
    pub percentage: f64,
    pub remaining_bytes: u64,
    pub remaining_formatted: String,
}

impl StorageUsage {
    pub fn new(used_bytes: u64) -> Self {
        let limit_bytes = config::STORAGE_QUOTA_BYTES;
        let remaining_bytes = limit_bytes.saturating_sub(used_bytes);

        Self {
            used_bytes,
            used_formatted: format_size(used_bytes),
            limit_bytes,
            limit_formatted: config::STORAGE_QUOTA_LABEL.to_string(),
            percentage: round1(used_bytes as f64 / limit_bytes as f64 * 100.0),
            remaining_bytes,
            remaining_formatted: format_size(remaining_bytes),
        }
    }
}

/// Approximate footprint of one entry: its serialized JSON size times the
/// overhead factor
pub fn entry_footprint(entry: &Entry) -> Result<u64> {
    let serialized = serde_json::to_vec(entry)?;
    Ok(serialized.len() as u64 * config::ENTRY_SIZE_OVERHEAD_FACTOR)
}

/// Bytes used by a user: every entry's footprint plus the avatar size,
/// when the user has a non-default avatar on disk
pub fn usage_bytes<'a>(
    user: &User,
    entries: impl IntoIterator<Item = &'a Entry>,
    avatar_size: Option<u64>,
) -> Result<u64> {
    let mut total = 0u64;

    for entry in entries.into_iter().filter(|e| e.user_id == user.id) {
        total += entry_footprint(entry)?;
    }

    if user.has_custom_avatar() {
        total += avatar_size.unwrap_or(0);
    }

    Ok(total)
}

/// Render a byte count with base-1024 units: integer bytes, one decimal
/// for KB, MB and GB
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    }
}

/// Round to one decimal place
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Element;

    fn test_user() -> User {
        User::new(
            "Test".to_string(),
            "User".to_string(),
            "t@x.com".to_string(),
            String::new(),
            String::new(),
        )
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1_572_864), "1.5 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_usage_counts_entries_twice() {
        let user = test_user();
        let entry = Entry::new(
            user.id.clone(),
            "f1".to_string(),
            None,
            vec![Element::text("hello").into()],
        );
        let foreign = Entry::new("someone".to_string(), "f1".to_string(), None, Vec::new());

        let single = serde_json::to_vec(&entry).unwrap().len() as u64;
        let used = usage_bytes(&user, [&entry, &foreign], None).unwrap();

        assert_eq!(used, single * 2);
    }

    #[test]
    fn test_default_avatar_is_not_counted() {
        let mut user = test_user();

        assert_eq!(usage_bytes(&user, Vec::<&Entry>::new(), Some(5000)).unwrap(), 0);

        user.avatar = format!("/public/avatars/{}.jpg", user.id);
        assert_eq!(usage_bytes(&user, Vec::<&Entry>::new(), Some(5000)).unwrap(), 5000);
        assert_eq!(usage_bytes(&user, Vec::<&Entry>::new(), None).unwrap(), 0);
    }

    #[test]
    fn test_quota_report() {
        let usage = StorageUsage::new(1_572_864);

        assert_eq!(usage.limit_bytes, 100 * 1024 * 1024);
        assert_eq!(usage.limit_formatted, "100 MB");
        assert_eq!(usage.percentage, 1.5);
        assert_eq!(usage.remaining_bytes, usage.limit_bytes - 1_572_864);
        assert_eq!(usage.used_formatted, "1.5 MB");

        let over = StorageUsage::new(200 * 1024 * 1024);
        assert_eq!(over.remaining_bytes, 0);
        assert_eq!(over.percentage, 200.0);
    }
}
