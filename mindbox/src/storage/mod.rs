//! Storage module
//!
//! Provides avatar blob storage and per-user storage accounting.

pub mod avatar_store;
pub mod usage;

pub use avatar_store::{AvatarFile, AvatarStore};
pub use usage::{format_size, StorageUsage};
