//! Mindbox library
//!
//! Persistence, entity services, statistics and maintenance jobs for the
//! Mindbox journal.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod storage;
