//! Error types for Mindbox
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized for a boundary layer to report.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl AppError {
    /// True for the "missing record" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::UserNotFound(_) | AppError::FileNotFound(_) | AppError::EntryNotFound(_)
        )
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Structured response envelope for a boundary layer.
///
/// Failures are reported with `success: false` and the error message,
/// never a raw error chain.
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn failure(error: &AppError) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl<T> From<Result<T>> for ApiResponse<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => ApiResponse::ok(data),
            Err(e) => ApiResponse::failure(&e),
        }
    }
}
