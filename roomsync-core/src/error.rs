//! Error types for the roomsync ecosystem.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur in roomsync operations.
#[derive(Error, Debug)]
pub enum RoomSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown room: {0}")]
    UnknownRoom(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid time range: start {start} is not before end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Network failures and 5xx responses. The next trigger may retry.
    #[error("Provider unavailable: {0}")]
    ProviderTransient(String),

    #[error("Provider rejected request ({status}): {message}")]
    ProviderRejected { status: u16, message: String },

    /// The stored continuation token was refused (HTTP 410 on Google).
    #[error("Sync cursor is no longer valid: {0}")]
    CursorInvalid(String),

    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Store read failed: {0}")]
    StoreRead(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Operation timed out after {0}s")]
    Timeout(u64),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RoomSyncError {
    /// Whether a later trigger can reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RoomSyncError::ProviderTransient(_)
                | RoomSyncError::StoreWrite(_)
                | RoomSyncError::StoreRead(_)
                | RoomSyncError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for RoomSyncError {
    fn from(err: serde_json::Error) -> Self {
        RoomSyncError::Serialization(err.to_string())
    }
}

/// Result type alias for roomsync operations.
pub type RoomSyncResult<T> = Result<T, RoomSyncError>;
