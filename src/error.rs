//! Error types for the event router.

use std::time::Duration;
use thiserror::Error;

/// Main error type for router operations.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Router is closed")]
    Closed,

    #[error("Timed out after {0:?} waiting for the router")]
    Timeout(Duration),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for RouterError {
    fn from(e: serde_json::Error) -> Self {
        RouterError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for RouterError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        RouterError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RouterError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        RouterError::Deserialization(e.to_string())
    }
}

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
