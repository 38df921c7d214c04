//! itsm - A service-desk console library.
//!
//! This library provides the core functionality for the `itsm` CLI tool:
//! incident tracking, bulk operations over a selection of incidents, and
//! SLA monitoring that raises deduplicated warning/breach notifications.

pub mod action_log;
pub mod api;
pub mod bulk;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod sla;
pub mod storage;
pub mod store;


/// Library-level error type for service-desk operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not initialized: run `itsm system init` first")]
    NotInitialized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A bulk operation is already running")]
    AlreadyRunning,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for service-desk operations.
pub type Result<T> = std::result::Result<T, Error>;
