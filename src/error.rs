//! # Error Types
//!
//! This module defines error types used throughout the scrap-pos library.

use thiserror::Error;

/// Main error type for scrap-pos operations
#[derive(Debug, Error)]
pub enum ScrapPosError {
    /// Transport-level errors (printer connection, I/O on the RFCOMM device)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transaction persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Pending-receipt store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Diagnostic collaborator errors
    #[error("Diagnostic error: {0}")]
    Diagnostic(String),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected input (bad weight, empty transaction, unknown key)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A single-flight operation was requested while one is active
    #[error("{0}")]
    AlreadyRunning(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
