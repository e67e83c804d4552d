//! Error types for the DevTerm plugin host
//!
//! This module defines the error type shared by the plugin contract, the
//! discovery loaders and the manager. Uses `thiserror` for ergonomic error
//! handling with automatic `Display` and `Error` trait implementations.
//!
//! Most of these never reach a caller of [`PluginManager`](crate::plugins::PluginManager):
//! discovery, instantiation and execution faults are contained at the manager
//! boundary. Schema faults are the exception and come back as `Err`.

use thiserror::Error;

/// The primary error type for plugin host operations.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Configuration-related errors (unreadable config, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A discovery candidate could not be turned into plugin definitions
    #[error("Load error: {0}")]
    Load(String),

    /// A plugin factory failed to construct an instance
    #[error("Instantiation error: {0}")]
    Instantiation(String),

    /// A plugin failed while executing
    #[error("Execution error: {0}")]
    Execution(String),

    /// A plugin failed to describe its schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// A bounded execution ran out of time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Manifest commands containing shell chaining or substitution
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

/// A specialized `Result` type for plugin host operations.
pub type Result<T> = std::result::Result<T, PluginError>;
