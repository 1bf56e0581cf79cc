//! Error types for fitstream-play
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. The public transport surface never returns these for
//! playback-health conditions — a stalled network must not crash the host
//! UI — so `Error` covers only genuinely exceptional situations such as
//! configuration failures.

use thiserror::Error;

/// Main error type for the fitstream-play crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file parse errors
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using fitstream-play Error
pub type Result<T> = std::result::Result<T, Error>;
