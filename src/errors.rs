// src/errors.rs

//! Crate-wide error type.
//!
//! Only `Validation`, `IdentityResolution` and `Start` are produced by the
//! hook lifecycle itself; everything a hook does after it has been launched
//! (non-zero exit, wait/kill failures, timeouts) is logged and absorbed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Validation(String),

    #[error("cannot resolve {field} '{name}': {reason}")]
    IdentityResolution {
        field: &'static str,
        name: String,
        reason: String,
    },

    #[error("{hook}: failed to start '{program}': {source}")]
    Start {
        hook: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServerError {
    /// Shorthand for a `Validation` error.
    pub fn validation(msg: impl Into<String>) -> Self {
        ServerError::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
