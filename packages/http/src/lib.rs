#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Outbound HTTP helpers for launch risk evaluation.
//!
//! Every network call (elevation lookups, raw hazard data downloads) goes
//! through a [`RetryPolicy`] so retry behaviour is configured in one place
//! and reused identically.
//!
//! # Usage
//!
//! ```ignore
//! use launch_risk_http::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! let body = policy.get_json(&url, || client.get(&url)).await?;
//! ```

pub mod download;
pub mod retry;

pub use download::download_file;
pub use retry::RetryPolicy;

use thiserror::Error;

/// Errors from outbound HTTP calls.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request kept failing with retryable errors until the policy
    /// gave up.
    #[error("Transient network error for {url} after {attempts} attempts: {last_error}")]
    TransientNetwork {
        /// Request URL.
        url: String,
        /// Total attempts made.
        attempts: u32,
        /// Description of the final failure.
        last_error: String,
    },

    /// Non-retryable HTTP status.
    #[error("HTTP {status} for {url}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Transport error (connection, timeout, body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body was not valid JSON.
    #[error("JSON error from {url}: {source}")]
    Json {
        /// Request URL.
        url: String,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// I/O error writing a download to disk.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl HttpError {
    /// Returns `true` for failures worth surfacing as a transient network
    /// condition rather than a permanent one.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }
}

/// Builds the shared HTTP client with the toolchain's user agent.
///
/// # Errors
///
/// Returns [`HttpError::Http`] if the TLS backend cannot be initialised.
pub fn client() -> Result<reqwest::Client, HttpError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("launch-risk/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
