//! Error types for sunshine-core.
//!
//! This module defines the errors that can occur when fetching a forecast
//! from the remote provider and decoding its payload.
//!
//! # Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::Network`] | Retry on the next scheduled sync | Transport or timeout, usually transient |
//! | [`Error::RateLimited`] | Retry later with a wider interval | Provider is rejecting our request rate or key |
//! | [`Error::InvalidLocation`] | Do not retry until the location changes | Provider does not know the place |
//! | [`Error::MalformedPayload`] | Do not retry this payload | Required fields missing; stored data is kept |
//!
//! The client itself never retries; retry timing belongs to the caller.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when fetching or parsing a forecast.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport failure, timeout, or unexpected HTTP status.
    #[error("Network error: {0}")]
    Network(NetworkFailure),

    /// Provider rejected the request (HTTP 429, 403, 401).
    #[error("Rate limited by provider (HTTP {status})")]
    RateLimited {
        /// HTTP status returned by the provider.
        status: u16,
    },

    /// Provider does not know the requested location.
    #[error("Unknown location: {location}")]
    InvalidLocation {
        /// The location string that was requested.
        location: String,
    },

    /// Payload could not be decoded into forecast rows.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for network failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NetworkFailure {
    /// The request did not complete before the caller's deadline.
    Timeout {
        /// The deadline that was exceeded.
        deadline: Duration,
    },
    /// Connection or transport level error.
    Transport(String),
    /// Provider answered with a status that has no specific mapping.
    Status(u16),
}

impl std::fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { deadline } => write!(f, "request timed out after {:?}", deadline),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Status(code) => write!(f, "unexpected HTTP status {}", code),
        }
    }
}

impl Error {
    /// Create a timeout error for the given deadline.
    pub fn timeout(deadline: Duration) -> Self {
        Self::Network(NetworkFailure::Timeout { deadline })
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Network(NetworkFailure::Transport(message.into()))
    }

    /// Create a malformed payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    /// Create an invalid location error.
    pub fn invalid_location(location: impl Into<String>) -> Self {
        Self::InvalidLocation {
            location: location.into(),
        }
    }

    /// Whether a later attempt with the same input may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }

    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(NetworkFailure::Timeout { .. }))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::MalformedPayload(err.to_string())
        } else if let Some(status) = err.status() {
            Error::Network(NetworkFailure::Status(status.as_u16()))
        } else {
            Error::transport(err.to_string())
        }
    }
}

/// Result type alias using sunshine-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
