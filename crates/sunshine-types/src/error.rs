//! Error types for value parsing in sunshine-types.

use thiserror::Error;

/// Errors that can occur when converting raw values into forecast types.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Unit system name not recognized.
    #[error("Unknown unit system: {0}")]
    UnknownUnits(String),

    /// Epoch timestamp outside the representable calendar range.
    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}

/// Result type alias using sunshine-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
