//! Validation errors for air-quality inputs.

use thiserror::Error;

/// Errors raised when caller-supplied values are out of range or malformed.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// Latitude outside [-90, 90] or not finite.
    #[error("Invalid latitude {0}: must be between -90 and 90")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180] or not finite.
    #[error("Invalid longitude {0}: must be between -180 and 180")]
    InvalidLongitude(f64),

    /// AQI ordinal outside 1..=5.
    #[error("Invalid AQI index {0}: must be between 1 and 5")]
    InvalidAqi(u8),

    /// A date or timestamp parameter could not be parsed.
    #[error("Invalid {field} date '{value}': expected YYYY-MM-DD or RFC 3339")]
    InvalidDate { field: &'static str, value: String },

    /// The requested range ends before it starts.
    #[error("Invalid range: start ({start}) is after end ({end})")]
    InvertedRange { start: i64, end: i64 },

    /// The requested range spans more days than a single query may cover.
    #[error("Invalid range: spans more than {max_days} days")]
    RangeTooLong { max_days: u32 },

    /// A required parameter was absent or empty.
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// Unknown data source label.
    #[error("Unknown data source: {0}")]
    UnknownSource(String),
}

/// Result type alias using airq-types' [`ValidationError`].
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
