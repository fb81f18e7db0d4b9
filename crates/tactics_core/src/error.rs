//! Error types for the combat simulation.

use thiserror::Error;

/// Result type alias using [`TacticsError`].
pub type Result<T> = std::result::Result<T, TacticsError>;

/// Top-level error type for all combat simulation errors.
///
/// The decision layer itself never errors; an unavailable action degrades
/// to a fallback behavior instead. These variants cover the library
/// boundary: bad ids from the host, malformed configuration, snapshot
/// codec failures.
#[derive(Debug, Error)]
pub enum TacticsError {
    /// Invalid actor reference.
    #[error("Actor not found: {0}")]
    ActorNotFound(u64),

    /// Invalid cover reference.
    #[error("Cover not found: {0}")]
    CoverNotFound(u32),

    /// World bounds or grid construction problem.
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// Configuration parsing error.
    #[error("Failed to parse config: {0}")]
    ConfigParseError(String),

    /// A tunable carries a value outside its meaningful range.
    #[error("Invalid config value for {field}: {message}")]
    InvalidConfigValue {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// Invalid world state during snapshot encode/decode.
    #[error("Invalid world state: {0}")]
    InvalidState(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TacticsError::ActorNotFound(9);
        assert_eq!(err.to_string(), "Actor not found: 9");

        let err = TacticsError::InvalidConfigValue {
            field: "max_cover_distance",
            message: "must be positive".to_string(),
        };
        assert!(err.to_string().contains("max_cover_distance"));
    }
}
