//! Error types for spatial indexing operations.

use thiserror::Error;

/// Errors that can occur in spatial indexing operations.
///
/// The taxonomy is deliberately closed: every failure a caller can
/// provoke falls into one of the first three kinds. `InvariantViolation`
/// is reserved for structural audits and must never fire on a correct
/// tree.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// A construction or query parameter is outside its legal range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A rectangle's dimensionality disagrees with the tree or curve.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A coordinate lies outside the Hilbert curve's ordinate domain.
    #[error("coordinate {value} outside the curve domain [0, {max}]")]
    OutOfRange { value: i64, max: i64 },

    /// A structural invariant does not hold. Only produced by the
    /// `validate` audits.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result type for spatial operations.
pub type SpatialResult<T> = Result<T, SpatialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invalid_parameter() {
        let err = SpatialError::InvalidParameter("m must be at most M/2".into());
        assert_eq!(format!("{}", err), "invalid parameter: m must be at most M/2");
    }

    #[test]
    fn test_display_dimension_mismatch() {
        let err = SpatialError::DimensionMismatch {
            expected: 2,
            actual: 3,
        };
        assert_eq!(format!("{}", err), "dimension mismatch: expected 2, got 3");
    }

    #[test]
    fn test_display_out_of_range() {
        let err = SpatialError::OutOfRange { value: -4, max: 255 };
        assert_eq!(
            format!("{}", err),
            "coordinate -4 outside the curve domain [0, 255]"
        );
    }

    #[test]
    fn test_error_is_std_error() {
        fn takes_error(_e: &dyn std::error::Error) {}
        let err = SpatialError::InvariantViolation("mbr drift".into());
        takes_error(&err);
    }
}
