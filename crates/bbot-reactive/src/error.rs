//! Errors raised by the quantity layer.

use thiserror::Error;

/// Failure converting or formatting a physical quantity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    /// The unit suffix is not declared for this quantity kind.
    #[error("unknown unit suffix: {unit}")]
    UnknownUnit { unit: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_unit_names_the_suffix() {
        let error = QuantityError::UnknownUnit {
            unit: "furlong".to_string(),
        };
        assert_eq!(error.to_string(), "unknown unit suffix: furlong");
    }
}
