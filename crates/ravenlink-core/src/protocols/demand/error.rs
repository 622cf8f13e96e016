use thiserror::Error;

use super::layout::Field;

/// Errors returned when a single field cannot be decoded.
///
/// # Examples
/// ```
/// use ravenlink_core::protocols::demand::error::FieldError;
/// use ravenlink_core::protocols::demand::layout::Field;
///
/// let err = FieldError::MalformedField { field: Field::Demand, value: "zz".to_string() };
/// assert!(err.to_string().contains("malformed Demand field"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("malformed {field} field '{value}': expected hexadecimal digits")]
    MalformedField { field: Field, value: String },
}

/// Failures that discard a whole fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("malformed markup: {0}")]
    Markup(String),
    #[error("invalid UTF-8 after byte {valid_up_to}")]
    Encoding { valid_up_to: usize },
}

impl From<roxmltree::Error> for FragmentError {
    fn from(err: roxmltree::Error) -> Self {
        Self::Markup(err.to_string())
    }
}

impl From<std::str::Utf8Error> for FragmentError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Encoding {
            valid_up_to: err.valid_up_to(),
        }
    }
}
