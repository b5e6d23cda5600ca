use thiserror::Error;

/// Codec failures. Every variant is a permanent error class: re-submitting
/// the same bytes cannot change the outcome, so callers must never retry
/// on an `X12Error`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum X12Error {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("X12 parse error: {0}")]
    Parse(String),

    #[error("unexpected transaction set: expected {expected}, found {found}")]
    UnexpectedTransactionSet {
        expected: &'static str,
        found: String,
    },
}
