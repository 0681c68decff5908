//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID has the wrong number of hex digits.
    #[error("invalid ID length: expected {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The ID contains a non-hex character.
    #[error("invalid ID character: {0:?}")]
    InvalidCharacter(char),

    /// The ID is outside the valid value range for its type.
    #[error("ID value out of range: {value:#x} not in {min:#x}..={max:#x}")]
    OutOfRange { value: u32, min: u32, max: u32 },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
