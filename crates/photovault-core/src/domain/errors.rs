//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! malformed identifiers and rejected state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Group key is not of the form `YYYY-MM`
    #[error("Invalid group key: {0}")]
    InvalidGroupKey(String),

    /// Remote key template cannot produce unique keys
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },
}
