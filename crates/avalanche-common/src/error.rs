// ============================================
// File: crates/avalanche-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Base error for bad caller-supplied values. Listener settings, server
//! configuration and key-exchange parameters are all checked through the
//! helpers in [`crate::validate`], which report failures as
//! `CommonError::InvalidInput`.
//!
//! ## Design Philosophy
//! - `thiserror` for the definitions
//! - Crate-specific errors wrap `CommonError` through `#[from]`
//! - Messages never include key material
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Common error types shared across Avalanche crates.
///
/// # Example
/// ```
/// use avalanche_common::error::{CommonError, Result};
///
/// fn require_port(port: u16) -> Result<()> {
///     if port == 0 {
///         return Err(CommonError::invalid_input("port", "must be > 0"));
///     }
///     Ok(())
/// }
///
/// assert!(require_port(0).is_err());
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    /// Invalid input value provided.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },
}

impl CommonError {
    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Name of the offending field.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::InvalidInput { field, .. } => field,
        }
    }
}

// ============================================
// Tests
// ============================================
