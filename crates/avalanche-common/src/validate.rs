// ============================================
// File: crates/avalanche-common/src/validate.rs
// ============================================
//! # Value Checks
//!
//! Range checks shared by the listener settings and the server config.
//! Each returns `CommonError::InvalidInput` naming the field.

use std::fmt::Display;

use crate::error::{CommonError, Result};

/// Fails if `value` equals its type's default (zero, empty, `Duration::ZERO`).
///
/// # Errors
/// `InvalidInput` with "must be > 0".
pub fn non_zero<T: Default + PartialEq>(field: &str, value: T) -> Result<()> {
    if value == T::default() {
        return Err(CommonError::invalid_input(field, "must be > 0"));
    }
    Ok(())
}

/// Fails if `value < min`.
///
/// # Errors
/// `InvalidInput` naming the minimum.
pub fn at_least<T: PartialOrd + Display>(field: &str, value: T, min: T) -> Result<()> {
    if value < min {
        return Err(CommonError::invalid_input(
            field,
            format!("must be at least {min}, got {value}"),
        ));
    }
    Ok(())
}

/// Fails if `value > max`.
///
/// # Errors
/// `InvalidInput` naming the maximum.
pub fn at_most<T: PartialOrd + Display>(field: &str, value: T, max: T) -> Result<()> {
    if value > max {
        return Err(CommonError::invalid_input(
            field,
            format!("must be at most {max}, got {value}"),
        ));
    }
    Ok(())
}
