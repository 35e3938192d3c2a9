//! Argument validation helpers

use crate::error::{ProviderError, Result};
use std::fmt::Display;

pub fn int_in_range(field: &str, value: i64, min: i64, max: i64) -> Result<()> {
    if value < min || value > max {
        return Err(ProviderError::validation(format!(
            "'{}' must be between {} and {} inclusive, got {}",
            field, min, max, value
        )));
    }
    Ok(())
}

pub fn one_of<T: AsRef<str> + ?Sized>(field: &str, value: &T, allowed: &[&str]) -> Result<()> {
    let value = value.as_ref();
    if !allowed.contains(&value) {
        return Err(ProviderError::validation(format!(
            "'{}' must be one of {:?}, got '{}'",
            field, allowed, value
        )));
    }
    Ok(())
}

/// Each comma-separated element of `value` must be in `allowed`
pub fn all_of_split(field: &str, value: &str, allowed: &[&str]) -> Result<()> {
    for part in value.split(',') {
        one_of(field, part.trim(), allowed)?;
    }
    Ok(())
}

pub fn length_in_range(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ProviderError::validation(format!(
            "'{}' must be {} to {} characters long, got {}",
            field, min, max, len
        )));
    }
    Ok(())
}

/// `field` must be set (and non-empty) when `condition` holds
pub fn required_when<T>(
    field: &str,
    value: &Option<T>,
    condition: bool,
    reason: impl Display,
) -> Result<()>
where
    T: AsRef<str>,
{
    let present = value.as_ref().is_some_and(|v| !v.as_ref().trim().is_empty());
    if condition && !present {
        return Err(ProviderError::validation(format!(
            "'{}': required field is not set when {}",
            field, reason
        )));
    }
    Ok(())
}
