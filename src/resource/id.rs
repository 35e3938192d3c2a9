//! Composite resource ids
//!
//! Resources addressed by more than one remote name use a colon-joined id
//! (`<project>:<config_name>`, `<load_balancer_id>:<frontend_port>`).

use crate::error::{ProviderError, Result};

pub const SEPARATOR: char = ':';

/// Join parts into a composite id
pub fn join_id(parts: &[&str]) -> String {
    parts.join(&SEPARATOR.to_string())
}

/// Split an id into exactly `N` non-empty parts
pub fn split_id<const N: usize>(id: &str) -> Result<[&str; N]> {
    let parts = split_id_range(id, N, N)?;
    parts
        .try_into()
        .map_err(|_| ProviderError::invalid_id(id, format!("expected {} parts", N)))
}

/// Split an id into between `min` and `max` non-empty parts
pub fn split_id_range(id: &str, min: usize, max: usize) -> Result<Vec<&str>> {
    let parts: Vec<&str> = id.split(SEPARATOR).collect();

    if parts.len() < min || parts.len() > max {
        let expected = if min == max {
            format!("expected {} colon-separated parts", min)
        } else {
            format!("expected {} to {} colon-separated parts", min, max)
        };
        return Err(ProviderError::invalid_id(id, format!("{}, got {}", expected, parts.len())));
    }

    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(ProviderError::invalid_id(id, "empty id segment"));
    }

    Ok(parts)
}

/// `<load_balancer_id>:<frontend_port>`
pub fn parse_listener_id(id: &str) -> Result<(String, u16)> {
    let [lb, port] = split_id::<2>(id)?;
    let port: u16 = port
        .parse()
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| ProviderError::invalid_id(id, format!("'{}' is not a valid port", port)))?;
    Ok((lb.to_string(), port))
}
