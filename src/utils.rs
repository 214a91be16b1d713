//! Shared utility functions
//! Common helpers used across the codebase

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
///
/// Safety controls keep their windows in this unit so that state
/// survives a checkpoint round-trip.
#[inline]
#[must_use]
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Minimal `*` glob used for trigger patterns.
///
/// `*` matches any run of characters (including `/`). Matching is
/// case-sensitive; a pattern without `*` must equal the path or be a
/// suffix starting at a path separator.
#[must_use]
pub fn glob_match(pattern: &str, path: &str) -> bool {
    if !pattern.contains('*') {
        return path == pattern || path.ends_with(&format!("/{}", pattern));
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = path;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }

    // Pattern ended with '*' (or was only stars)
    true
}
