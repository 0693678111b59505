//! Archive entry naming: turn arbitrary naming-column values into safe,
//! stable ZIP entry names.
//!
//! The same key must always map to the same entry name across runs, since
//! the name is the cache key. Names are also used as temporary PDF filenames
//! in the work directory, so they are restricted to a portable character set.

/// Longest sanitized key we keep, in bytes.
const MAX_KEY_LEN: usize = 200;

/// Sanitize a naming key for use inside an archive entry name.
///
/// - Keeps ASCII letters, digits, `-` and `.`
/// - Replaces every other run of characters with a single `_`
/// - Trims leading/trailing `.` and `_`
/// - Limits length to 200 bytes
///
/// Returns an empty string when nothing usable is left; callers treat that
/// as a missing key.
pub fn sanitize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_underscore = false;

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            out.push(c);
            prev_underscore = false;
        } else if !prev_underscore {
            out.push('_');
            prev_underscore = true;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    // Only ASCII survives, so any byte index is a char boundary.
    trimmed[..trimmed.len().min(MAX_KEY_LEN)].to_string()
}

/// Build the archive entry name `<key>_<method>.<ext>`.
///
/// Returns `None` when the key sanitizes to nothing.
pub fn entry_name(key: &str, method_id: &str, extension: &str) -> Option<String> {
    let key = sanitize_key(key);
    if key.is_empty() {
        return None;
    }
    let method = sanitize_key(method_id);
    Some(format!("{key}_{method}.{extension}"))
}
