//! Flat `KEY: value` lines.
//!
//! Only top-level scalar lines are understood. Nested mappings, lists,
//! block scalars and anchors are not supported; lines using them are skipped.

use sopsenv_core::is_valid_identifier;

/// Split a `KEY: value` line. The separator is a colon followed by exactly
/// one space; the rest of the line is the value, untouched.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = line.split_once(':')?;
    if !is_valid_identifier(key) {
        return None;
    }
    rest.strip_prefix(' ').map(|value| (key, value))
}
