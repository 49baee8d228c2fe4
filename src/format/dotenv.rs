//! `KEY=value` lines.

/// Split a dotenv line into key and value.
///
/// The key is everything before the first `=` and is returned unchecked, so
/// that malformed keys are rejected (and counted) by the validator rather
/// than vanishing here. The value is everything after it, so values may
/// contain `=` themselves. One pair of matching enclosing quotes is removed
/// from the value.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key, strip_quotes(value)))
}

/// Remove one pair of enclosing `"` or `'` quotes, if both ends match.
pub fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &value[1..value.len() - 1];
        }
    }
    value
}
