//! `[section]` headers and `KEY=value` lines.

use super::dotenv;

/// A meaningful ini line.
#[derive(Debug, PartialEq, Eq)]
pub enum IniLine<'a> {
    Section(&'a str),
    Pair(&'a str, &'a str),
}

/// Classify an ini line. Comments (`;` or `#`) and lines with neither a
/// section header nor an `=` yield `None`. Pairs follow the dotenv rules,
/// including quote stripping, but may be indented.
pub fn parse_line(line: &str) -> Option<IniLine<'_>> {
    let trimmed = line.trim();
    if trimmed.starts_with(';') || trimmed.starts_with('#') {
        return None;
    }

    if let Some(name) = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        return Some(IniLine::Section(name.trim()));
    }

    dotenv::parse_line(line.trim_start()).map(|(key, value)| IniLine::Pair(key, value))
}

/// The key prefix for a section: `SECTION_`, or nothing for `[]`.
pub fn section_prefix(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!("{}_", name)
    }
}
