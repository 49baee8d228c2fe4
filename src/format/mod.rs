//! # Format parsers
//!
//! Turn decrypted plaintext into an ordered sequence of [`RawPair`]s. The
//! line-based formats (dotenv, yaml, ini) are parsed lazily, one line per
//! `next()`; JSON is parsed and flattened up front.
//!
//! Order follows the source. Duplicate keys are all emitted; which one wins
//! is decided when the pairs are exported.

use crate::{Result, SopsEnvError};
use sopsenv_core::Format;
use std::iter::Enumerate;
use std::str::Lines;

pub mod dotenv;
pub mod ini;
#[cfg(feature = "json")]
pub mod json;
pub mod yaml;

/// An unvalidated key/value pair extracted from plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPair {
    pub key: String,
    pub value: String,
    /// Where the pair came from, for diagnostics (`line 3`, `$.api.key`)
    pub source: String,
}

impl RawPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source: source.into(),
        }
    }
}

/// Parse `text` as `format`.
///
/// Fails with [`SopsEnvError::UnsupportedFormat`] for unknown format tags,
/// and with [`SopsEnvError::MissingDependency`] for JSON when the crate was
/// built without the `json` feature.
pub fn parse<'a>(text: &'a str, format: &Format) -> Result<Pairs<'a>> {
    match format {
        Format::Dotenv => Ok(Pairs::Lines(LinePairs::new(text, LineFormat::Dotenv))),
        Format::Yaml => Ok(Pairs::Lines(LinePairs::new(text, LineFormat::Yaml))),
        Format::Ini => Ok(Pairs::Lines(LinePairs::new(text, LineFormat::Ini))),
        #[cfg(feature = "json")]
        Format::Json => Ok(Pairs::Flattened(json::flatten(text)?.into_iter())),
        #[cfg(not(feature = "json"))]
        Format::Json => Err(SopsEnvError::MissingDependency(
            "JSON support is not available in this build (enable the `json` feature)".into(),
        )),
        Format::Unsupported(tag) => Err(SopsEnvError::UnsupportedFormat(tag.clone())),
    }
}

/// Iterator over the pairs of one decrypted document.
pub enum Pairs<'a> {
    Lines(LinePairs<'a>),
    Flattened(std::vec::IntoIter<RawPair>),
}

impl Iterator for Pairs<'_> {
    type Item = RawPair;

    fn next(&mut self) -> Option<RawPair> {
        match self {
            Pairs::Lines(lines) => lines.next(),
            Pairs::Flattened(pairs) => pairs.next(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineFormat {
    Dotenv,
    Yaml,
    Ini,
}

/// Lazy parser for the line-oriented formats.
///
/// Lines that don't match the format's shape are skipped.
pub struct LinePairs<'a> {
    format: LineFormat,
    lines: Enumerate<Lines<'a>>,
    /// Current ini section as a key prefix (`SECTION_`), empty outside sections
    section: String,
}

impl<'a> LinePairs<'a> {
    fn new(text: &'a str, format: LineFormat) -> Self {
        Self {
            format,
            lines: text.lines().enumerate(),
            section: String::new(),
        }
    }
}

impl Iterator for LinePairs<'_> {
    type Item = RawPair;

    fn next(&mut self) -> Option<RawPair> {
        for (index, line) in self.lines.by_ref() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let line_no = index + 1;
            let pair = match self.format {
                LineFormat::Dotenv => dotenv::parse_line(line).map(|(key, value)| (key.to_string(), value)),
                LineFormat::Yaml => yaml::parse_line(line).map(|(key, value)| (key.to_string(), value)),
                LineFormat::Ini => match ini::parse_line(line) {
                    Some(ini::IniLine::Section(name)) => {
                        self.section = ini::section_prefix(name);
                        continue;
                    }
                    Some(ini::IniLine::Pair(key, value)) => {
                        Some((format!("{}{}", self.section, key), value))
                    }
                    None => None,
                },
            };

            match pair {
                Some((key, value)) => {
                    return Some(RawPair::new(key, value, format!("line {}", line_no)));
                }
                None => tracing::trace!(line = line_no, "line does not match format, skipping"),
            }
        }

        None
    }
}
