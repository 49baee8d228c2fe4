//! Key and value checks applied to every pair before it is exported.

use crate::export::Environment;
use sopsenv_core::{Config, is_valid_identifier};

/// Why a single pair was not exported.
///
/// Rejects only ever drop one pair; they never abort a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    /// The key is not a shell identifier
    InvalidName,
    /// The final name is in the protected set
    ProtectedName,
    /// A variable with the final name already exists and overwriting is off
    AlreadyExists,
    /// The final name does not match the file's filter
    Filtered,
}

impl Reject {
    pub fn as_str(self) -> &'static str {
        match self {
            Reject::InvalidName => "InvalidName",
            Reject::ProtectedName => "ProtectedName",
            Reject::AlreadyExists => "AlreadyExists",
            Reject::Filtered => "Filtered",
        }
    }
}

impl std::fmt::Display for Reject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sequences that can trigger expansion or execution if a value reaches a
/// shell unquoted. Longer sequences come first so reports name the most
/// specific match.
pub const INJECTION_PATTERNS: &[&str] = &["$(", "<(", "{{", "$", "`", "\\"];

/// Policy checks driven by the run configuration.
pub struct Validator<'a> {
    config: &'a Config,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Shape check on the key as it appears in the source, before any
    /// prefix or transform. Skipped when `validate_keys` is off.
    pub fn check_raw_key(&self, key: &str) -> Result<(), Reject> {
        if self.config.validate_keys && !is_valid_identifier(key) {
            return Err(Reject::InvalidName);
        }
        Ok(())
    }

    /// Checks on the final, prefixed and transformed name, in order:
    /// identifier shape, protected set, then existing variables.
    pub fn check_final_name(&self, name: &str, env: &dyn Environment) -> Result<(), Reject> {
        if !is_valid_identifier(name) {
            return Err(Reject::InvalidName);
        }

        if self.config.is_protected(name) {
            return Err(Reject::ProtectedName);
        }

        if !self.config.allow_overwrite && env.get(name).is_some() {
            return Err(Reject::AlreadyExists);
        }

        Ok(())
    }
}

/// The first injection pattern found in `value`, if any.
pub fn scan_injection(value: &str) -> Option<&'static str> {
    INJECTION_PATTERNS
        .iter()
        .copied()
        .find(|pattern| value.contains(pattern))
}
