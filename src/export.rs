//! Turning accepted pairs into bindings.
//!
//! The [`Exporter`] applies naming (prefixes, case transform, filter), runs
//! the [`Validator`] checks on the final name and installs the result into an
//! [`Environment`].

use crate::format::RawPair;
use crate::validate::{Reject, Validator, scan_injection};
use crate::{Result, SopsEnvError};
use regex::Regex;
use sopsenv_core::{Config, FileSpec};
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;

/// The variables bindings are checked against and installed into.
pub trait Environment {
    fn get(&self, name: &str) -> Option<&str>;
    fn set(&mut self, name: &str, value: &str);
}

/// An in-memory environment, usually a snapshot of the current process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryEnv {
    vars: HashMap<String, String>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self::from_vars(env::vars_os())
    }

    /// Build from raw OS strings. Names and values that are not valid UTF-8
    /// are kept in lossy form, so every existing name still counts as set.
    pub fn from_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        let vars = vars
            .into_iter()
            .map(|(name, value)| {
                (
                    name.to_string_lossy().into_owned(),
                    value.to_string_lossy().into_owned(),
                )
            })
            .collect();
        Self { vars }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl Environment for MemoryEnv {
    fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    fn set(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }
}

/// A validated variable ready to be exported.
///
/// `name` is always a shell identifier outside the protected set. `value` is
/// the literal decrypted value; `sanitized` marks values that contained
/// shell metacharacters and must only ever reach a shell quoted.
#[derive(Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: String,
    pub value: String,
    pub sanitized: bool,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("sanitized", &self.sanitized)
            .finish()
    }
}

/// Bindings in first-export order. Re-exporting a name replaces its value in
/// place.
#[derive(Debug, Clone, Default)]
pub struct BindingSet {
    items: Vec<Binding>,
    index: HashMap<String, usize>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, binding: Binding) {
        match self.index.get(&binding.name) {
            Some(&position) => self.items[position] = binding,
            None => {
                self.index.insert(binding.name.clone(), self.items.len());
                self.items.push(binding);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.index.get(name).map(|&position| &self.items[position])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Binding> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Name to value mapping.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.items
            .iter()
            .map(|b| (b.name.clone(), b.value.clone()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a BindingSet {
    type Item = &'a Binding;
    type IntoIter = std::slice::Iter<'a, Binding>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Exports the pairs of one file.
pub struct Exporter<'a> {
    config: &'a Config,
    validator: Validator<'a>,
    /// `global_prefix` followed by the file's own prefix
    prefix: String,
    filter: Option<Regex>,
}

impl<'a> Exporter<'a> {
    /// Fails with [`SopsEnvError::InvalidFilter`] if the file's filter is not
    /// a valid regular expression.
    pub fn new(config: &'a Config, spec: &FileSpec) -> Result<Self> {
        let filter = spec
            .filter
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| SopsEnvError::InvalidFilter {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(Self {
            config,
            validator: Validator::new(config),
            prefix: format!("{}{}", config.global_prefix, spec.prefix),
            filter,
        })
    }

    /// Prefix then transform a raw key.
    pub fn final_name(&self, key: &str) -> String {
        self.config
            .key_transform
            .apply(&format!("{}{}", self.prefix, key))
    }

    /// Validate `pair`, and on success install it into `env`.
    ///
    /// The raw key is shape-checked first; the filter, protected set and
    /// existing-variable checks all see the final name.
    pub fn export(&self, pair: &RawPair, env: &mut dyn Environment) -> std::result::Result<Binding, Reject> {
        self.validator.check_raw_key(&pair.key)?;

        let name = self.final_name(&pair.key);

        if let Some(filter) = &self.filter {
            if !filter.is_match(&name) {
                return Err(Reject::Filtered);
            }
        }

        self.validator.check_final_name(&name, env)?;

        let sanitized = scan_injection(&pair.value).is_some();
        env.set(&name, &pair.value);

        Ok(Binding {
            name,
            value: pair.value.clone(),
            sanitized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sopsenv_core::KeyTransform;

    fn pair(key: &str, value: &str) -> RawPair {
        RawPair::new(key, value, "line 1")
    }

    #[test]
    fn test_prefix_and_transform_compose() {
        let config = Config {
            global_prefix: "ENV_".to_string(),
            key_transform: KeyTransform::Uppercase,
            ..Config::default()
        };
        let spec = FileSpec::new("s.env").with_prefix("APP_");
        let exporter = Exporter::new(&config, &spec).unwrap();
        let mut env = MemoryEnv::new();

        let binding = exporter.export(&pair("db_host", "localhost"), &mut env).unwrap();
        assert_eq!(binding.name, "ENV_APP_DB_HOST");
        assert_eq!(binding.value, "localhost");
        assert_eq!(env.get("ENV_APP_DB_HOST"), Some("localhost"));
    }

    #[test]
    fn test_protected_check_uses_final_name() {
        let config = Config {
            key_transform: KeyTransform::Uppercase,
            ..Config::default()
        };
        let exporter = Exporter::new(&config, &FileSpec::new("s.env")).unwrap();
        let mut env = MemoryEnv::new();

        assert_eq!(
            exporter.export(&pair("path", "/evil"), &mut env),
            Err(Reject::ProtectedName)
        );
        assert!(env.is_empty());
    }

    #[test]
    fn test_prefix_moves_name_out_of_protected_set() {
        let config = Config::default();
        let spec = FileSpec::new("s.env").with_prefix("APP_");
        let exporter = Exporter::new(&config, &spec).unwrap();
        let mut env = MemoryEnv::new();

        let binding = exporter.export(&pair("PATH", "/opt/app"), &mut env).unwrap();
        assert_eq!(binding.name, "APP_PATH");
    }

    #[test]
    fn test_filter_matches_final_name() {
        let config = Config {
            key_transform: KeyTransform::Uppercase,
            ..Config::default()
        };
        let spec = FileSpec::new("s.env").with_prefix("api_").with_filter("^API_(KEY|URL)$");
        let exporter = Exporter::new(&config, &spec).unwrap();
        let mut env = MemoryEnv::new();

        assert!(exporter.export(&pair("key", "k"), &mut env).is_ok());
        assert_eq!(
            exporter.export(&pair("secret", "s"), &mut env),
            Err(Reject::Filtered)
        );
    }

    #[test]
    fn test_invalid_filter() {
        let config = Config::default();
        let spec = FileSpec::new("s.env").with_filter("([unclosed");
        match Exporter::new(&config, &spec) {
            Err(SopsEnvError::InvalidFilter { pattern, .. }) => assert_eq!(pattern, "([unclosed"),
            Err(e) => panic!("Expected InvalidFilter, got {}", e),
            Ok(_) => panic!("Expected InvalidFilter"),
        }
    }

    #[test]
    fn test_existing_variable_kept_without_overwrite() {
        let config = Config::default();
        let exporter = Exporter::new(&config, &FileSpec::new("s.env")).unwrap();
        let mut env = MemoryEnv::new().with("TOKEN", "original");

        assert_eq!(
            exporter.export(&pair("TOKEN", "new"), &mut env),
            Err(Reject::AlreadyExists)
        );
        assert_eq!(env.get("TOKEN"), Some("original"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_variable_still_blocks_export() {
        use std::os::unix::ffi::OsStringExt;

        let mut env = MemoryEnv::from_vars([(
            OsString::from("AMBIENT"),
            OsString::from_vec(vec![0xff, 0xfe]),
        )]);
        assert!(env.get("AMBIENT").is_some());

        let config = Config::default();
        let exporter = Exporter::new(&config, &FileSpec::new("s.env")).unwrap();
        assert_eq!(
            exporter.export(&pair("AMBIENT", "from_secret"), &mut env),
            Err(Reject::AlreadyExists)
        );
        assert_ne!(env.get("AMBIENT"), Some("from_secret"));
    }

    #[test]
    fn test_from_process_sees_process_variables() {
        let name = env::vars_os().next().map(|(name, _)| name);
        let snapshot = MemoryEnv::from_process();
        if let Some(name) = name {
            assert!(snapshot.get(&name.to_string_lossy()).is_some());
        }
    }

    #[test]
    fn test_injection_values_are_flagged_not_dropped() {
        let config = Config::default();
        let exporter = Exporter::new(&config, &FileSpec::new("s.env")).unwrap();
        let mut env = MemoryEnv::new();

        let binding = exporter.export(&pair("CMD", "$(whoami)"), &mut env).unwrap();
        assert!(binding.sanitized);
        assert_eq!(binding.value, "$(whoami)");

        let binding = exporter.export(&pair("PLAIN", "hello"), &mut env).unwrap();
        assert!(!binding.sanitized);
    }

    #[test]
    fn test_binding_debug_redacts_value() {
        let binding = Binding {
            name: "API_KEY".to_string(),
            value: "super-secret".to_string(),
            sanitized: false,
        };
        let debug = format!("{:?}", binding);
        assert!(debug.contains("API_KEY"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_binding_set_replaces_in_place() {
        let mut set = BindingSet::new();
        for (name, value) in [("A", "1"), ("B", "2"), ("A", "3")] {
            set.insert(Binding {
                name: name.to_string(),
                value: value.to_string(),
                sanitized: false,
            });
        }

        let names: Vec<&str> = set.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(set.get("A").map(|b| b.value.as_str()), Some("3"));
        assert_eq!(set.to_map().len(), 2);
    }
}
