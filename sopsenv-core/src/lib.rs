//! # sopsenv core
//!
//! Configuration types for sopsenv: the list of encrypted files to load, the
//! per-file format and naming options, and the run-wide security policy.
//!
//! A `sopsenv.toml` file looks like this:
//!
//! ```toml
//! sops_files = ["secrets/dev.env"]
//! global_prefix = "DEV_"
//! key_transform = "uppercase"
//!
//! [[file_configs]]
//! path = "secrets/api.json"
//! format = "json"
//! prefix = "API_"
//! filter = "^DEV_API_(KEY|URL)$"
//! required = false
//! ```
//!
//! Every field also accepts its camelCase spelling (`sopsFiles`,
//! `fileConfigs`, `failOnError`, ...) so configs rendered from Nix option
//! sets load unchanged.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the project-local configuration file.
pub const CONFIG_FILE_NAME: &str = "sopsenv.toml";

/// Default upper bound on an encrypted file's size (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Variables that decrypted content may never set unless the protected set
/// is explicitly replaced in configuration.
pub const DEFAULT_PROTECTED_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "SHELL",
    "LD_LIBRARY_PATH",
    "LD_PRELOAD",
    "SHELLOPTS",
    "IFS",
    "PS1",
    "PS2",
    "PS3",
    "PS4",
    "LD_AUDIT",
    "LD_DEBUG",
    "LD_BIND_NOW",
    "LD_TRACE_LOADED_OBJECTS",
    "DYLD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_PRINT_TO_FILE",
    "BASH_ENV",
    "ENV",
    "PROMPT_COMMAND",
    "PERL5LIB",
    "PYTHONPATH",
    "NODE_PATH",
];

/// Run-wide pipeline configuration.
///
/// Immutable once a run starts. Missing fields take the defaults from
/// [`Config::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Simple form: bare paths, each loaded with default options
    #[serde(alias = "sopsFiles")]
    pub sops_files: Vec<PathBuf>,
    /// Advanced form: per-file options. Takes precedence when non-empty.
    #[serde(alias = "fileConfigs")]
    pub file_configs: Vec<FileSpec>,
    /// Names that decrypted content may never set
    #[serde(alias = "protectedVars")]
    pub protected_vars: BTreeSet<String>,
    /// Reject file paths containing `..` segments
    #[serde(alias = "validatePaths")]
    pub validate_paths: bool,
    /// Reject raw keys that are not shell identifiers
    #[serde(alias = "validateKeys")]
    pub validate_keys: bool,
    /// Largest accepted encrypted file in bytes; 0 disables the check
    #[serde(alias = "maxFileSize")]
    pub max_file_size: u64,
    /// Abort the whole run on the first per-file failure
    #[serde(alias = "failOnError")]
    pub fail_on_error: bool,
    /// Report every decision, not only warnings
    pub verbose: bool,
    /// Allow bindings to replace variables that already exist
    #[serde(alias = "allowOverwrite")]
    pub allow_overwrite: bool,
    /// Prefix prepended to every exported name, before the per-file prefix
    #[serde(alias = "globalPrefix")]
    pub global_prefix: String,
    /// Case transformation applied to prefixed names
    #[serde(alias = "keyTransform")]
    pub key_transform: KeyTransform,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sops_files: Vec::new(),
            file_configs: Vec::new(),
            protected_vars: default_protected_vars(),
            validate_paths: true,
            validate_keys: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            fail_on_error: false,
            verbose: false,
            allow_overwrite: false,
            global_prefix: String::new(),
            key_transform: KeyTransform::None,
        }
    }
}

impl Config {
    /// The effective file list for a run, in configured order.
    ///
    /// `file_configs` wins when non-empty. Otherwise every entry of
    /// `sops_files` becomes a required [`FileSpec`] whose format is inferred
    /// from the file extension.
    pub fn file_specs(&self) -> Vec<FileSpec> {
        if !self.file_configs.is_empty() {
            return self.file_configs.clone();
        }

        self.sops_files
            .iter()
            .map(|path| FileSpec::new(path.clone()).with_format(Format::from_path(path)))
            .collect()
    }

    /// Validate the configuration.
    ///
    /// Ensures that:
    /// - No file entry has an empty path
    /// - Prefixes only contain characters valid in variable names
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if validation fails.
    pub fn validate(&self) -> Result<(), ParseError> {
        if !is_name_fragment(&self.global_prefix) {
            return Err(ParseError::Validation(format!(
                "global_prefix '{}' may only contain ASCII letters, digits and underscores",
                self.global_prefix
            )));
        }

        for path in &self.sops_files {
            if path.as_os_str().is_empty() {
                return Err(ParseError::Validation(
                    "sops_files entries cannot be empty".into(),
                ));
            }
        }

        for (index, spec) in self.file_configs.iter().enumerate() {
            spec.validate()
                .map_err(|e| ParseError::Validation(format!("file_configs[{}]: {}", index, e)))?;
        }

        Ok(())
    }

    /// Whether `name` is in the protected set.
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected_vars.contains(name)
    }

    /// Path of the per-user configuration file, typically
    /// `~/.config/sopsenv/config.toml` on Unix systems.
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "sopsenv").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Find and load configuration for `dir`.
    ///
    /// Looks for `sopsenv.toml` in `dir` first, then the per-user
    /// configuration file. Returns `Ok(None)` when neither exists.
    pub fn discover(dir: &Path) -> Result<Option<Self>, ParseError> {
        let local = dir.join(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::try_from(local.as_path()).map(Some);
        }

        match Self::user_config_path() {
            Some(user) if user.exists() => Self::try_from(user.as_path()).map(Some),
            _ => Ok(None),
        }
    }
}

impl FromStr for Config {
    type Err = ParseError;

    /// Parse and validate configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl TryFrom<&Path> for Config {
    type Error = ParseError;

    /// Load configuration from a file path.
    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let content = fs::read_to_string(path).map_err(|e| {
            ParseError::Io(io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", path.display(), e),
            ))
        })?;
        content.parse()
    }
}

/// One encrypted input file and how to turn it into bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Path to the encrypted file
    pub path: PathBuf,
    /// Format of the decrypted content
    #[serde(default)]
    pub format: Format,
    /// Prefix prepended to every key from this file, after the global prefix
    #[serde(default)]
    pub prefix: String,
    /// Regular expression the final name must match to be exported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Whether a missing file is an error. Defaults to true.
    #[serde(default = "default_true")]
    pub required: bool,
}

impl FileSpec {
    /// A required dotenv file with no prefix or filter.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: Format::Dotenv,
            prefix: String::new(),
            filter: None,
            required: true,
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("path cannot be empty".into());
        }

        if !is_name_fragment(&self.prefix) {
            return Err(format!(
                "prefix '{}' may only contain ASCII letters, digits and underscores",
                self.prefix
            ));
        }

        Ok(())
    }
}

/// Serialization format of a decrypted file.
///
/// Unknown tags are kept as [`Format::Unsupported`] so that they fail the
/// affected file at run time rather than the whole configuration load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Format {
    /// `KEY=value` lines
    #[default]
    Dotenv,
    /// Nested JSON document, flattened with `_`
    Json,
    /// Flat `KEY: value` lines only
    Yaml,
    /// `[section]` headers and `KEY=value` lines
    Ini,
    /// Any other tag
    Unsupported(String),
}

impl Format {
    pub fn as_str(&self) -> &str {
        match self {
            Format::Dotenv => "dotenv",
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Ini => "ini",
            Format::Unsupported(tag) => tag,
        }
    }

    /// Infer the format from a file extension, falling back to dotenv.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Format::Json,
            Some("yaml") | Some("yml") => Format::Yaml,
            Some("ini") => Format::Ini,
            _ => Format::Dotenv,
        }
    }
}

impl From<String> for Format {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "dotenv" | "env" => Format::Dotenv,
            "json" => Format::Json,
            "yaml" | "yml" => Format::Yaml,
            "ini" => Format::Ini,
            _ => Format::Unsupported(tag),
        }
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.as_str().to_string()
    }
}

impl FromStr for Format {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Format::from(s.to_string()))
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case transformation applied to exported names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyTransform {
    #[default]
    None,
    Uppercase,
    Lowercase,
}

impl KeyTransform {
    pub fn apply(self, name: &str) -> String {
        match self {
            KeyTransform::None => name.to_string(),
            KeyTransform::Uppercase => name.to_ascii_uppercase(),
            KeyTransform::Lowercase => name.to_ascii_lowercase(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyTransform::None => "none",
            KeyTransform::Uppercase => "uppercase",
            KeyTransform::Lowercase => "lowercase",
        }
    }
}

impl FromStr for KeyTransform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(KeyTransform::None),
            "uppercase" | "upper" => Ok(KeyTransform::Uppercase),
            "lowercase" | "lower" => Ok(KeyTransform::Lowercase),
            _ => Err(format!(
                "Unknown key transform '{}'. Expected none, uppercase or lowercase",
                s
            )),
        }
    }
}

impl std::fmt::Display for KeyTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if a string is a shell variable name: `^[A-Za-z_][A-Za-z0-9_]*$`.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Prefixes may be empty and may start with a digit, but nothing else.
fn is_name_fragment(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_protected_vars() -> BTreeSet<String> {
    DEFAULT_PROTECTED_VARS.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

/// Errors that can occur when loading a sopsenv configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// I/O error when reading the configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}
