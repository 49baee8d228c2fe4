//! sopsenv - load sops-encrypted secrets into development shells
//!
//! Decrypts a configured list of files, parses them (dotenv, JSON, YAML or
//! INI), checks every key and value against a security policy, and produces
//! a set of validated environment bindings. The bindings can be rendered as
//! a shell hook, written as a `.env` file, or passed to a child process.
//!
//! # Example
//!
//! ```no_run
//! use sopsenv::{Config, FileSpec, Format, MemoryEnv, Pipeline, SopsDecryptor};
//!
//! let config = Config {
//!     file_configs: vec![FileSpec::new("secrets/api.json").with_format(Format::Json)],
//!     ..Config::default()
//! };
//!
//! let mut env = MemoryEnv::from_process();
//! let report = Pipeline::new(&config, &SopsDecryptor::new()).run(&mut env)?;
//! print!("{}", sopsenv::render::render_shell(&report.bindings));
//! # Ok::<(), sopsenv::SopsEnvError>(())
//! ```

mod error;

pub mod cleanup;
pub mod decrypt;
pub mod export;
pub mod format;
pub mod pipeline;
pub mod render;
pub mod validate;

// CLI module (feature-gated)
#[cfg(feature = "cli")]
pub mod cli;

pub use decrypt::{Decryptor, PlainDecryptor, Plaintext, SopsDecryptor};
pub use error::{Result, SopsEnvError};
pub use export::{Binding, BindingSet, Environment, MemoryEnv};
pub use pipeline::{FileOutcome, FileReport, Pipeline, RunReport, RunStats, Stage};
pub use validate::Reject;

// Configuration types live in sopsenv-core
pub use sopsenv_core::{Config, FileSpec, Format, KeyTransform, ParseError};

/// Run `config` with `sops` against a snapshot of the current process
/// environment.
///
/// Returns the report and the environment with the bindings installed.
pub fn run(config: &Config) -> Result<(RunReport, MemoryEnv)> {
    let mut env = MemoryEnv::from_process();
    let report = Pipeline::new(config, &SopsDecryptor::new()).run(&mut env)?;
    Ok((report, env))
}
