//! # File pipeline
//!
//! Processes the configured files in order, one at a time:
//!
//! ```text
//! Pending -> PathChecked -> ExistenceChecked -> SizeChecked
//!         -> Decrypted -> Parsed -> Exported -> Done
//! ```
//!
//! Any step may abort the file. With `fail_on_error` the first abort ends the
//! run with that error; otherwise the file is recorded as aborted and the
//! next one starts. Bindings exported before an abort stay exported.

use crate::decrypt::Decryptor;
use crate::export::{BindingSet, Environment, Exporter};
use crate::format;
use crate::validate::{Reject, scan_injection};
use crate::{Result, SopsEnvError};
use sopsenv_core::{Config, FileSpec};
use std::fs;
use std::io;
use std::path::{Component, Path};
use tracing::{debug, info, warn};

/// How far a file got through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Pending,
    PathChecked,
    ExistenceChecked,
    SizeChecked,
    Decrypted,
    Parsed,
    Exported,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::PathChecked => "path checked",
            Stage::ExistenceChecked => "existence checked",
            Stage::SizeChecked => "size checked",
            Stage::Decrypted => "decrypted",
            Stage::Parsed => "parsed",
            Stage::Exported => "exported",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Per-file counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub lines_read: usize,
    pub exported: usize,
    /// Pairs rejected by validation
    pub skipped: usize,
    /// Pairs dropped by the file's filter
    pub filtered: usize,
    /// Exported pairs whose value contained shell metacharacters
    pub sanitized: usize,
}

impl std::ops::AddAssign for RunStats {
    fn add_assign(&mut self, other: Self) {
        self.lines_read += other.lines_read;
        self.exported += other.exported;
        self.skipped += other.skipped;
        self.filtered += other.filtered;
        self.sanitized += other.sanitized;
    }
}

/// How a file's processing ended.
#[derive(Debug)]
pub enum FileOutcome {
    Done,
    /// An optional file that does not exist
    SkippedOptional,
    Aborted(SopsEnvError),
}

#[derive(Debug)]
pub struct FileReport {
    pub spec: FileSpec,
    /// Last stage reached
    pub stage: Stage,
    pub outcome: FileOutcome,
    pub stats: RunStats,
}

impl FileReport {
    fn new(spec: FileSpec) -> Self {
        Self {
            spec,
            stage: Stage::Pending,
            outcome: FileOutcome::Done,
            stats: RunStats::default(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, FileOutcome::Aborted(_))
    }
}

/// Result of a completed run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub bindings: BindingSet,
    pub files: Vec<FileReport>,
}

impl RunReport {
    /// Counters summed over every file.
    pub fn totals(&self) -> RunStats {
        let mut totals = RunStats::default();
        for file in &self.files {
            totals += file.stats;
        }
        totals
    }

    pub fn aborted(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.is_aborted())
    }
}

/// Runs the configured files through a [`Decryptor`] into an [`Environment`].
pub struct Pipeline<'a> {
    config: &'a Config,
    decryptor: &'a dyn Decryptor,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, decryptor: &'a dyn Decryptor) -> Self {
        Self { config, decryptor }
    }

    /// Process every configured file, installing bindings into `env`.
    ///
    /// # Errors
    ///
    /// Only when `fail_on_error` is set: returns the first per-file failure.
    /// Bindings installed before the failure remain in `env`.
    pub fn run(&self, env: &mut dyn Environment) -> Result<RunReport> {
        let mut report = RunReport::default();

        for spec in self.config.file_specs() {
            let mut file = FileReport::new(spec);

            if let Err(err) = self.process(&mut file, env, &mut report.bindings) {
                if self.config.fail_on_error {
                    warn!(
                        path = %file.spec.path.display(),
                        stage = %file.stage,
                        kind = err.kind(),
                        "aborting run: {}",
                        err
                    );
                    return Err(err);
                }

                warn!(
                    path = %file.spec.path.display(),
                    stage = %file.stage,
                    kind = err.kind(),
                    "skipping file: {}",
                    err
                );
                file.outcome = FileOutcome::Aborted(err);
            }

            report.files.push(file);
        }

        Ok(report)
    }

    fn process(
        &self,
        file: &mut FileReport,
        env: &mut dyn Environment,
        bindings: &mut BindingSet,
    ) -> Result<()> {
        let spec = file.spec.clone();
        let path = spec.path.as_path();

        if self.config.validate_paths && has_traversal(path) {
            return Err(SopsEnvError::PathTraversal(path.to_path_buf()));
        }
        file.stage = Stage::PathChecked;

        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if spec.required {
                    return Err(SopsEnvError::RequiredFileMissing(path.to_path_buf()));
                }
                self.decision(format_args!(
                    "optional file not found: {}",
                    path.display()
                ));
                file.outcome = FileOutcome::SkippedOptional;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        file.stage = Stage::ExistenceChecked;

        let limit = self.config.max_file_size;
        if limit > 0 && metadata.len() > limit {
            return Err(SopsEnvError::FileTooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit,
            });
        }
        file.stage = Stage::SizeChecked;

        let exporter = Exporter::new(self.config, &spec)?;

        let plaintext = self.decryptor.decrypt(path, &spec.format)?;
        file.stage = Stage::Decrypted;
        file.stats.lines_read = plaintext.expose().lines().count();

        let pairs = format::parse(plaintext.expose(), &spec.format)?;
        file.stage = Stage::Parsed;

        for pair in pairs {
            match exporter.export(&pair, env) {
                Ok(binding) => {
                    if binding.sanitized {
                        file.stats.sanitized += 1;
                        let pattern = scan_injection(&binding.value).unwrap_or_default();
                        if self.config.verbose {
                            warn!(
                                name = %binding.name,
                                source = %pair.source,
                                pattern,
                                "value contains shell metacharacters, exporting as a quoted literal"
                            );
                        } else {
                            debug!(name = %binding.name, pattern, "sanitized value");
                        }
                    }
                    debug!(name = %binding.name, source = %pair.source, "exported");
                    file.stats.exported += 1;
                    bindings.insert(binding);
                }
                Err(Reject::Filtered) => {
                    file.stats.filtered += 1;
                    debug!(key = %pair.key, source = %pair.source, "filtered out");
                }
                Err(reject) => {
                    file.stats.skipped += 1;
                    self.decision(format_args!(
                        "skipping {} ({}): {}",
                        pair.key, pair.source, reject
                    ));
                }
            }
        }
        file.stage = Stage::Exported;

        self.decision(format_args!(
            "{}: {} lines read, {} exported, {} skipped, {} filtered",
            path.display(),
            file.stats.lines_read,
            file.stats.exported,
            file.stats.skipped,
            file.stats.filtered
        ));
        file.stage = Stage::Done;

        Ok(())
    }

    /// Decisions are reported at info level in verbose mode, debug otherwise.
    fn decision(&self, message: std::fmt::Arguments<'_>) {
        if self.config.verbose {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }
}

/// Whether `path` contains a `..` segment.
pub fn has_traversal(path: &Path) -> bool {
    path.components().any(|c| c == Component::ParentDir)
}
