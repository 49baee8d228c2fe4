use crate::decrypt::{Decryptor, PlainDecryptor, SopsDecryptor};
use crate::export::MemoryEnv;
use crate::pipeline::{FileOutcome, Pipeline, RunReport, RunStats};
use crate::render;
use crate::{Config, KeyTransform};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use colored::Colorize;
use std::env;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Main CLI structure for the sopsenv application.
#[derive(Parser)]
#[command(name = "sopsenv")]
#[command(about = "Load sops-encrypted secrets into your development shell", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    options: RunOptions,
    /// The subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand. Each one overrides the matching
/// configuration file setting.
#[derive(Args)]
struct RunOptions {
    /// Configuration file (defaults to ./sopsenv.toml, then the user config)
    #[arg(short, long, global = true, env = "SOPSENV_CONFIG")]
    config: Option<PathBuf>,
    /// Encrypted file to load; repeatable. Replaces the configured file list.
    #[arg(short, long = "file", global = true)]
    files: Vec<PathBuf>,
    /// sops binary to decrypt with
    #[arg(long, global = true, env = "SOPSENV_SOPS_BIN", default_value = "sops")]
    sops_bin: PathBuf,
    /// Read files as-is instead of decrypting them
    #[arg(long, global = true)]
    plaintext: bool,
    /// Report every decision on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Abort on the first file that fails
    #[arg(long, global = true)]
    fail_on_error: bool,
    /// Let secrets replace variables that are already set
    #[arg(long, global = true)]
    allow_overwrite: bool,
    /// Prefix for every exported name
    #[arg(long, global = true)]
    prefix: Option<String>,
    /// Case transform for exported names (none, uppercase, lowercase)
    #[arg(long, global = true)]
    key_transform: Option<KeyTransform>,
    /// Largest accepted encrypted file in bytes; 0 disables the limit
    #[arg(long, global = true)]
    max_file_size: Option<u64>,
}

/// Available commands for the sopsenv CLI.
#[derive(Subcommand)]
enum Commands {
    /// Print export statements, for `eval "$(sopsenv hook)"` in a shell hook
    Hook,
    /// Write the secrets to a dotenv file
    Export {
        /// Destination file
        #[arg(short, long, default_value = ".env")]
        output: PathBuf,
    },
    /// Run a command with the secrets in its environment
    Run {
        /// Command and arguments to run
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Report which files load and which names they export, without values
    Check,
}

impl RunOptions {
    /// Load the configuration file, then apply command line overrides.
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::try_from(path.as_path())
                .wrap_err_with(|| format!("Failed to load {}", path.display()))?,
            None => {
                let cwd = env::current_dir()?;
                Config::discover(&cwd)
                    .wrap_err("Failed to load sopsenv configuration")?
                    .unwrap_or_default()
            }
        };

        if !self.files.is_empty() {
            config.sops_files = self.files.clone();
            config.file_configs.clear();
        }
        if self.verbose {
            config.verbose = true;
        }
        if self.fail_on_error {
            config.fail_on_error = true;
        }
        if self.allow_overwrite {
            config.allow_overwrite = true;
        }
        if let Some(prefix) = &self.prefix {
            config.global_prefix = prefix.clone();
        }
        if let Some(transform) = self.key_transform {
            config.key_transform = transform;
        }
        if let Some(limit) = self.max_file_size {
            config.max_file_size = limit;
        }

        config.validate().wrap_err("Invalid configuration")?;
        Ok(config)
    }

    fn decryptor(&self) -> Box<dyn Decryptor> {
        if self.plaintext {
            Box::new(PlainDecryptor)
        } else {
            Box::new(SopsDecryptor::with_program(&self.sops_bin))
        }
    }
}

/// Diagnostics go to stderr so stdout stays clean for `hook` output.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "sopsenv=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .init();
}

/// Run the pipeline against a snapshot of this process's environment.
fn load(config: &Config, decryptor: &dyn Decryptor) -> Result<RunReport> {
    let mut env = MemoryEnv::from_process();
    Pipeline::new(config, decryptor)
        .run(&mut env)
        .wrap_err("Failed to load secrets")
}

/// Per-file counters for `check` output.
fn file_summary(stats: &RunStats) -> String {
    format!(
        "{} lines read, {} exported, {} skipped, {} filtered, {} sanitized",
        stats.lines_read, stats.exported, stats.skipped, stats.filtered, stats.sanitized
    )
}

fn print_check(config: &Config, decryptor: &dyn Decryptor, report: &RunReport) {
    let files = config.file_specs();
    if files.is_empty() {
        println!(
            "No files configured. Add sops_files to sopsenv.toml or pass --file <path>."
        );
        return;
    }

    println!(
        "Checking {} file(s) using {}...\n",
        files.len().to_string().bold(),
        decryptor.name().blue()
    );

    for file in &report.files {
        let path = file.spec.path.display().to_string();
        match &file.outcome {
            FileOutcome::Done => println!(
                "{} {} ({}) - {}",
                "✓".green(),
                path,
                file.spec.format,
                file_summary(&file.stats)
            ),
            FileOutcome::SkippedOptional => println!(
                "{} {} - {}",
                "○".blue(),
                path,
                "(optional, not found)".blue()
            ),
            FileOutcome::Aborted(err) => println!(
                "{} {} - {} {}",
                "✗".red(),
                path,
                err.kind().red(),
                format!("({})", err).red()
            ),
        }
    }

    if !report.bindings.is_empty() {
        println!();
        for binding in &report.bindings {
            if binding.sanitized {
                println!(
                    "  {} {}",
                    binding.name,
                    "(contains shell metacharacters)".yellow()
                );
            } else {
                println!("  {}", binding.name);
            }
        }
    }

    let totals = report.totals();
    println!(
        "\nSummary: {} exported, {} skipped, {} filtered, {} sanitized, {} failed",
        totals.exported.to_string().green(),
        totals.skipped.to_string().yellow(),
        totals.filtered.to_string().blue(),
        totals.sanitized.to_string().yellow(),
        report.aborted().count().to_string().red()
    );
}

/// Main entry point for the sopsenv CLI application.
///
/// Exits non-zero only when a file fails with `fail_on_error` set, or when
/// the configuration cannot be loaded.
pub fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = cli.options.load_config()?;
    init_tracing(config.verbose);
    let decryptor = cli.options.decryptor();

    match cli.command {
        // Print shell code that exports the secrets
        Commands::Hook => {
            let report = load(&config, decryptor.as_ref())?;
            print!("{}", render::render_shell(&report.bindings));
            Ok(())
        }
        // Write the secrets to a dotenv file
        Commands::Export { output } => {
            let report = load(&config, decryptor.as_ref())?;
            render::write_dotenv(&output, &report.bindings)
                .wrap_err_with(|| format!("Failed to write {}", output.display()))?;
            eprintln!(
                "{} Wrote {} secrets to {}",
                "✓".green(),
                report.bindings.len(),
                output.display()
            );
            Ok(())
        }
        // Execute a command with the secrets injected as environment variables
        Commands::Run { command } => {
            let (program, args) = command
                .split_first()
                .ok_or_else(|| eyre!("No command specified. Usage: sopsenv run -- <command> [args...]"))?;
            let report = load(&config, decryptor.as_ref())?;

            let status = Command::new(program)
                .args(args)
                .envs(report.bindings.iter().map(|b| (&b.name, &b.value)))
                .status()
                .wrap_err_with(|| format!("Failed to run {}", program))?;
            std::process::exit(status.code().unwrap_or(1));
        }
        // Report what would be exported
        Commands::Check => {
            let report = load(&config, decryptor.as_ref())?;
            print_check(&config, decryptor.as_ref(), &report);
            Ok(())
        }
    }
}
