//! # Decryptors
//!
//! A [`Decryptor`] turns an encrypted file into [`Plaintext`]. The default
//! [`SopsDecryptor`] shells out to the `sops` CLI and captures its output in
//! memory; no decrypted copy is ever written to disk, and the in-memory copy
//! is zeroized when the [`Plaintext`] is dropped.

use crate::{Result, SopsEnvError};
use secrecy::zeroize::Zeroize;
use secrecy::{ExposeSecret, SecretString};
use sopsenv_core::Format;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Decrypted file content. Redacted in `Debug` output.
#[derive(Debug)]
pub struct Plaintext(SecretString);

impl Plaintext {
    pub fn new(text: String) -> Self {
        Self(SecretString::new(text.into_boxed_str()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Source of decrypted content for an encrypted file.
///
/// Implementations must be deterministic: the same file content yields the
/// same plaintext, and failure is reported as an error rather than through
/// the output.
pub trait Decryptor {
    fn decrypt(&self, path: &Path, format: &Format) -> Result<Plaintext>;

    /// Returns the name of this decryptor for display purposes
    fn name(&self) -> &'static str;
}

/// Decrypts with `sops --decrypt`.
///
/// Requirements: `sops` must be on `PATH` (or configured with
/// [`SopsDecryptor::with_program`]) and have access to the file's keys
/// (age identity, GPG agent, or cloud KMS credentials).
pub struct SopsDecryptor {
    program: PathBuf,
}

impl SopsDecryptor {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("sops"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The `--input-type` sops expects for a format, if it has one.
    fn input_type(format: &Format) -> Option<&'static str> {
        match format {
            Format::Dotenv => Some("dotenv"),
            Format::Json => Some("json"),
            Format::Yaml => Some("yaml"),
            Format::Ini => Some("ini"),
            Format::Unsupported(_) => None,
        }
    }
}

impl Default for SopsDecryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decryptor for SopsDecryptor {
    fn decrypt(&self, path: &Path, format: &Format) -> Result<Plaintext> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--decrypt");
        if let Some(kind) = Self::input_type(format) {
            cmd.args(["--input-type", kind, "--output-type", kind]);
        }
        cmd.arg(path);

        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SopsEnvError::MissingDependency(format!(
                    "sops ({}) is not installed.\n\nTo install it:\n  - macOS: brew install sops\n  - NixOS: add pkgs.sops to your shell's packages\n  - Other: https://github.com/getsops/sops/releases",
                    self.program.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let mut stdout = output.stdout;
            stdout.zeroize();
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SopsEnvError::DecryptionFailed {
                path: path.to_path_buf(),
                reason: match stderr.trim() {
                    "" => format!("sops exited with {}", output.status),
                    message => message.to_string(),
                },
            });
        }

        match String::from_utf8(output.stdout) {
            Ok(text) => Ok(Plaintext::new(text)),
            Err(err) => {
                let mut bytes = err.into_bytes();
                bytes.zeroize();
                Err(SopsEnvError::DecryptionFailed {
                    path: path.to_path_buf(),
                    reason: "decrypted content is not valid UTF-8".to_string(),
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "sops"
    }
}

/// Reads files as-is. For unencrypted development files and tests.
pub struct PlainDecryptor;

impl Decryptor for PlainDecryptor {
    fn decrypt(&self, path: &Path, _format: &Format) -> Result<Plaintext> {
        fs::read_to_string(path)
            .map(Plaintext::new)
            .map_err(|e| SopsEnvError::DecryptionFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "plain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plaintext_debug_is_redacted() {
        let plaintext = Plaintext::new("API_KEY=hunter2".to_string());
        assert_eq!(plaintext.expose(), "API_KEY=hunter2");
        assert!(!format!("{:?}", plaintext).contains("hunter2"));
    }

    #[test]
    fn test_missing_sops_binary() {
        let temp_dir = TempDir::new().unwrap();
        let decryptor = SopsDecryptor::with_program(temp_dir.path().join("no-such-sops"));
        let result = decryptor.decrypt(Path::new("secrets.env"), &Format::Dotenv);
        match result {
            Err(SopsEnvError::MissingDependency(msg)) => assert!(msg.contains("not installed")),
            Err(e) => panic!("Expected MissingDependency, got {}", e),
            Ok(_) => panic!("Expected MissingDependency"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_sops_is_decryption_failed() {
        // `false` ignores its arguments and exits 1
        let decryptor = SopsDecryptor::with_program("false");
        let result = decryptor.decrypt(Path::new("secrets.env"), &Format::Dotenv);
        assert!(matches!(result, Err(SopsEnvError::DecryptionFailed { .. })));
    }

    /// Write an executable shell script standing in for sops.
    #[cfg(unix)]
    fn fake_sops(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-sops");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_sops_arguments_and_captured_output() {
        let temp_dir = TempDir::new().unwrap();
        let args_file = temp_dir.path().join("args");
        let program = fake_sops(
            temp_dir.path(),
            &format!(
                "echo \"$@\" > '{}'\nprintf 'A=1\\nB=two words\\n'",
                args_file.display()
            ),
        );
        let decryptor = SopsDecryptor::with_program(&program);

        let plaintext = decryptor
            .decrypt(Path::new("secrets/app.yaml"), &Format::Yaml)
            .unwrap();
        assert_eq!(plaintext.expose(), "A=1\nB=two words\n");
        assert_eq!(
            fs::read_to_string(&args_file).unwrap(),
            "--decrypt --input-type yaml --output-type yaml secrets/app.yaml\n"
        );

        decryptor
            .decrypt(Path::new("x.toml"), &Format::Unsupported("toml".into()))
            .unwrap();
        assert_eq!(
            fs::read_to_string(&args_file).unwrap(),
            "--decrypt x.toml\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_sops_stderr_becomes_reason() {
        let temp_dir = TempDir::new().unwrap();
        let program = fake_sops(
            temp_dir.path(),
            "printf 'A=partial'\necho 'no matching age key' >&2\nexit 128",
        );
        let decryptor = SopsDecryptor::with_program(&program);

        match decryptor.decrypt(Path::new("a.env"), &Format::Dotenv) {
            Err(SopsEnvError::DecryptionFailed { path, reason }) => {
                assert_eq!(path, PathBuf::from("a.env"));
                assert_eq!(reason, "no matching age key");
            }
            Err(e) => panic!("Expected DecryptionFailed, got {}", e),
            Ok(_) => panic!("Expected DecryptionFailed"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_output_is_decryption_failed() {
        let temp_dir = TempDir::new().unwrap();
        let program = fake_sops(temp_dir.path(), "printf '\\377\\376'");
        let decryptor = SopsDecryptor::with_program(&program);

        match decryptor.decrypt(Path::new("a.env"), &Format::Dotenv) {
            Err(SopsEnvError::DecryptionFailed { reason, .. }) => {
                assert!(reason.contains("UTF-8"))
            }
            Err(e) => panic!("Expected DecryptionFailed, got {}", e),
            Ok(_) => panic!("Expected DecryptionFailed"),
        }
    }

    #[test]
    fn test_input_type_hint() {
        assert_eq!(SopsDecryptor::input_type(&Format::Yaml), Some("yaml"));
        assert_eq!(
            SopsDecryptor::input_type(&Format::Unsupported("toml".into())),
            None
        );
    }

    #[test]
    fn test_plain_decryptor_reads_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.env");
        fs::write(&path, "A=1\n").unwrap();

        let plaintext = PlainDecryptor.decrypt(&path, &Format::Dotenv).unwrap();
        assert_eq!(plaintext.expose(), "A=1\n");
    }
}
