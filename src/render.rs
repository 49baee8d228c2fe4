//! Rendering bindings for consumers outside this process.

use crate::Result;
use crate::cleanup;
use crate::export::BindingSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Quote `value` as a single POSIX shell word that expands to itself.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `export NAME='value'` lines for `eval "$(sopsenv hook)"` in a shell hook.
///
/// Every value is single-quoted, so no value can trigger expansion or
/// command substitution when the output is evaluated.
pub fn render_shell(bindings: &BindingSet) -> String {
    let mut output = String::new();
    for binding in bindings {
        output.push_str(&format!(
            "export {}={}\n",
            binding.name,
            shell_quote(&binding.value)
        ));
    }
    output
}

/// `NAME="value"` lines readable by dotenv loaders.
///
/// Backslashes, double quotes and `$` are escaped, and newlines are written
/// as `\n`, so loaders that interpolate variables read the literal value.
pub fn render_dotenv(bindings: &BindingSet) -> String {
    let mut output = String::new();
    for binding in bindings {
        let mut escaped = String::with_capacity(binding.value.len());
        for c in binding.value.chars() {
            match c {
                '\\' => escaped.push_str(r"\\"),
                '"' => escaped.push_str("\\\""),
                '$' => escaped.push_str("\\$"),
                '\n' => escaped.push_str(r"\n"),
                c => escaped.push(c),
            }
        }
        output.push_str(&format!("{}=\"{}\"\n", binding.name, escaped));
    }
    output
}

/// Write the dotenv rendering to `path`.
///
/// The file is written to a temporary file in the same directory and moved
/// into place, so readers never see a partial file. On Unix it is created
/// with mode 600. If the process is interrupted before the move, the
/// temporary file is deleted.
pub fn write_dotenv(path: &Path, bindings: &BindingSet) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    // NamedTempFile is created 0600 and removed on drop if never persisted;
    // tracking covers the signal case, where drop never runs
    let mut temp = NamedTempFile::new_in(dir)?;
    let _tracked = cleanup::track(temp.path());
    temp.write_all(render_dotenv(bindings).as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
