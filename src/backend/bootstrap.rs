//! Workspace bootstrap run before each request.
//!
//! Only missing artifacts are created; existing files are never touched.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Directory the CLI reads project settings and hooks from.
pub const CLAUDE_DIR: &str = ".claude";
/// Project-local settings file, relative to [`CLAUDE_DIR`].
pub const SETTINGS_FILE: &str = "settings.local.json";
/// Hook script directory, relative to [`CLAUDE_DIR`].
pub const HOOKS_DIR: &str = "hooks";

/// What [`ensure_workspace`] had to create.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub created: Vec<PathBuf>,
}

/// Make sure `dir` has the settings file and hook directory the CLI expects.
///
/// # Errors
///
/// Returns the first filesystem error. The caller decides whether that
/// matters; the driver only logs it.
pub fn ensure_workspace(dir: &Path) -> io::Result<BootstrapReport> {
    let mut report = BootstrapReport::default();
    let claude_dir = dir.join(CLAUDE_DIR);

    let hooks = claude_dir.join(HOOKS_DIR);
    if !hooks.is_dir() {
        fs::create_dir_all(&hooks)?;
        report.created.push(hooks);
    }

    let settings = claude_dir.join(SETTINGS_FILE);
    match OpenOptions::new().write(true).create_new(true).open(&settings) {
        Ok(mut file) => {
            let body = serde_json::to_string_pretty(&serde_json::json!({}))
                .map_err(io::Error::other)?;
            writeln!(file, "{body}")?;
            report.created.push(settings);
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let report = ensure_workspace(dir.path()).unwrap();

        assert_eq!(report.created.len(), 2);
        assert!(dir.path().join(".claude/hooks").is_dir());
        let settings = fs::read_to_string(dir.path().join(".claude/settings.local.json")).unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&settings).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn is_idempotent_and_preserves_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".claude")).unwrap();
        fs::write(
            dir.path().join(".claude/settings.local.json"),
            r#"{"permissions": {"allow": ["Read"]}}"#,
        )
        .unwrap();

        let first = ensure_workspace(dir.path()).unwrap();
        assert_eq!(first.created, vec![dir.path().join(".claude/hooks")]);

        let second = ensure_workspace(dir.path()).unwrap();
        assert!(second.created.is_empty());

        let settings = fs::read_to_string(dir.path().join(".claude/settings.local.json")).unwrap();
        assert!(settings.contains("Read"));
    }

    #[test]
    fn reports_filesystem_errors() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the directory should be
        fs::write(dir.path().join(".claude"), "").unwrap();
        assert!(ensure_workspace(dir.path()).is_err());
    }
}
