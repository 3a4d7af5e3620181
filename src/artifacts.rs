use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::DebugConfig;

/// Optional sink for JSON debug artifacts (low-confidence matches, raw
/// query results). Writing never fails the caller: errors are logged.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSink {
    dir: Option<PathBuf>,
}

impl ArtifactSink {
    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// A sink writing under `dir/<YYYY-MM-DD>/`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()) }
    }

    pub fn from_config(config: &DebugConfig) -> Self {
        if config.enabled {
            Self::new(config.resolve_dir())
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Write `value` as pretty JSON to `<dir>/<today>/<name>.json`.
    /// Returns the path written, or `None` when disabled or on failure.
    pub fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let day = chrono::Local::now().format("%Y-%m-%d").to_string();
        let path = dir.join(day).join(format!("{}.json", sanitize_file_name(name)));

        match write_json(&path, value) {
            Ok(()) => {
                log::debug!("Saved debug artifact {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::warn!("Failed to write debug artifact {}: {e}", path.display());
                None
            }
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
}

/// Replace characters that are awkward in file names.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
