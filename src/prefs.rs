//! Local preference persistence
//!
//! A flat string key/value store for the admin token, the backend choice
//! and recent upload hashes.
//! Persistence is best-effort: read and write failures are logged and
//! otherwise ignored, so a broken preference file never blocks an action.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

/// String key/value storage for console preferences
pub trait PreferenceStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value
    fn set(&self, key: &str, value: &str);

    /// Remove a value
    fn remove(&self, key: &str);
}

/// In-memory store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().ok()?;
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}

/// JSON-file backed store
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePreferences {
    /// Use the given file; it is created on the first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `$HOME/.config/chatbot-admin/prefs.json`, if `HOME` is set
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("chatbot-admin")
                .join("prefs.json")
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read preferences");
                return HashMap::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "ignoring malformed preferences file");
            HashMap::new()
        })
    }

    fn store(&self, values: &HashMap<String, String>) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(values)?;
            std::fs::write(&self.path, json)
        };

        if let Err(e) = write() {
            warn!(path = %self.path.display(), error = %e, "could not write preferences");
        }
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) {
        let _guard = self.lock.lock();
        let mut values = self.load();
        f(&mut values);
        self.store(&values);
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        });
    }

    fn remove(&self, key: &str) {
        self.update(|values| {
            values.remove(key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_preferences() {
        let prefs = MemoryPreferences::new();
        assert_eq!(prefs.get("k"), None);
        prefs.set("k", "v");
        assert_eq!(prefs.get("k").as_deref(), Some("v"));
        prefs.remove("k");
        assert_eq!(prefs.get("k"), None);
    }

    #[test]
    fn test_file_preferences_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        let prefs = FilePreferences::new(&path);
        prefs.set("admin_ui_token", "secret");
        prefs.set("admin_ui_backend_base", "https://api.example.com");

        let reopened = FilePreferences::new(&path);
        assert_eq!(reopened.get("admin_ui_token").as_deref(), Some("secret"));
        reopened.remove("admin_ui_token");
        assert_eq!(prefs.get("admin_ui_token"), None);
        assert_eq!(
            prefs.get("admin_ui_backend_base").as_deref(),
            Some("https://api.example.com")
        );
    }

    #[test]
    fn test_malformed_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();

        let prefs = FilePreferences::new(&path);
        assert_eq!(prefs.get("anything"), None);
        prefs.set("k", "v");
        assert_eq!(prefs.get("k").as_deref(), Some("v"));
    }
}
