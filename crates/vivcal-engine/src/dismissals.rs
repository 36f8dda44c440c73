//! Best-effort persistence of small JSON state files.
//!
//! Losing these files costs the user one repeated reminder or one stale push
//! channel, so read and write failures are logged and otherwise ignored.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A JSON file holding one value of type `T`.
#[derive(Debug, Clone)]
pub struct JsonFile<T> {
    path: Option<PathBuf>,
    _value: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonFile<T> {
    /// `None` keeps nothing on disk.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Option<T> {
        let path = self.path.as_ref()?;
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read state file");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed state file");
                None
            }
        }
    }

    pub fn save(&self, value: &T) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        let result = serde_json::to_string_pretty(value)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, json)
            });
        match result {
            Ok(()) => debug!(path = %path.display(), "saved state file"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to save state file"),
        }
    }

    pub fn remove(&self) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        if let Err(e) = fs::remove_file(path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "failed to remove state file");
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DismissalRecord {
    last_dismissed: Option<String>,
}

/// The identifier of the last dismissed event.
#[derive(Debug)]
pub struct DismissalStore {
    file: JsonFile<DismissalRecord>,
    last_dismissed: Option<String>,
}

impl DismissalStore {
    /// Opens the store, reading any previously saved dismissal.
    pub fn open(path: Option<PathBuf>) -> Self {
        let file = JsonFile::new(path);
        let last_dismissed = file.load().and_then(|r: DismissalRecord| r.last_dismissed);
        Self {
            file,
            last_dismissed,
        }
    }

    pub fn in_memory() -> Self {
        Self::open(None)
    }

    pub fn last_dismissed(&self) -> Option<&str> {
        self.last_dismissed.as_deref()
    }

    pub fn is_dismissed(&self, event_id: &str) -> bool {
        self.last_dismissed.as_deref() == Some(event_id)
    }

    /// Records `event_id`, replacing any earlier dismissal.
    pub fn dismiss(&mut self, event_id: impl Into<String>) {
        self.last_dismissed = Some(event_id.into());
        self.file.save(&DismissalRecord {
            last_dismissed: self.last_dismissed.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("dismissed.json");

        let mut store = DismissalStore::open(Some(path.clone()));
        assert_eq!(store.last_dismissed(), None);
        store.dismiss("evt-1");
        store.dismiss("evt-2");

        let reopened = DismissalStore::open(Some(path));
        assert!(reopened.is_dismissed("evt-2"));
        assert!(!reopened.is_dismissed("evt-1"));
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dismissed.json");
        fs::write(&path, "{not json").unwrap();

        let store = DismissalStore::open(Some(path));
        assert_eq!(store.last_dismissed(), None);
    }

    #[test]
    fn unwritable_path_keeps_memory_state() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        let mut store = DismissalStore::open(Some(blocker.join("dismissed.json")));
        store.dismiss("evt-1");
        assert!(store.is_dismissed("evt-1"));
    }

    #[test]
    fn json_file_remove() {
        let dir = TempDir::new().unwrap();
        let file: JsonFile<Vec<u32>> = JsonFile::new(Some(dir.path().join("v.json")));
        file.save(&vec![1, 2]);
        assert_eq!(file.load(), Some(vec![1, 2]));
        file.remove();
        assert_eq!(file.load(), None);
        file.remove();
    }
}
