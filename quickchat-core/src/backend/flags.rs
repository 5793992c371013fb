//! Local durable boolean flags (the "signed in" marker)

use super::error::{BackendError, BackendResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Small key/value store for boolean preferences kept on the device
///
/// Not a source of truth for identity; only used to skip the registration
/// flow on the next launch.
pub trait FlagStore: Send + Sync {
    fn set_flag(&self, name: &str, value: bool) -> BackendResult<()>;

    /// Unknown flags read as `false`
    fn get_flag(&self, name: &str) -> bool;
}

/// Process-local flag store
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    flags: Mutex<HashMap<String, bool>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn set_flag(&self, name: &str, value: bool) -> BackendResult<()> {
        let mut flags = self
            .flags
            .lock()
            .map_err(|_| BackendError::Unavailable("flag store lock poisoned".to_string()))?;
        flags.insert(name.to_string(), value);
        Ok(())
    }

    fn get_flag(&self, name: &str) -> bool {
        self.flags
            .lock()
            .map(|flags| flags.get(name).copied().unwrap_or(false))
            .unwrap_or(false)
    }
}

/// Flag store persisted as a JSON object in a single file
///
/// Every write rewrites the file, so flags survive restarts.
#[derive(Debug)]
pub struct FileFlagStore {
    path: PathBuf,
    flags: Mutex<HashMap<String, bool>>,
}

impl FileFlagStore {
    /// Open (or lazily create) the flag file at `path`
    ///
    /// A missing or unreadable file starts out empty.
    pub fn open(path: impl Into<PathBuf>) -> BackendResult<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|e| {
                    BackendError::Unavailable(format!("cannot create {}: {}", dir.display(), e))
                })?;
            }
        }

        let flags = Self::load(&path);
        debug!(path = %path.display(), count = flags.len(), "Opened flag store");

        Ok(Self {
            path,
            flags: Mutex::new(flags),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> HashMap<String, bool> {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt flag file");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }
}

impl FlagStore for FileFlagStore {
    fn set_flag(&self, name: &str, value: bool) -> BackendResult<()> {
        let mut flags = self
            .flags
            .lock()
            .map_err(|_| BackendError::Unavailable("flag store lock poisoned".to_string()))?;

        // Only commit what reached the file
        let mut updated = flags.clone();
        updated.insert(name.to_string(), value);
        let contents = serde_json::to_string_pretty(&updated)?;
        fs::write(&self.path, contents).map_err(|e| {
            BackendError::Unavailable(format!("cannot write {}: {}", self.path.display(), e))
        })?;

        *flags = updated;
        Ok(())
    }

    fn get_flag(&self, name: &str) -> bool {
        self.flags
            .lock()
            .map(|flags| flags.get(name).copied().unwrap_or(false))
            .unwrap_or(false)
    }
}
