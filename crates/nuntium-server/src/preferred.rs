//! Preferred bearer context per SIM identity.
//!
//! Kept as a JSON object `{identity: context-id}` in
//! `<cache-dir>/preferredContext`. Every update rewrites the whole file.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

const FILE_NAME: &str = "preferredContext";

#[derive(Debug)]
pub struct PreferredContexts {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PreferredContexts {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, identity: &str) -> Option<String> {
        let _guard = self.lock.lock().ok()?;
        match self.load() {
            Ok(map) => map.get(identity).cloned(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable preferred context file");
                None
            }
        }
    }

    /// Records `context_id` for `identity`; an empty id clears the entry.
    pub fn set(&self, identity: &str, context_id: &str) -> StoreResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::io(&self.path, ErrorKind::Other.into()))?;
        let mut map = self.load().unwrap_or_default();
        if context_id.is_empty() {
            map.remove(identity);
        } else {
            map.insert(identity.to_string(), context_id.to_string());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let temp_path = self.path.with_extension("tmp");
        let content = serde_json::to_vec_pretty(&map).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&temp_path, content).map_err(|e| StoreError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        debug!(identity, context = context_id, "Preferred context updated");
        Ok(())
    }

    fn load(&self) -> StoreResult<BTreeMap<String, String>> {
        match fs::read(&self.path) {
            Ok(content) => serde_json::from_slice(&content).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let dir = tempfile::tempdir().unwrap();
        let preferred = PreferredContexts::new(dir.path());
        assert_eq!(preferred.get("310150123456789"), None);

        preferred.set("310150123456789", "/ril_0/context2").unwrap();
        preferred.set("208011234567890", "/ril_1/context1").unwrap();
        assert_eq!(
            preferred.get("310150123456789").as_deref(),
            Some("/ril_0/context2")
        );

        let reopened = PreferredContexts::new(dir.path());
        assert_eq!(
            reopened.get("208011234567890").as_deref(),
            Some("/ril_1/context1")
        );

        reopened.set("310150123456789", "").unwrap();
        assert_eq!(preferred.get("310150123456789"), None);
    }

    #[test]
    fn corrupt_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(FILE_NAME), b"not json").unwrap();
        let preferred = PreferredContexts::new(dir.path());
        assert_eq!(preferred.get("1"), None);
        preferred.set("1", "/ril_0/context1").unwrap();
        assert_eq!(preferred.get("1").as_deref(), Some("/ril_0/context1"));
    }
}
