use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use timewalk_types::Result;

const STORE_DIR: &str = "timewalk";
const STORE_FILE: &str = "credentials.json";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

/// File-backed store for the single Gemini API key, persisted across runs in
/// the user's config directory. No validation happens here: validity is only
/// ever decided by gateway call outcomes.
#[derive(Debug)]
pub struct ApiKeyStore {
    path: PathBuf,
    cached: Option<String>,
}

impl ApiKeyStore {
    pub fn open_default() -> Result<Self> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| timewalk_types::anyhow!("no user config directory available"))?;
        Ok(Self::open(base.join(STORE_DIR).join(STORE_FILE)))
    }

    /// Opens a store at an explicit path. An unreadable or malformed file
    /// degrades to "absent".
    pub fn open(path: PathBuf) -> Self {
        let cached = Self::load(&path);
        ApiKeyStore { path, cached }
    }

    fn load(path: &Path) -> Option<String> {
        let raw = fs::read_to_string(path).ok()?;
        match timewalk_types::json::from_str::<StoredCredentials>(&raw) {
            Ok(stored) => stored.api_key,
            Err(err) => {
                tracing::warn!(%err, path = %path.display(), "unreadable credential store, treating as absent");
                None
            }
        }
    }

    pub fn get(&self) -> Option<String> {
        self.cached.clone()
    }

    pub fn set(&mut self, value: &str) {
        self.cached = Some(value.trim().to_string());
        self.persist();
    }

    pub fn clear(&mut self) {
        self.cached = None;
        self.persist();
    }

    fn persist(&self) {
        let stored = StoredCredentials {
            api_key: self.cached.clone(),
        };
        let write = || -> Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&self.path, timewalk_types::json::to_vec_pretty(&stored)?)?;
            Ok(())
        };
        if let Err(err) = write() {
            tracing::error!(%err, path = %self.path.display(), "failed to persist credential store");
        }
    }
}
