//! On-disk JSON artifacts: stored credentials, raw fetch snapshots, and the
//! canonical library file. Everything lives flat in one data directory
//! (PSN_DATA_DIR, defaulting to the working directory) so a sync run leaves a
//! complete, inspectable paper trail next to the final library.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::library::CanonicalEntry;
use psn_client::Tokens;

pub const CONFIG_FILE: &str = "psn_config.json";
pub const PURCHASED_RAW_FILE: &str = "get_purchased_raw.json";
pub const TITLES_RAW_FILE: &str = "get_user_titles_raw.json";
pub const PLAYED_RAW_FILE: &str = "get_user_played_raw.json";
pub const PLAYED_DISTILLED_FILE: &str = "get_user_played.json";
pub const LIBRARY_FILE: &str = "full_library.json";

/// Persisted credentials: the online id plus the current token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConfig {
    pub username: String,
    pub tokens: Tokens,
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        Self::new(crate::util::env::data_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating data directory {}", self.root.display()))
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        self.ensure_root()?;
        let path = self.path(name);
        let body = serde_json::to_string_pretty(value)?;
        fs::write(&path, body).with_context(|| format!("writing {}", path.display()))
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        let body =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&body).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    pub fn modified(&self, name: &str) -> Option<SystemTime> {
        fs::metadata(self.path(name)).and_then(|m| m.modified()).ok()
    }

    /// Load stored credentials. Absent or unreadable config reads as `None`
    /// so callers can prompt for a fresh login instead of crashing.
    pub fn load_config(&self) -> Result<Option<StoredConfig>> {
        let path = self.path(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let body =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str(&body) {
            Ok(cfg) => Ok(Some(cfg)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "config file unreadable, ignoring");
                Ok(None)
            }
        }
    }

    pub fn save_config(&self, cfg: &StoredConfig) -> Result<()> {
        self.write_json(CONFIG_FILE, cfg)
    }

    /// Drop any previous purchased snapshot before a fresh paginated fetch.
    pub fn reset_purchased_pages(&self) -> Result<()> {
        let path = self.path(PURCHASED_RAW_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("removing {}", path.display()))
            }
        }
    }

    /// Append one fetched page to the purchased snapshot (read-concat-write).
    /// An unreadable existing snapshot is overwritten with a warning.
    pub fn append_purchased_page(&self, page: &[Value]) -> Result<()> {
        let mut current: Vec<Value> = if self.exists(PURCHASED_RAW_FILE) {
            match self.read_json(PURCHASED_RAW_FILE) {
                Ok(v) => v,
                Err(err) => {
                    warn!(error = %err, "existing purchased snapshot unreadable, overwriting");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        current.extend(page.iter().cloned());
        self.write_json(PURCHASED_RAW_FILE, &current)
    }

    pub fn load_purchased_pages(&self) -> Result<Vec<Value>> {
        self.read_json(PURCHASED_RAW_FILE)
    }

    pub fn save_library(&self, entries: &[CanonicalEntry]) -> Result<()> {
        self.write_json(LIBRARY_FILE, &entries)
    }

    pub fn load_library(&self) -> Result<Vec<CanonicalEntry>> {
        self.read_json(LIBRARY_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch(tag: &str) -> Storage {
        let dir = std::env::temp_dir().join(format!(
            "psn_librarian_{}_{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        Storage::new(dir)
    }

    #[test]
    fn config_round_trips() {
        let storage = scratch("config");
        assert!(storage.load_config().unwrap().is_none());

        let cfg = StoredConfig {
            username: "gamer".into(),
            tokens: Tokens {
                access_token: "at".into(),
                refresh_token: Some("rt".into()),
                expires_in: Some(3600),
                refresh_token_expires_in: Some(86_400),
                last_fetched: Some(1_000),
            },
        };
        storage.save_config(&cfg).unwrap();

        let loaded = storage.load_config().unwrap().unwrap();
        assert_eq!(loaded.username, "gamer");
        assert_eq!(loaded.tokens.access_token, "at");
    }

    #[test]
    fn unreadable_config_reads_as_none() {
        let storage = scratch("badconfig");
        fs::create_dir_all(storage.root()).unwrap();
        fs::write(storage.root().join(CONFIG_FILE), "{ not json").unwrap();
        assert!(storage.load_config().unwrap().is_none());
    }

    #[test]
    fn purchased_pages_accumulate_across_appends() {
        let storage = scratch("pages");
        storage.reset_purchased_pages().unwrap();
        storage
            .append_purchased_page(&[json!({ "titleId": "T1" }), json!({ "titleId": "T2" })])
            .unwrap();
        storage
            .append_purchased_page(&[json!({ "titleId": "T3" })])
            .unwrap();

        let pages = storage.load_purchased_pages().unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2]["titleId"], "T3");

        storage.reset_purchased_pages().unwrap();
        assert!(!storage.exists(PURCHASED_RAW_FILE));
    }

    #[test]
    fn library_round_trips_in_order() {
        let storage = scratch("library");
        let mut a = CanonicalEntry {
            title_id: Some("T1".into()),
            name: Some("Game A".into()),
            ..Default::default()
        };
        a.refresh_derived();
        let mut b = CanonicalEntry {
            title_id: Some("T2".into()),
            name: Some("Game B".into()),
            ..Default::default()
        };
        b.refresh_derived();

        storage.save_library(&[a, b]).unwrap();
        let loaded = storage.load_library().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].title_id.as_deref(), Some("T1"));
        assert_eq!(loaded[1].title_id.as_deref(), Some("T2"));
    }
}
