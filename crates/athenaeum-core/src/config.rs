use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hash::content_hash_hex;

/// Book rename policy applied when placing a file under `books_dir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenamePolicy {
    /// Keep the filename the ingest source provided.
    #[default]
    No,
    /// `<author>-<title>.<ext>`.
    Autit,
    /// `<file_hash>.<ext>`.
    Hash,
}

/// Root application configuration, loaded from the app-directory config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub books_dir: String,
    pub rename_book: RenamePolicy,
    pub pagination_threshold: usize,
    pub password_hash: String,
    pub nostr_relays: Vec<String>,
    pub nostr_privkey: Option<String>,
    pub local_ipfs_api: String,
    pub ipfs_gateway: String,
    pub remove_from_ipfs_on_delete: bool,
    pub catalog_title: String,
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            books_dir: "./books".to_string(),
            rename_book: RenamePolicy::No,
            pagination_threshold: 60,
            password_hash: String::new(),
            nostr_relays: vec!["wss://relay.primal.net".to_string()],
            nostr_privkey: None,
            local_ipfs_api: "http://127.0.0.1:5001".to_string(),
            ipfs_gateway: "http://127.0.0.1:8080".to_string(),
            remove_from_ipfs_on_delete: false,
            catalog_title: "Athenaeum".to_string(),
            debug: false,
        }
    }
}

impl AppConfig {
    /// Standard config file path: `<app-dir>/athenaeum.conf`.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("ATHENAEUM_CONFIG") {
            return PathBuf::from(path);
        }
        Self::app_dir().join("athenaeum.conf")
    }

    /// Directory the executable lives beside; every ambient file (db, log,
    /// blacklist, config) is resolved relative to it unless overridden.
    pub fn app_dir() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn books_dir(&self) -> PathBuf {
        Self::app_dir().join(&self.books_dir)
    }

    pub fn covers_dir(&self) -> PathBuf {
        Self::app_dir().join("covers")
    }

    pub fn notes_dir(&self) -> PathBuf {
        Self::app_dir().join("notes")
    }

    pub fn database_path(&self) -> PathBuf {
        Self::app_dir().join("athenaeum.db")
    }

    pub fn blacklist_path(&self) -> PathBuf {
        Self::app_dir().join("blacklist.txt")
    }

    pub fn log_path(&self) -> PathBuf {
        Self::app_dir().join("athenaeum.log")
    }

    /// Set the stored credential from a raw admin password using the same
    /// 64-bit content hash routine used for file fingerprinting (documented
    /// upgrade seam; the stored/compared value remains the 64-bit digest for
    /// wire/cookie compatibility).
    pub fn set_password(&mut self, raw: &str) {
        self.password_hash = content_hash_hex(raw.as_bytes());
    }

    pub fn check_password(&self, raw: &str) -> bool {
        !self.password_hash.is_empty() && content_hash_hex(raw.as_bytes()) == self.password_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.pagination_threshold, 60);
        assert_eq!(cfg.rename_book, RenamePolicy::No);
    }

    #[test]
    fn config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("athenaeum.conf");

        let mut cfg = AppConfig::default();
        cfg.catalog_title = "My Library".to_string();
        cfg.rename_book = RenamePolicy::Hash;
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.catalog_title, "My Library");
        assert_eq!(loaded.rename_book, RenamePolicy::Hash);
    }

    #[test]
    fn load_nonexistent_returns_default() {
        let cfg = AppConfig::load_from(Path::new("/tmp/nonexistent_athenaeum_config.toml")).unwrap();
        assert_eq!(cfg.pagination_threshold, 60);
    }

    #[test]
    fn password_set_and_check_roundtrip() {
        let mut cfg = AppConfig::default();
        cfg.set_password("hunter2");
        assert!(cfg.check_password("hunter2"));
        assert!(!cfg.check_password("wrong"));
    }
}
