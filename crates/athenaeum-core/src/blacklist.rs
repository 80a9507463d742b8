//! Blacklist (auxiliary to C8): blocked file hashes and responder pubkeys,
//! backed by a plain-text file, one `kind:value` entry per line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

const HASH_PREFIX: &str = "hash:";
const PUBKEY_PREFIX: &str = "pubkey:";

#[derive(Debug, Default, Clone)]
pub struct Blacklist {
    path: Option<PathBuf>,
    file_hashes: HashSet<String>,
    pubkeys: HashSet<String>,
}

impl Blacklist {
    pub fn load(path: &Path) -> Result<Self> {
        let mut list = Self {
            path: Some(path.to_path_buf()),
            file_hashes: HashSet::new(),
            pubkeys: HashSet::new(),
        };
        if !path.exists() {
            return Ok(list);
        }
        let contents = std::fs::read_to_string(path)?;
        for line in contents.lines() {
            let line = line.trim();
            if let Some(hash) = line.strip_prefix(HASH_PREFIX) {
                list.file_hashes.insert(hash.to_string());
            } else if let Some(pubkey) = line.strip_prefix(PUBKEY_PREFIX) {
                list.pubkeys.insert(pubkey.to_string());
            }
        }
        Ok(list)
    }

    pub fn block_hash(&mut self, hash: &str) -> Result<()> {
        self.file_hashes.insert(hash.to_string());
        self.persist()
    }

    pub fn block_pubkey(&mut self, pubkey: &str) -> Result<()> {
        self.pubkeys.insert(pubkey.to_string());
        self.persist()
    }

    pub fn is_hash_blocked(&self, hash: &str) -> bool {
        self.file_hashes.contains(hash)
    }

    pub fn is_pubkey_blocked(&self, pubkey: &str) -> bool {
        self.pubkeys.contains(pubkey)
    }

    pub fn blocked_hashes(&self) -> Vec<String> {
        self.file_hashes.iter().cloned().collect()
    }

    pub fn blocked_pubkeys(&self) -> Vec<String> {
        self.pubkeys.iter().cloned().collect()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut lines: Vec<String> = self
            .file_hashes
            .iter()
            .map(|h| format!("{HASH_PREFIX}{h}"))
            .chain(self.pubkeys.iter().map(|p| format!("{PUBKEY_PREFIX}{p}")))
            .collect();
        lines.sort();
        std::fs::write(path, lines.join("\n"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_nonexistent_file_returns_empty_lists() {
        let list = Blacklist::load(Path::new("/tmp/nonexistent_athenaeum_blacklist.txt")).unwrap();
        assert!(!list.is_hash_blocked("anything"));
    }

    #[test]
    fn block_and_reload_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blacklist.txt");

        let mut list = Blacklist::load(&path).unwrap();
        list.block_hash("0123456789abcdef").unwrap();
        list.block_pubkey("badactor").unwrap();

        let reloaded = Blacklist::load(&path).unwrap();
        assert!(reloaded.is_hash_blocked("0123456789abcdef"));
        assert!(reloaded.is_pubkey_blocked("badactor"));
        assert!(!reloaded.is_hash_blocked("other"));
    }
}
