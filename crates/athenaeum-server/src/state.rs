use std::path::PathBuf;
use std::sync::RwLock;

use athenaeum_core::{AppConfig, Blacklist, ConnectionPool, Progress};
use athenaeum_ipfs::SyncIpfsPinner;
use tokio::sync::Mutex as AsyncMutex;

/// Everything a handler needs: the shared database, filesystem roots,
/// config, and the single in-flight revision's progress snapshot.
pub struct AppState {
    pub pool: ConnectionPool,
    pub config: RwLock<AppConfig>,
    pub blacklist: RwLock<Blacklist>,
    pub books_dir: PathBuf,
    pub covers_dir: PathBuf,
    pub notes_dir: PathBuf,
    pub ipfs: Option<SyncIpfsPinner>,
    pub progress: RwLock<Progress>,
    /// Serializes revision runs: only one may be in flight at a time.
    pub revision_lock: AsyncMutex<()>,
}

impl AppState {
    pub fn new(
        pool: ConnectionPool,
        config: AppConfig,
        blacklist: Blacklist,
        app_root: &std::path::Path,
        ipfs: Option<SyncIpfsPinner>,
    ) -> Self {
        let books_dir = app_root.join(&config.books_dir);
        Self {
            covers_dir: app_root.join("covers"),
            notes_dir: app_root.join("notes"),
            books_dir,
            pool,
            config: RwLock::new(config),
            blacklist: RwLock::new(blacklist),
            ipfs,
            progress: RwLock::new(Progress::default()),
            revision_lock: AsyncMutex::new(()),
        }
    }
}
