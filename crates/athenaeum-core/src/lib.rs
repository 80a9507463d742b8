pub mod artifact;
pub mod blacklist;
pub mod config;
pub mod error;
pub mod formats;
pub mod hash;
pub mod ingest;
pub mod models;
pub mod revision;
pub mod storage;

pub use blacklist::Blacklist;
pub use ingest::{ingest_file, resize_cover, IngestMode, IngestOutcome, IpfsPinner};
pub use revision::{run as run_revision, snapshot as snapshot_progress, Progress, RevisionStatus, RevisionSummary};

pub use config::{AppConfig, RenamePolicy};
pub use error::{Error, ExitCode, Result};
pub use models::*;

pub use hash::{content_hash_file, content_hash_hex, content_hash_reader};

pub use formats::{extract_cover, extract_metadata, title_from_filename, ExtractedMetadata};

pub use storage::database::{
    backfill_case_folded_mirrors, open_database, open_in_memory, ConnectionPool, DatabaseError,
    SCHEMA_VERSION,
};

pub use storage::repositories::{
    AuthorRepository, BookRepository, BookSearch, NostrRepository, Repository,
    SqliteAuthorRepository, SqliteBookRepository, SqliteNostrRepository, SqliteTagRepository,
    TagRepository,
};
