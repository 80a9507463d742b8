mod connection;
mod error;
mod migrations;
pub mod schema;

pub use connection::ConnectionPool;
pub use error::DatabaseError;
pub use migrations::{get_applied_versions, run_migrations, Migration};
pub use schema::{backfill_case_folded_mirrors, init_schema, SCHEMA_VERSION};

use std::path::Path;

use chrono::Utc;

use crate::error::Result;

/// Open (creating if absent) the catalog database at `path`, back it up if
/// it already exists, run pending migrations, and batch-populate any stale
/// case-folded mirror columns. This is the one-shot startup migration in the
/// catalog store design.
pub fn open_database(path: &Path) -> Result<ConnectionPool> {
    if path.exists() {
        backup_database_file(path)?;
    }
    let pool = ConnectionPool::open(path)?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
        schema::backfill_case_folded_mirrors(&conn)?;
    }
    Ok(pool)
}

pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

fn backup_database_file(path: &Path) -> Result<()> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let backup_path = path.with_extension(format!("bak.{timestamp}"));
    std::fs::copy(path, &backup_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_database_creates_and_migrates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("athenaeum.db");
        let pool = open_database(&path).unwrap();
        let conn = pool.get_connection();
        let versions = get_applied_versions(&conn).unwrap();
        assert_eq!(versions, vec![1]);
    }

    #[test]
    fn reopening_existing_database_creates_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("athenaeum.db");
        {
            let _pool = open_database(&path).unwrap();
        }
        let _pool2 = open_database(&path).unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".bak."))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
