
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::Author;

use super::Repository;

pub trait AuthorRepository: Repository<Entity = Author, Id = i64> {
    fn find_by_full_name(&self, full_name: &str) -> Result<Option<Author>>;
    fn find_by_full_name_lower(&self, full_name_lower: &str) -> Result<Option<Author>>;
    /// Find-or-create by display name; links are made by the caller.
    fn upsert(&self, full_name: &str) -> Result<Author>;
    fn link_book(&self, book_id: i64, author_id: i64) -> Result<()>;
    fn list(&self) -> Result<Vec<Author>>;
    fn list_for_book(&self, book_id: i64) -> Result<Vec<Author>>;
    fn find_by_prefix(&self, prefix_lower: &str, limit: usize) -> Result<Vec<Author>>;
    /// Delete authors with zero remaining book links; returns count removed.
    fn delete_orphans(&self) -> Result<usize>;
    /// Admin rename: updates the display name and both case-folded mirrors.
    fn rename(&self, id: i64, full_name: &str) -> Result<bool>;
}

pub struct SqliteAuthorRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAuthorRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_author(row: &rusqlite::Row) -> rusqlite::Result<Author> {
        Ok(Author {
            id: row.get(0)?,
            full_name: row.get(1)?,
            full_name_lower: row.get(2)?,
            last_name_lower: row.get(3)?,
        })
    }
}

impl<'a> Repository for SqliteAuthorRepository<'a> {
    type Entity = Author;
    type Id = i64;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, full_name, full_name_lower, last_name_lower FROM authors WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], Self::row_to_author).optional()?)
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM authors WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl<'a> AuthorRepository for SqliteAuthorRepository<'a> {
    fn find_by_full_name(&self, full_name: &str) -> Result<Option<Author>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, full_name, full_name_lower, last_name_lower FROM authors WHERE full_name = ?1")?;
        Ok(stmt.query_row(params![full_name], Self::row_to_author).optional()?)
    }

    fn find_by_full_name_lower(&self, full_name_lower: &str) -> Result<Option<Author>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, full_name, full_name_lower, last_name_lower FROM authors WHERE full_name_lower = ?1",
        )?;
        Ok(stmt
            .query_row(params![full_name_lower], Self::row_to_author)
            .optional()?)
    }

    fn upsert(&self, full_name: &str) -> Result<Author> {
        if let Some(existing) = self.find_by_full_name(full_name)? {
            return Ok(existing);
        }
        let lower = full_name.to_lowercase();
        if let Some(existing) = self.find_by_full_name_lower(&lower)? {
            return Ok(existing);
        }

        let last_name_lower = Author::last_name_lower_of(full_name);
        self.conn.execute(
            "INSERT INTO authors (full_name, full_name_lower, last_name_lower) VALUES (?1, ?2, ?3)",
            params![full_name, lower, last_name_lower],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Author {
            id,
            full_name: full_name.to_string(),
            full_name_lower: lower,
            last_name_lower,
        })
    }

    fn link_book(&self, book_id: i64, author_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO book_authors (book_id, author_id) VALUES (?1, ?2)",
            params![book_id, author_id],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<Author>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, full_name, full_name_lower, last_name_lower FROM authors ORDER BY last_name_lower")?;
        let rows = stmt
            .query_map([], Self::row_to_author)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_for_book(&self, book_id: i64) -> Result<Vec<Author>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.full_name, a.full_name_lower, a.last_name_lower
             FROM authors a JOIN book_authors ba ON ba.author_id = a.id
             WHERE ba.book_id = ?1 ORDER BY a.last_name_lower",
        )?;
        let rows = stmt
            .query_map(params![book_id], Self::row_to_author)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_by_prefix(&self, prefix_lower: &str, limit: usize) -> Result<Vec<Author>> {
        let pattern = format!("{prefix_lower}%");
        let mut stmt = self.conn.prepare(
            "SELECT id, full_name, full_name_lower, last_name_lower FROM authors
             WHERE last_name_lower LIKE ?1 ORDER BY last_name_lower LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![pattern, limit as i64], Self::row_to_author)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn delete_orphans(&self) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM authors WHERE id NOT IN (SELECT DISTINCT author_id FROM book_authors)",
            [],
        )?;
        Ok(deleted)
    }

    fn rename(&self, id: i64, full_name: &str) -> Result<bool> {
        let lower = full_name.to_lowercase();
        let last_name_lower = Author::last_name_lower_of(full_name);
        let updated = self.conn.execute(
            "UPDATE authors SET full_name = ?1, full_name_lower = ?2, last_name_lower = ?3 WHERE id = ?4",
            params![full_name, lower, last_name_lower, id],
        )?;
        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::open_in_memory;

    #[test]
    fn upsert_is_idempotent_by_exact_name() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let repo = SqliteAuthorRepository::new(&conn);

        let a = repo.upsert("Jane Austen").unwrap();
        let b = repo.upsert("Jane Austen").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn upsert_reconciles_by_case_folded_name() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let repo = SqliteAuthorRepository::new(&conn);

        let a = repo.upsert("Jane Austen").unwrap();
        let b = repo.upsert("jane austen").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn delete_orphans_removes_unreferenced_authors() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let repo = SqliteAuthorRepository::new(&conn);

        repo.upsert("Orphan Author").unwrap();
        let removed = repo.delete_orphans().unwrap();
        assert_eq!(removed, 1);
        assert!(repo.find_by_full_name("Orphan Author").unwrap().is_none());
    }

    #[test]
    fn delete_orphans_keeps_linked_authors() {
        let pool = open_in_memory().unwrap();
        conn_insert_book(&pool.get_connection(), "linked-book-hash");

        let conn = pool.get_connection();
        let repo = SqliteAuthorRepository::new(&conn);
        let author = repo.upsert("Linked Author").unwrap();
        repo.link_book(1, author.id).unwrap();

        let removed = repo.delete_orphans().unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn list_for_book_returns_linked_authors_only() {
        let pool = open_in_memory().unwrap();
        conn_insert_book(&pool.get_connection(), "book-hash");

        let conn = pool.get_connection();
        let repo = SqliteAuthorRepository::new(&conn);
        let linked = repo.upsert("Linked Author").unwrap();
        repo.upsert("Unlinked Author").unwrap();
        repo.link_book(1, linked.id).unwrap();

        let authors = repo.list_for_book(1).unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].full_name, "Linked Author");
    }

    #[test]
    fn rename_updates_display_name_and_case_folded_mirrors() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let repo = SqliteAuthorRepository::new(&conn);

        let author = repo.upsert("Jane Austen").unwrap();
        assert!(repo.rename(author.id, "J. Austen").unwrap());

        let renamed = repo.find_by_id(&author.id).unwrap().unwrap();
        assert_eq!(renamed.full_name, "J. Austen");
        assert_eq!(renamed.full_name_lower, "j. austen");
    }

    fn conn_insert_book(conn: &Connection, hash: &str) {
        conn.execute(
            "INSERT INTO books (title, title_lower, file_url, file_type, file_hash) VALUES ('T', 't', 'x', 'epub', ?1)",
            params![hash],
        )
        .unwrap();
    }
}
