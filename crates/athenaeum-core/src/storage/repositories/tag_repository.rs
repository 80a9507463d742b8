
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::Tag;

use super::Repository;

pub trait TagRepository: Repository<Entity = Tag, Id = i64> {
    fn find_by_name(&self, name: &str) -> Result<Option<Tag>>;
    fn upsert(&self, name: &str) -> Result<Tag>;
    fn link_book(&self, book_id: i64, tag_id: i64) -> Result<()>;
    fn list_with_counts(&self) -> Result<Vec<(Tag, u32)>>;
    fn find_by_prefix(&self, prefix_lower: &str, limit: usize) -> Result<Vec<Tag>>;
    fn delete_orphans(&self) -> Result<usize>;
}

pub struct SqliteTagRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTagRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }
}

impl<'a> Repository for SqliteTagRepository<'a> {
    type Entity = Tag;
    type Id = i64;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM tags WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], Self::row_to_tag).optional()?)
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM tags WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl<'a> TagRepository for SqliteTagRepository<'a> {
    fn find_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM tags WHERE name = ?1")?;
        Ok(stmt.query_row(params![name], Self::row_to_tag).optional()?)
    }

    fn upsert(&self, name: &str) -> Result<Tag> {
        if let Some(existing) = self.find_by_name(name)? {
            return Ok(existing);
        }
        self.conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
        Ok(Tag {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    fn link_book(&self, book_id: i64, tag_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO book_tags (book_id, tag_id) VALUES (?1, ?2)",
            params![book_id, tag_id],
        )?;
        Ok(())
    }

    fn list_with_counts(&self) -> Result<Vec<(Tag, u32)>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name, COUNT(bt.book_id) as cnt FROM tags t
             LEFT JOIN book_tags bt ON bt.tag_id = t.id
             GROUP BY t.id ORDER BY cnt DESC, t.name ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    },
                    row.get::<_, i64>(2)? as u32,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_by_prefix(&self, prefix_lower: &str, limit: usize) -> Result<Vec<Tag>> {
        let pattern = format!("{prefix_lower}%");
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM tags WHERE LOWER(name) LIKE ?1 ORDER BY name LIMIT ?2")?;
        let rows = stmt
            .query_map(params![pattern, limit as i64], Self::row_to_tag)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn delete_orphans(&self) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM tags WHERE id NOT IN (SELECT DISTINCT tag_id FROM book_tags)",
            [],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::open_in_memory;

    #[test]
    fn upsert_is_idempotent() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let repo = SqliteTagRepository::new(&conn);

        let a = repo.upsert("rust").unwrap();
        let b = repo.upsert("rust").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn delete_orphans_removes_unlinked_tags() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let repo = SqliteTagRepository::new(&conn);

        repo.upsert("orphan").unwrap();
        let removed = repo.delete_orphans().unwrap();
        assert_eq!(removed, 1);
    }
}
