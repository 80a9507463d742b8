use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{Book, FileType, NewBook};

use super::Repository;

/// A substring search filter over the case-folded mirror columns (§4.4):
/// the caller lowercases the query once, this repository never re-lowercases
/// at query time.
pub struct BookSearch<'a> {
    pub query_lower: Option<&'a str>,
    pub over18_allowed: bool,
    pub limit: usize,
    pub offset: usize,
}

pub trait BookRepository: Repository<Entity = Book, Id = i64> {
    fn find_by_hash(&self, file_hash: &str) -> Result<Option<Book>>;
    fn insert(&self, book: &NewBook) -> Result<i64>;
    fn search(&self, filter: &BookSearch) -> Result<Vec<Book>>;
    fn count(&self, filter: &BookSearch) -> Result<usize>;
    fn list_by_author(&self, author_id: i64, limit: usize, offset: usize) -> Result<Vec<Book>>;
    fn list_by_series(&self, series_lower: &str, limit: usize, offset: usize) -> Result<Vec<Book>>;
    fn list_by_tag(&self, tag_id: i64, limit: usize, offset: usize) -> Result<Vec<Book>>;
    fn set_ipfs_cid(&self, book_id: i64, cid: &str) -> Result<()>;
    fn rename_file_url(&self, book_id: i64, new_url: &str) -> Result<()>;
    fn all_file_urls(&self) -> Result<Vec<(i64, String)>>;
    /// Admin field edit: title/series/over18, keeping the case-folded
    /// mirror columns in sync the same way `insert` does.
    fn update_metadata(&self, book_id: i64, title: &str, series: &str, over18: bool) -> Result<bool>;
    /// Admin rename: renames a series across every book that carries it,
    /// keeping `series_lower` in sync. Returns the number of rows touched.
    fn rename_series(&self, series_lower: &str, new_series: &str) -> Result<usize>;
}

pub struct SqliteBookRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteBookRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<Book> {
        let file_type_str: String = row.get("file_type")?;
        Ok(Book {
            id: row.get("id")?,
            title: row.get("title")?,
            title_lower: row.get("title_lower")?,
            series: row.get("series")?,
            series_lower: row.get("series_lower")?,
            series_number: row.get("series_number")?,
            published: row.get("published")?,
            isbn: row.get("isbn")?,
            year: row.get("year")?,
            publisher: row.get("publisher")?,
            file_url: row.get("file_url")?,
            file_type: FileType::from_str_db(&file_type_str),
            file_hash: row.get("file_hash")?,
            file_size: row.get("file_size")?,
            over18: row.get::<_, i64>("over18")? != 0,
            ipfs_cid: row.get("ipfs_cid")?,
        })
    }

    const SELECT_COLUMNS: &'static str = "id, title, title_lower, series, series_lower, series_number, \
        published, isbn, year, publisher, file_url, file_type, file_hash, file_size, over18, ipfs_cid";
}

impl FileType {
    fn from_str_db(s: &str) -> FileType {
        match s {
            "fb2" => FileType::Fb2,
            "fb2.zip" => FileType::Fb2Zip,
            "epub" => FileType::Epub,
            "pdf" => FileType::Pdf,
            "djvu" => FileType::Djvu,
            _ => FileType::Epub,
        }
    }
}

impl<'a> Repository for SqliteBookRepository<'a> {
    type Entity = Book;
    type Id = i64;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let sql = format!("SELECT {} FROM books WHERE id = ?1", Self::SELECT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row(params![id], Self::row_to_book).optional()?)
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM books WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl<'a> BookRepository for SqliteBookRepository<'a> {
    fn find_by_hash(&self, file_hash: &str) -> Result<Option<Book>> {
        let sql = format!("SELECT {} FROM books WHERE file_hash = ?1", Self::SELECT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row(params![file_hash], Self::row_to_book).optional()?)
    }

    fn insert(&self, book: &NewBook) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO books
                (title, title_lower, series, series_lower, series_number, published, isbn,
                 year, publisher, file_url, file_type, file_hash, file_size, over18, ipfs_cid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                book.title,
                book.title_lower(),
                book.series,
                book.series_lower(),
                book.series_number,
                book.published,
                book.isbn,
                book.year,
                book.publisher,
                book.file_url,
                book.file_type.extension(),
                book.file_hash,
                book.file_size,
                book.over18 as i64,
                book.ipfs_cid,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn search(&self, filter: &BookSearch) -> Result<Vec<Book>> {
        let (clause, _) = Self::where_clause(filter);
        let sql = format!(
            "SELECT {} FROM books WHERE {} ORDER BY title_lower LIMIT ?1 OFFSET ?2",
            Self::SELECT_COLUMNS,
            clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let pattern = filter
            .query_lower
            .map(|q| format!("%{q}%"))
            .unwrap_or_default();

        let rows = if filter.query_lower.is_some() {
            stmt.query_map(
                params![pattern, filter.limit as i64, filter.offset as i64],
                Self::row_to_book,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![filter.limit as i64, filter.offset as i64], Self::row_to_book)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    fn count(&self, filter: &BookSearch) -> Result<usize> {
        let (clause, _) = Self::where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM books WHERE {clause}");
        let count: i64 = if let Some(q) = filter.query_lower {
            let pattern = format!("%{q}%");
            self.conn.query_row(&sql, params![pattern], |row| row.get(0))?
        } else {
            self.conn.query_row(&sql, [], |row| row.get(0))?
        };
        Ok(count as usize)
    }

    fn list_by_author(&self, author_id: i64, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let sql = format!(
            "SELECT {} FROM books b JOIN book_authors ba ON ba.book_id = b.id
             WHERE ba.author_id = ?1 ORDER BY b.title_lower LIMIT ?2 OFFSET ?3",
            Self::SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![author_id, limit as i64, offset as i64], Self::row_to_book)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_by_series(&self, series_lower: &str, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let sql = format!(
            "SELECT {} FROM books WHERE series_lower = ?1
             ORDER BY series_number, title_lower LIMIT ?2 OFFSET ?3",
            Self::SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![series_lower, limit as i64, offset as i64], Self::row_to_book)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_by_tag(&self, tag_id: i64, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let sql = format!(
            "SELECT {} FROM books b JOIN book_tags bt ON bt.book_id = b.id
             WHERE bt.tag_id = ?1 ORDER BY b.title_lower LIMIT ?2 OFFSET ?3",
            Self::SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tag_id, limit as i64, offset as i64], Self::row_to_book)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn set_ipfs_cid(&self, book_id: i64, cid: &str) -> Result<()> {
        self.conn
            .execute("UPDATE books SET ipfs_cid = ?1 WHERE id = ?2", params![cid, book_id])?;
        Ok(())
    }

    fn rename_file_url(&self, book_id: i64, new_url: &str) -> Result<()> {
        self.conn
            .execute("UPDATE books SET file_url = ?1 WHERE id = ?2", params![new_url, book_id])?;
        Ok(())
    }

    fn all_file_urls(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare("SELECT id, file_url FROM books")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn update_metadata(&self, book_id: i64, title: &str, series: &str, over18: bool) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE books SET title = ?1, title_lower = ?2, series = ?3, series_lower = ?4, over18 = ?5
             WHERE id = ?6",
            params![
                title,
                title.to_lowercase(),
                series,
                series.to_lowercase(),
                over18 as i64,
                book_id,
            ],
        )?;
        Ok(updated > 0)
    }

    fn rename_series(&self, series_lower: &str, new_series: &str) -> Result<usize> {
        let updated = self.conn.execute(
            "UPDATE books SET series = ?1, series_lower = ?2 WHERE series_lower = ?3",
            params![new_series, new_series.to_lowercase(), series_lower],
        )?;
        Ok(updated)
    }
}

impl<'a> SqliteBookRepository<'a> {
    fn where_clause(filter: &BookSearch) -> (String, bool) {
        let over18 = if filter.over18_allowed {
            "1=1".to_string()
        } else {
            "over18 = 0".to_string()
        };
        match filter.query_lower {
            Some(_) => (
                format!("({over18}) AND (title_lower LIKE ?1 OR series_lower LIKE ?1)"),
                true,
            ),
            None => (over18, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::{open_in_memory, ConnectionPool};

    fn pool() -> ConnectionPool {
        open_in_memory().unwrap()
    }

    fn sample() -> NewBook {
        NewBook {
            title: "Dune".to_string(),
            series: "Dune Saga".to_string(),
            series_number: Some(1),
            published: None,
            isbn: None,
            year: Some("1965".to_string()),
            publisher: None,
            file_url: "books/dune.epub".to_string(),
            file_type: FileType::Epub,
            file_hash: "0123456789abcdef".to_string(),
            file_size: 1024,
            over18: false,
            ipfs_cid: None,
        }
    }

    #[test]
    fn insert_and_find_by_hash_roundtrips() {
        let pool = pool();
        let conn = pool.get_connection();
        let repo = SqliteBookRepository::new(&conn);

        let id = repo.insert(&sample()).unwrap();
        let found = repo.find_by_hash("0123456789abcdef").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.title_lower, "dune");
        assert_eq!(found.series_lower, "dune saga");
    }

    #[test]
    fn unique_file_hash_rejects_duplicate() {
        let pool = pool();
        let conn = pool.get_connection();
        let repo = SqliteBookRepository::new(&conn);

        repo.insert(&sample()).unwrap();
        let err = repo.insert(&sample()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Database(_)));
    }

    #[test]
    fn search_by_case_folded_substring() {
        let pool = pool();
        let conn = pool.get_connection();
        let repo = SqliteBookRepository::new(&conn);
        repo.insert(&sample()).unwrap();

        let filter = BookSearch {
            query_lower: Some("dun"),
            over18_allowed: true,
            limit: 10,
            offset: 0,
        };
        let results = repo.search(&filter).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn over18_filter_excludes_adult_books_for_non_admin() {
        let pool = pool();
        let conn = pool.get_connection();
        let repo = SqliteBookRepository::new(&conn);
        let mut adult = sample();
        adult.over18 = true;
        adult.file_hash = "fedcba9876543210".to_string();
        repo.insert(&adult).unwrap();

        let filter = BookSearch {
            query_lower: None,
            over18_allowed: false,
            limit: 10,
            offset: 0,
        };
        let results = repo.search(&filter).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn rename_series_updates_every_matching_book() {
        let pool = pool();
        let conn = pool.get_connection();
        let repo = SqliteBookRepository::new(&conn);
        repo.insert(&sample()).unwrap();
        let mut second = sample();
        second.file_hash = "fedcba9876543210".to_string();
        repo.insert(&second).unwrap();

        let updated = repo.rename_series("dune saga", "The Dune Chronicles").unwrap();
        assert_eq!(updated, 2);

        let book = repo.find_by_hash("0123456789abcdef").unwrap().unwrap();
        assert_eq!(book.series, "The Dune Chronicles");
        assert_eq!(book.series_lower, "the dune chronicles");
    }
}
