
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{FileType, NostrRequest, NostrResponse, ResponseBook, ResponseBookWire};

use super::Repository;

pub trait NostrRepository: Repository<Entity = NostrRequest, Id = String> {
    fn insert_request(&self, req: &NostrRequest) -> Result<()>;
    fn active_requests(&self) -> Result<Vec<NostrRequest>>;
    /// Delete requests older than `max_age_secs` relative to `now`.
    fn purge_expired_requests(&self, now: i64, max_age_secs: i64) -> Result<usize>;
    fn delete_orphan_responses(&self) -> Result<usize>;
    fn delete_orphan_response_books(&self) -> Result<usize>;
    fn truncate_all(&self) -> Result<()>;

    fn insert_response(&self, request_event_id: &str, responder_pubkey: &str, received_at: i64, raw_content: &str) -> Result<i64>;
    fn upsert_response_book(&self, response_id: i64, book: &ResponseBookWire, raw_json: &str) -> Result<()>;
    fn response_books_for_request(&self, request_event_id: &str, blocked_hashes: &[String], blocked_pubkeys: &[String]) -> Result<Vec<(ResponseBook, String)>>;
}

pub struct SqliteNostrRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteNostrRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_request(row: &rusqlite::Row) -> rusqlite::Result<NostrRequest> {
        Ok(NostrRequest {
            event_id: row.get(0)?,
            pubkey: row.get(1)?,
            author: row.get(2)?,
            series: row.get(3)?,
            title: row.get(4)?,
            file_hash: row.get(5)?,
            created_at: row.get(6)?,
            sent: row.get::<_, i64>(7)? != 0,
        })
    }
}

impl<'a> Repository for SqliteNostrRepository<'a> {
    type Entity = NostrRequest;
    type Id = String;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, pubkey, author, series, title, file_hash, created_at, sent
             FROM nostr_book_requests WHERE event_id = ?1",
        )?;
        Ok(stmt.query_row(params![id], Self::row_to_request).optional()?)
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM nostr_book_requests WHERE event_id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl<'a> NostrRepository for SqliteNostrRepository<'a> {
    fn insert_request(&self, req: &NostrRequest) -> Result<()> {
        self.conn.execute(
            "INSERT INTO nostr_book_requests (event_id, pubkey, author, series, title, file_hash, created_at, sent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                req.event_id,
                req.pubkey,
                req.author,
                req.series,
                req.title,
                req.file_hash,
                req.created_at,
                req.sent as i64,
            ],
        )?;
        Ok(())
    }

    fn active_requests(&self) -> Result<Vec<NostrRequest>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, pubkey, author, series, title, file_hash, created_at, sent
             FROM nostr_book_requests ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_request)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn purge_expired_requests(&self, now: i64, max_age_secs: i64) -> Result<usize> {
        let cutoff = now - max_age_secs;
        let deleted = self
            .conn
            .execute("DELETE FROM nostr_book_requests WHERE created_at < ?1", params![cutoff])?;
        Ok(deleted)
    }

    fn delete_orphan_responses(&self) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM nostr_responses WHERE request_event_id NOT IN (SELECT event_id FROM nostr_book_requests)",
            [],
        )?;
        Ok(deleted)
    }

    fn delete_orphan_response_books(&self) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM nostr_response_books WHERE response_id NOT IN (SELECT id FROM nostr_responses)",
            [],
        )?;
        Ok(deleted)
    }

    fn truncate_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM nostr_response_books;
             DELETE FROM nostr_responses;
             DELETE FROM nostr_book_requests;",
        )?;
        Ok(())
    }

    fn insert_response(
        &self,
        request_event_id: &str,
        responder_pubkey: &str,
        received_at: i64,
        raw_content: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO nostr_responses (request_event_id, responder_pubkey, received_at, raw_content)
             VALUES (?1, ?2, ?3, ?4)",
            params![request_event_id, responder_pubkey, received_at, raw_content],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn upsert_response_book(&self, response_id: i64, book: &ResponseBookWire, raw_json: &str) -> Result<()> {
        let authors_json = serde_json::to_string(&book.authors)?;
        let cid = book.ipfs_cid.as_deref().unwrap_or_default();
        self.conn.execute(
            "INSERT INTO nostr_response_books
                (response_id, title, authors_json, series, series_number, file_type, file_hash, file_size, ipfs_cid, raw_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(ipfs_cid) DO UPDATE SET
                response_id = excluded.response_id,
                title = excluded.title,
                authors_json = excluded.authors_json,
                series = excluded.series,
                series_number = excluded.series_number,
                file_type = excluded.file_type,
                file_hash = excluded.file_hash,
                file_size = excluded.file_size,
                raw_json = excluded.raw_json",
            params![
                response_id,
                book.title,
                authors_json,
                book.series,
                book.series_number,
                book.file_type.extension(),
                book.file_hash,
                book.file_size,
                cid,
                raw_json,
            ],
        )?;
        Ok(())
    }

    fn response_books_for_request(
        &self,
        request_event_id: &str,
        blocked_hashes: &[String],
        blocked_pubkeys: &[String],
    ) -> Result<Vec<(ResponseBook, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT rb.id, rb.response_id, rb.title, rb.authors_json, rb.series, rb.series_number,
                    rb.file_type, rb.file_hash, rb.file_size, rb.ipfs_cid, rb.raw_json, r.responder_pubkey
             FROM nostr_response_books rb
             JOIN nostr_responses r ON r.id = rb.response_id
             WHERE r.request_event_id = ?1
             ORDER BY rb.id DESC",
        )?;

        let rows = stmt
            .query_map(params![request_event_id], |row| {
                let authors_json: String = row.get(3)?;
                let file_type_str: String = row.get(6)?;
                let responder_pubkey: String = row.get(11)?;
                Ok((
                    ResponseBook {
                        id: row.get(0)?,
                        response_id: row.get(1)?,
                        title: row.get(2)?,
                        authors: serde_json::from_str(&authors_json).unwrap_or_default(),
                        series: row.get(4)?,
                        series_number: row.get(5)?,
                        file_type: file_type_from_db(&file_type_str),
                        file_hash: row.get(7)?,
                        file_size: row.get(8)?,
                        ipfs_cid: row.get(9)?,
                        raw_json: row.get(10)?,
                    },
                    responder_pubkey,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter(|(book, pubkey)| {
                !blocked_hashes.contains(&book.file_hash) && !blocked_pubkeys.contains(pubkey)
            })
            .collect())
    }
}

fn file_type_from_db(s: &str) -> FileType {
    match s {
        "fb2" => FileType::Fb2,
        "fb2.zip" => FileType::Fb2Zip,
        "pdf" => FileType::Pdf,
        "djvu" => FileType::Djvu,
        _ => FileType::Epub,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::open_in_memory;

    fn sample_request(event_id: &str, created_at: i64) -> NostrRequest {
        NostrRequest {
            event_id: event_id.to_string(),
            pubkey: "pub1".to_string(),
            author: String::new(),
            series: String::new(),
            title: "Dune".to_string(),
            file_hash: String::new(),
            created_at,
            sent: true,
        }
    }

    #[test]
    fn purge_expired_requests_removes_old_rows_only() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let repo = SqliteNostrRepository::new(&conn);

        repo.insert_request(&sample_request("old", 0)).unwrap();
        repo.insert_request(&sample_request("new", 100_000)).unwrap();

        let removed = repo.purge_expired_requests(100_000, 24 * 3600).unwrap();
        assert_eq!(removed, 1);
        assert!(repo.find_by_id(&"old".to_string()).unwrap().is_none());
        assert!(repo.find_by_id(&"new".to_string()).unwrap().is_some());
    }

    #[test]
    fn upsert_response_book_keyed_by_cid_replaces_prior_row() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let repo = SqliteNostrRepository::new(&conn);

        repo.insert_request(&sample_request("req1", 0)).unwrap();
        let response_id = repo.insert_response("req1", "responder", 1, "[]").unwrap();

        let wire = ResponseBookWire {
            id: None,
            title: "Dune".to_string(),
            authors: vec!["Frank Herbert".to_string()],
            series: None,
            series_number: None,
            file_type: FileType::Epub,
            file_hash: "0123456789abcdef".to_string(),
            file_size: 100,
            ipfs_cid: Some("Qm123".to_string()),
        };
        repo.upsert_response_book(response_id, &wire, "{}").unwrap();
        repo.upsert_response_book(response_id, &wire, "{}").unwrap();

        let books = repo
            .response_books_for_request("req1", &[], &[])
            .unwrap();
        assert_eq!(books.len(), 1);
    }

    #[test]
    fn response_books_filtered_by_blacklist() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let repo = SqliteNostrRepository::new(&conn);

        repo.insert_request(&sample_request("req1", 0)).unwrap();
        let response_id = repo.insert_response("req1", "blocked-pubkey", 1, "[]").unwrap();
        let wire = ResponseBookWire {
            id: None,
            title: "Dune".to_string(),
            authors: vec!["Frank Herbert".to_string()],
            series: None,
            series_number: None,
            file_type: FileType::Epub,
            file_hash: "0123456789abcdef".to_string(),
            file_size: 100,
            ipfs_cid: Some("Qm456".to_string()),
        };
        repo.upsert_response_book(response_id, &wire, "{}").unwrap();

        let books = repo
            .response_books_for_request("req1", &[], &["blocked-pubkey".to_string()])
            .unwrap();
        assert!(books.is_empty());
    }
}
