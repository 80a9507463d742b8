use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection error: {0}")]
    Connection(#[source] rusqlite::Error),

    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },

    #[error("query error: {0}")]
    Query(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => DatabaseError::Query("no rows returned".to_string()),
            other => DatabaseError::Connection(other),
        }
    }
}
