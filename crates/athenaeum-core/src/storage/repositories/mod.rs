mod author_repository;
mod book_repository;
mod nostr_repository;
mod tag_repository;

pub use author_repository::{AuthorRepository, SqliteAuthorRepository};
pub use book_repository::{BookRepository, BookSearch, SqliteBookRepository};
pub use nostr_repository::{NostrRepository, SqliteNostrRepository};
pub use tag_repository::{SqliteTagRepository, TagRepository};

use crate::error::Result;

pub trait Repository {
    type Entity;
    type Id;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>>;
    fn delete(&self, id: &Self::Id) -> Result<bool>;
}
