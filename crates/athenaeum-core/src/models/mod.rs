pub mod author;
pub mod book;
pub mod nostr;
pub mod tag;

pub use author::{split_author_names, Author};
pub use book::{Book, FileType, NewBook};
pub use nostr::{NostrRequest, NostrResponse, RequestContent, ResponseBook, ResponseBookWire};
pub use tag::{Tag, TAG_NAME_MAX_LEN};
