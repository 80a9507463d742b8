//! Content-addressed fingerprinting (C1): a streaming 64-bit non-cryptographic
//! hash over a byte stream, hex-encoded and zero-padded to 16 lowercase
//! characters. This is the identity that ties a book's catalog row, its
//! artifacts (cover, annotation), and its IPFS CID together (see
//! `athenaeum_core::artifact`).

use std::io::{self, Read};
use std::path::Path;

use twox_hash::XxHash64;

const SEED: u64 = 0;
const CHUNK_SIZE: usize = 64 * 1024;

/// Hash an in-memory byte slice.
pub fn content_hash_hex(bytes: &[u8]) -> String {
    let mut hasher = XxHash64::with_seed(SEED);
    std::hash::Hasher::write(&mut hasher, bytes);
    format_hash(std::hash::Hasher::finish(&hasher))
}

/// Hash a reader by streaming fixed-size chunks, so large PDFs don't need to
/// be fully resident in memory.
pub fn content_hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = XxHash64::with_seed(SEED);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        std::hash::Hasher::write(&mut hasher, &buf[..n]);
    }
    Ok(format_hash(std::hash::Hasher::finish(&hasher)))
}

/// Hash a file on disk.
pub fn content_hash_file(path: &Path) -> io::Result<String> {
    let file = std::fs::File::open(path)?;
    content_hash_reader(io::BufReader::new(file))
}

fn format_hash(value: u64) -> String {
    format!("{value:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn hash_is_16_lowercase_hex_chars() {
        let h = content_hash_hex(b"hello world");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_is_deterministic() {
        let a = content_hash_hex(b"same content");
        let b = content_hash_hex(b"same content");
        assert_eq!(a, b);
    }

    #[test]
    fn reader_and_slice_agree() {
        let data = b"streamed content for the reader path".repeat(10_000);
        let from_slice = content_hash_hex(&data);
        let from_reader = content_hash_reader(Cursor::new(&data)).unwrap();
        assert_eq!(from_slice, from_reader);
    }

    #[test]
    fn different_content_differs() {
        let a = content_hash_hex(b"alpha");
        let b = content_hash_hex(b"beta");
        assert_ne!(a, b);
    }
}
