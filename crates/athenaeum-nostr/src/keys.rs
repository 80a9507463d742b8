//! Long-lived identity: a secp256k1 keypair generated on first run and
//! persisted as hex in the app config's `nostr_privkey` field.

use nostr::Keys;

use crate::error::{NostrError, Result};

/// Loads the keypair from `hex_privkey` if present, otherwise generates a
/// fresh one. Returns the keys plus the hex-encoded secret key to persist
/// when a new one was generated (caller writes it back into `AppConfig`).
pub fn load_or_generate(hex_privkey: Option<&str>) -> Result<(Keys, Option<String>)> {
    match hex_privkey {
        Some(hex) => {
            let keys = Keys::parse(hex).map_err(NostrError::Key)?;
            Ok((keys, None))
        }
        None => {
            let keys = Keys::generate();
            let secret_hex = keys.secret_key().to_secret_hex();
            Ok((keys, Some(secret_hex)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_fresh_keys_when_none_configured() {
        let (keys, persisted) = load_or_generate(None).unwrap();
        assert!(persisted.is_some());
        assert_eq!(persisted.unwrap().len(), 64);
        assert!(!keys.public_key().to_hex().is_empty());
    }

    #[test]
    fn reloads_identical_keys_from_persisted_hex() {
        let (keys, persisted) = load_or_generate(None).unwrap();
        let hex = persisted.unwrap();
        let (reloaded, persisted_again) = load_or_generate(Some(&hex)).unwrap();
        assert!(persisted_again.is_none());
        assert_eq!(keys.public_key(), reloaded.public_key());
    }
}
