//! Key derivation.
//!
//! Mirrors `original_source/src/encryption.py::_get_fernet`: a passphrase
//! plus a per-record random salt run through PBKDF2-HMAC-SHA256 for 100,000
//! iterations yields a 32-byte key. Every encrypted record carries its own
//! salt, so rotating the passphrase never invalidates records already
//! written (they just need the old passphrase to open).

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;

/// Derive a 32-byte AES-256 key from `passphrase` and `salt` using
/// PBKDF2-HMAC-SHA256 at `iterations` rounds.
pub fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);
    key
}

/// Generate a fresh random salt for a new record.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_derive_same_key() {
        let salt = [1u8; SALT_LEN];
        let a = derive_key("hunter2", &salt, 1000);
        let b = derive_key("hunter2", &salt, 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn different_salts_derive_different_keys() {
        let a = derive_key("hunter2", &[1u8; SALT_LEN], 1000);
        let b = derive_key("hunter2", &[2u8; SALT_LEN], 1000);
        assert_ne!(a, b);
    }

    #[test]
    fn salts_are_random() {
        let a = generate_salt();
        let b = generate_salt();
        assert_ne!(a, b);
    }
}
