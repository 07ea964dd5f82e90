//! Random secret keys for signing session cookies and similar.

use rand::RngCore;

/// Number of random bytes in a generated key.
pub const SECRET_KEY_BYTES: usize = 32;

/// A fresh secret: [`SECRET_KEY_BYTES`] random bytes, hex encoded.
pub fn generate_secret_key() -> String {
    let mut bytes = [0u8; SECRET_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
