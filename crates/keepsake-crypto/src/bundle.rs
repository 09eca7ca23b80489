//! Release-token → bundle key derivation.
//!
//! ```text
//! salt  = SHA-256(token)[..16]
//! ikm   = PBKDF2-HMAC-SHA256(token, salt, 100_000, 32)
//! key   = ikm                                  (BundleKey, wrap-only)
//! note  = HKDF-SHA256(ikm, info = "keepsake-bundle-note")   (NoteKey)
//! ```
//!
//! The salt is a function of the token alone. A trustee holds nothing else, so
//! there is nowhere to keep a random salt for them. Tokens are 256-bit random
//! values, which is what makes the missing salt tolerable.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::pbkdf2_sha256;
use crate::keys::{BundleKey, NoteKey};
use crate::random::{fill_random, Salt};
use crate::{KEY_SIZE, SALT_SIZE};

/// PBKDF2 rounds for the token stretch. Fixed: trustees re-derive with nothing
/// but the token.
pub const BUNDLE_KDF_ITERATIONS: u32 = 100_000;

/// HKDF info string for the bundle note key.
pub const NOTE_KEY_INFO: &[u8] = b"keepsake-bundle-note";

const TOKEN_BYTES: usize = 32;

/// Generate a fresh release token: 32 random bytes, lowercase hex.
pub fn generate_release_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    fill_random(&mut bytes);
    let token = hex::encode(bytes);
    bytes.zeroize();
    token
}

/// Deterministic salt for `token`: the first 16 bytes of its SHA-256.
pub fn token_salt(token: &str) -> Salt {
    let digest = Sha256::digest(token.as_bytes());
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&digest[..SALT_SIZE]);
    Salt::from_bytes(salt)
}

fn stretch(token: &str) -> [u8; KEY_SIZE] {
    let salt = token_salt(token);
    pbkdf2_sha256(token.as_bytes(), salt.as_bytes(), BUNDLE_KDF_ITERATIONS)
}

/// Derive the wrap-only bundle key for `token`.
///
/// Any string is accepted. A wrong token yields a different key, which shows
/// up later as a failed unwrap.
pub fn derive_bundle_key(token: &str) -> BundleKey {
    BundleKey::from_bytes(stretch(token))
}

/// Both keys a release token yields.
#[derive(Debug)]
pub struct BundleKeys {
    pub key: BundleKey,
    pub note: NoteKey,
}

/// Derive the bundle key and the note key with a single PBKDF2 pass.
pub fn derive_bundle_keys(token: &str) -> CryptoResult<BundleKeys> {
    let mut ikm = stretch(token);

    let mut note = [0u8; KEY_SIZE];
    let expanded = Hkdf::<Sha256>::new(None, &ikm)
        .expand(NOTE_KEY_INFO, &mut note)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()));
    if let Err(e) = expanded {
        ikm.zeroize();
        return Err(e);
    }

    tracing::debug!("derived bundle keys");
    Ok(BundleKeys {
        key: BundleKey::from_bytes(ikm),
        note: NoteKey::from_bytes(note),
    })
}
