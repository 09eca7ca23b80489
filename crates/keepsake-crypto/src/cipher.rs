//! Content AEAD: AES-256-GCM under an item or note key.
//!
//! [`encrypt`] emits a full [`ContentEnvelope`] with a fresh salt and IV. The
//! salt is bound as associated data, so it cannot be swapped between envelopes.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};

use crate::envelope::ContentEnvelope;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::private::Material;
use crate::keys::{ContentKey, KeyOperation};
use crate::random::{Iv, Salt};

fn cipher_for<K: ContentKey>(key: &K) -> Aes256Gcm {
    debug_assert!(K::ROLE.permits(KeyOperation::Encrypt));
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.material()))
}

/// Encrypt into a parsed envelope (fresh salt + IV).
pub fn encrypt_envelope<K: ContentKey>(plaintext: &[u8], key: &K) -> CryptoResult<ContentEnvelope> {
    let salt = Salt::random();
    let iv = Iv::random();

    let ciphertext = cipher_for(key)
        .encrypt(
            Nonce::from_slice(iv.as_bytes()),
            Payload {
                msg: plaintext,
                aad: salt.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    Ok(ContentEnvelope {
        salt,
        iv,
        ciphertext,
    })
}

/// Encrypt `plaintext`, returning `salt || iv || ciphertext || tag`.
pub fn encrypt<K: ContentKey>(plaintext: &[u8], key: &K) -> CryptoResult<Vec<u8>> {
    Ok(encrypt_envelope(plaintext, key)?.encode())
}

/// Decrypt a parsed envelope.
pub fn decrypt_envelope<K: ContentKey>(envelope: &ContentEnvelope, key: &K) -> CryptoResult<Vec<u8>> {
    cipher_for(key)
        .decrypt(
            Nonce::from_slice(envelope.iv.as_bytes()),
            Payload {
                msg: &envelope.ciphertext,
                aad: envelope.salt.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Decryption)
}

/// Decrypt `salt || iv || ciphertext || tag`.
///
/// Fails with `MalformedEnvelope` if the input cannot even hold salt + IV,
/// and with `Decryption` on a wrong key, truncation, or any modified byte.
/// Never returns partial plaintext.
pub fn decrypt<K: ContentKey>(envelope: &[u8], key: &K) -> CryptoResult<Vec<u8>> {
    let parsed = ContentEnvelope::decode(envelope)?;
    decrypt_envelope(&parsed, key)
}

/// Encrypt with a fresh IV returned alongside the ciphertext (no salt field).
pub fn encrypt_detached<K: ContentKey>(plaintext: &[u8], key: &K) -> CryptoResult<(Iv, Vec<u8>)> {
    let iv = Iv::random();
    let ciphertext = cipher_for(key)
        .encrypt(Nonce::from_slice(iv.as_bytes()), plaintext)
        .map_err(|_| CryptoError::Encryption)?;
    Ok((iv, ciphertext))
}

pub fn decrypt_detached<K: ContentKey>(ciphertext: &[u8], iv: &Iv, key: &K) -> CryptoResult<Vec<u8>> {
    cipher_for(key)
        .decrypt(Nonce::from_slice(iv.as_bytes()), ciphertext)
        .map_err(|_| CryptoError::Decryption)
}
