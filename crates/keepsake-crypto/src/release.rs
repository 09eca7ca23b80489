//! Bundle re-wrap (owner side) and disclosure (trustee side).
//!
//! Creating a bundle never touches content ciphertext: each selected ItemKey is
//! unwrapped under the DataKey and wrapped a second time under the BundleKey.
//! A trustee reverses only the second wrapping.

use keepsake_core::types::BundleItemRecord;
use rayon::prelude::*;

use crate::bundle::{derive_bundle_keys, BundleKeys};
use crate::cipher::{decrypt, decrypt_detached, encrypt_detached};
use crate::envelope::{decode_hex, WrappedKey};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{BundleKey, ItemKey, NoteKey};
use crate::random::{generate_iv, Iv};
use crate::session::VaultSession;
use crate::wrap::{unwrap, wrap};

/// Re-wrap each `(item_id, wrapped_under_data_key)` under `bundle_key`.
///
/// Items are independent, so the fan-out runs on the rayon pool. Every item
/// gets its own fresh IV. Fails as a whole on the first item that does not
/// unwrap.
pub fn rewrap_for_bundle(
    session: &mut VaultSession,
    bundle_key: &BundleKey,
    items: &[(String, WrappedKey)],
) -> CryptoResult<Vec<BundleItemRecord>> {
    let data_key = session.data_key()?;

    let records = items
        .par_iter()
        .map(|(item_id, wrapped)| -> CryptoResult<BundleItemRecord> {
            let item_key: ItemKey = unwrap(&wrapped.wrapped, data_key, &wrapped.iv)?;
            let iv = generate_iv();
            let rewrapped = wrap(&item_key, bundle_key, &iv)?;
            Ok(BundleItemRecord {
                item_id: item_id.clone(),
                bundle_wrapped_key: hex::encode(rewrapped),
                bundle_wrapped_key_iv: iv.to_hex(),
            })
        })
        .collect::<CryptoResult<Vec<_>>>()?;

    tracing::debug!(items = records.len(), "re-wrapped item keys for bundle");
    Ok(records)
}

/// Seal a bundle note. Returns `(bundleNoteEncrypted, bundleNoteIV)` as hex.
pub fn seal_bundle_note(note_key: &NoteKey, note: &str) -> CryptoResult<(String, String)> {
    let (iv, ciphertext) = encrypt_detached(note.as_bytes(), note_key)?;
    Ok((hex::encode(ciphertext), iv.to_hex()))
}

/// Token-only access to a released bundle.
///
/// Every failure is reported as [`CryptoError::Decryption`], whichever of the
/// token, the wrapped-key record, or the ciphertext was at fault.
pub struct TrusteeOpener {
    keys: BundleKeys,
}

impl std::fmt::Debug for TrusteeOpener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrusteeOpener").finish_non_exhaustive()
    }
}

impl TrusteeOpener {
    pub fn new(token: &str) -> CryptoResult<Self> {
        let keys = derive_bundle_keys(token).map_err(|_| CryptoError::Decryption)?;
        Ok(Self { keys })
    }

    /// Unwrap one item's `(bundleWrappedKey, bundleWrappedKeyIV)`.
    pub fn open_item_key(&self, wrapped_hex: &str, iv_hex: &str) -> CryptoResult<ItemKey> {
        let wrapped = WrappedKey::from_hex_parts(wrapped_hex, iv_hex, "bundleWrappedKey")
            .map_err(|_| CryptoError::Decryption)?;
        unwrap(&wrapped.wrapped, &self.keys.key, &wrapped.iv).map_err(|_| CryptoError::Decryption)
    }

    /// Unwrap the item key and decrypt `envelope` with it.
    pub fn open_item(&self, wrapped_hex: &str, iv_hex: &str, envelope: &[u8]) -> CryptoResult<Vec<u8>> {
        let item_key = self.open_item_key(wrapped_hex, iv_hex)?;
        decrypt(envelope, &item_key).map_err(|_| CryptoError::Decryption)
    }

    pub fn open_note(&self, ciphertext_hex: &str, iv_hex: &str) -> CryptoResult<String> {
        let ciphertext =
            decode_hex("bundleNoteEncrypted", ciphertext_hex).map_err(|_| CryptoError::Decryption)?;
        let iv = Iv::from_hex("bundleNoteIV", iv_hex).map_err(|_| CryptoError::Decryption)?;
        let plaintext =
            decrypt_detached(&ciphertext, &iv, &self.keys.note).map_err(|_| CryptoError::Decryption)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
    }
}
