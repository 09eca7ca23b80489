//! Key wrapping: AES-256-GCM over raw key bytes, caller-supplied IV.
//!
//! Output is `ciphertext(32) || tag(16)`; the IV travels separately (see
//! [`WrappedKey`](crate::envelope::WrappedKey) for the combined envelope).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::private::{FromMaterial, Material};
use crate::keys::{KeyOperation, WrappableKey, Wraps};
use crate::random::Iv;
use crate::{KEY_SIZE, WRAPPED_KEY_SIZE};

/// Wrap `key` under `under`.
pub fn wrap<K, W>(key: &K, under: &W, iv: &Iv) -> CryptoResult<Vec<u8>>
where
    K: WrappableKey,
    W: Wraps<K>,
{
    debug_assert!(W::ROLE.permits(KeyOperation::WrapKey));
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(under.material()));
    let wrapped = cipher
        .encrypt(Nonce::from_slice(iv.as_bytes()), &key.material()[..])
        .map_err(|_| CryptoError::Encryption)?;

    tracing::debug!(key = %K::ROLE, under = %W::ROLE, "wrapped key");
    Ok(wrapped)
}

/// Unwrap a key previously produced by [`wrap`] with the same wrapping key and IV.
///
/// A tag mismatch is reported as [`CryptoError::Decryption`] whether the cause
/// is the wrong wrapping key, the wrong IV, or tampered bytes.
pub fn unwrap<K, W>(wrapped: &[u8], under: &W, iv: &Iv) -> CryptoResult<K>
where
    K: WrappableKey,
    W: Wraps<K>,
{
    debug_assert!(W::ROLE.permits(KeyOperation::UnwrapKey));
    if wrapped.len() != WRAPPED_KEY_SIZE {
        return Err(CryptoError::MalformedEnvelope {
            what: "wrapped key",
            expected: WRAPPED_KEY_SIZE,
            actual: wrapped.len(),
        });
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(under.material()));
    let mut plaintext = cipher
        .decrypt(Nonce::from_slice(iv.as_bytes()), wrapped)
        .map_err(|_| CryptoError::Decryption)?;

    if plaintext.len() != KEY_SIZE {
        plaintext.zeroize();
        return Err(CryptoError::Decryption);
    }
    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    tracing::debug!(key = %K::ROLE, under = %W::ROLE, "unwrapped key");
    Ok(K::from_material(key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{DataKey, ItemKey, MasterKey};
    use crate::random::generate_iv;

    fn test_master_key() -> MasterKey {
        MasterKey::from_bytes([42u8; KEY_SIZE])
    }

    #[test]
    fn test_key_wrap_unwrap_roundtrip() {
        let master = test_master_key();
        let data_key = DataKey::generate();
        let iv = generate_iv();

        let wrapped = wrap(&data_key, &master, &iv).unwrap();
        let unwrapped: DataKey = unwrap(&wrapped, &master, &iv).unwrap();

        assert_eq!(data_key.material(), unwrapped.material());
    }

    #[test]
    fn test_key_unwrap_wrong_master() {
        let master1 = MasterKey::from_bytes([1u8; KEY_SIZE]);
        let master2 = MasterKey::from_bytes([2u8; KEY_SIZE]);
        let data_key = DataKey::generate();
        let iv = generate_iv();

        let wrapped = wrap(&data_key, &master1, &iv).unwrap();
        let result: CryptoResult<DataKey> = unwrap(&wrapped, &master2, &iv);

        assert_eq!(result.unwrap_err(), CryptoError::Decryption);
    }

    #[test]
    fn test_key_unwrap_wrong_iv() {
        let data_key = DataKey::generate();
        let item_key = ItemKey::generate();

        let wrapped = wrap(&item_key, &data_key, &generate_iv()).unwrap();
        let result: CryptoResult<ItemKey> = unwrap(&wrapped, &data_key, &generate_iv());

        assert_eq!(result.unwrap_err(), CryptoError::Decryption);
    }

    #[test]
    fn test_wrapped_key_size() {
        let data_key = DataKey::generate();
        let wrapped = wrap(&ItemKey::generate(), &data_key, &generate_iv()).unwrap();

        // key (32) + tag (16) = 48
        assert_eq!(wrapped.len(), WRAPPED_KEY_SIZE);
    }

    #[test]
    fn test_truncated_wrapped_key_is_malformed() {
        let data_key = DataKey::generate();
        let iv = generate_iv();
        let wrapped = wrap(&ItemKey::generate(), &data_key, &iv).unwrap();

        let result: CryptoResult<ItemKey> = unwrap(&wrapped[..40], &data_key, &iv);
        assert!(matches!(
            result.unwrap_err(),
            CryptoError::MalformedEnvelope { actual: 40, .. }
        ));
    }

    #[test]
    fn test_tampered_wrapped_key() {
        let data_key = DataKey::generate();
        let iv = generate_iv();
        let mut wrapped = wrap(&ItemKey::generate(), &data_key, &iv).unwrap();
        wrapped[3] ^= 0x01;

        let result: CryptoResult<ItemKey> = unwrap(&wrapped, &data_key, &iv);
        assert_eq!(result.unwrap_err(), CryptoError::Decryption);
    }
}
