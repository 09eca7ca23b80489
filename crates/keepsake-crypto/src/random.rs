//! CSPRNG byte generation and the fixed-size salt/IV newtypes.
//!
//! All randomness comes from the operating system RNG. There is no fallback
//! generator: if the OS RNG fails, `OsRng` panics and the process aborts.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::{IV_SIZE, SALT_SIZE};

/// Fill `buf` from the OS CSPRNG.
pub fn fill_random(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

/// 128-bit salt (KDF salt, or the salt field of a content envelope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

/// 96-bit AES-GCM initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_SIZE]);

impl Salt {
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        fill_random(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    pub fn from_slice(what: &'static str, bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; SALT_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::MalformedEnvelope {
                    what,
                    expected: SALT_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(field: &'static str, s: &str) -> CryptoResult<Self> {
        let bytes = crate::envelope::decode_hex(field, s)?;
        Self::from_slice(field, &bytes)
    }
}

impl Iv {
    pub fn random() -> Self {
        let mut bytes = [0u8; IV_SIZE];
        fill_random(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }

    pub fn from_slice(what: &'static str, bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; IV_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::MalformedEnvelope {
                what,
                expected: IV_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(field: &'static str, s: &str) -> CryptoResult<Self> {
        let bytes = crate::envelope::decode_hex(field, s)?;
        Self::from_slice(field, &bytes)
    }
}

/// Fresh random 16-byte salt.
pub fn generate_salt() -> Salt {
    Salt::random()
}

/// Fresh random 12-byte IV.
pub fn generate_iv() -> Iv {
    Iv::random()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_and_iv_lengths() {
        assert_eq!(generate_salt().as_bytes().len(), 16);
        assert_eq!(generate_iv().as_bytes().len(), 12);
    }

    #[test]
    fn test_random_values_differ() {
        assert_ne!(generate_salt(), generate_salt());
        assert_ne!(generate_iv(), generate_iv());
    }

    #[test]
    fn test_iv_hex_roundtrip() {
        let iv = generate_iv();
        let parsed = Iv::from_hex("iv", &iv.to_hex()).unwrap();
        assert_eq!(iv, parsed);
    }

    #[test]
    fn test_iv_wrong_length_is_malformed() {
        let err = Iv::from_hex("wrappedDataKeyIV", "00ff").unwrap_err();
        assert_eq!(
            err,
            CryptoError::MalformedEnvelope {
                what: "wrappedDataKeyIV",
                expected: 12,
                actual: 2
            }
        );
    }

    #[test]
    fn test_salt_bad_hex_is_encoding_error() {
        let err = Salt::from_hex("dataKeySalt", "zz").unwrap_err();
        assert_eq!(err, CryptoError::Encoding { field: "dataKeySalt" });
    }
}
