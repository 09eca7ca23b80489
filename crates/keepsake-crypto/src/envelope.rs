//! Binary envelopes and their hex transport form.
//!
//! Content envelope:
//! ```text
//! [16 bytes: salt][12 bytes: IV][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! Wrapped-key envelope:
//! ```text
//! [12 bytes: IV][48 bytes: wrapped key = 32 key bytes + 16 tag]
//! ```
//!
//! Every field has a fixed length, so nothing is length-prefixed. Decoding
//! validates structure only and never touches a key.

use crate::error::{CryptoError, CryptoResult};
use crate::random::{Iv, Salt};
use crate::{IV_SIZE, SALT_SIZE, WRAPPED_KEY_SIZE};

/// Decode a lowercase or uppercase hex field.
pub fn decode_hex(field: &'static str, s: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(s).map_err(|_| CryptoError::Encoding { field })
}

/// Parsed content envelope. `ciphertext` includes the trailing tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEnvelope {
    pub salt: Salt,
    pub iv: Iv,
    pub ciphertext: Vec<u8>,
}

impl ContentEnvelope {
    /// Smallest byte string accepted by [`ContentEnvelope::decode`].
    pub const HEADER_SIZE: usize = SALT_SIZE + IV_SIZE;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_SIZE + self.ciphertext.len());
        out.extend_from_slice(self.salt.as_bytes());
        out.extend_from_slice(self.iv.as_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split `salt || iv || ciphertext`.
    ///
    /// Input shorter than the salt + IV header is rejected as malformed. A
    /// ciphertext too short to hold a tag is left for the decrypt step to reject.
    pub fn decode(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(CryptoError::MalformedEnvelope {
                what: "content envelope",
                expected: Self::HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let (salt, rest) = bytes.split_at(SALT_SIZE);
        let (iv, ciphertext) = rest.split_at(IV_SIZE);
        Ok(Self {
            salt: Salt::from_slice("content envelope salt", salt)?,
            iv: Iv::from_slice("content envelope iv", iv)?,
            ciphertext: ciphertext.to_vec(),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Self::decode(&decode_hex("content envelope", s)?)
    }
}

/// A wrapped key together with the IV it was wrapped under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    pub iv: Iv,
    pub wrapped: Vec<u8>,
}

impl WrappedKey {
    /// Exact length of the encoded envelope.
    pub const ENCODED_SIZE: usize = IV_SIZE + WRAPPED_KEY_SIZE;

    pub fn new(iv: Iv, wrapped: Vec<u8>) -> CryptoResult<Self> {
        if wrapped.len() != WRAPPED_KEY_SIZE {
            return Err(CryptoError::MalformedEnvelope {
                what: "wrapped key",
                expected: WRAPPED_KEY_SIZE,
                actual: wrapped.len(),
            });
        }
        Ok(Self { iv, wrapped })
    }

    /// `iv || wrapped`
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_SIZE);
        out.extend_from_slice(self.iv.as_bytes());
        out.extend_from_slice(&self.wrapped);
        out
    }

    pub fn decode(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != Self::ENCODED_SIZE {
            return Err(CryptoError::MalformedEnvelope {
                what: "wrapped-key envelope",
                expected: Self::ENCODED_SIZE,
                actual: bytes.len(),
            });
        }
        let (iv, wrapped) = bytes.split_at(IV_SIZE);
        Self::new(Iv::from_slice("wrapped-key iv", iv)?, wrapped.to_vec())
    }

    /// Build from the two hex columns persisted on item and bundle-item rows.
    pub fn from_hex_parts(
        wrapped_hex: &str,
        iv_hex: &str,
        field: &'static str,
    ) -> CryptoResult<Self> {
        let wrapped = decode_hex(field, wrapped_hex)?;
        let iv = Iv::from_hex(field, iv_hex)?;
        Self::new(iv, wrapped)
    }

    /// `(wrapped_hex, iv_hex)`
    pub fn to_hex_parts(&self) -> (String, String) {
        (hex::encode(&self.wrapped), self.iv.to_hex())
    }
}
