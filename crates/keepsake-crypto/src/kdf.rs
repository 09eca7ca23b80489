//! Key derivation: PBKDF2-HMAC-SHA256 passphrase → master key

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::keys::MasterKey;
use crate::random::Salt;
use crate::KEY_SIZE;

/// Default PBKDF2 round count for owner passphrases.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// PBKDF2 parameters for the passphrase KDF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Iterations (default: 100000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl From<&keepsake_core::config::KdfConfig> for KdfParams {
    fn from(cfg: &keepsake_core::config::KdfConfig) -> Self {
        Self {
            iterations: cfg.iterations,
        }
    }
}

/// Derive the 256-bit master key from a passphrase and the user's salt.
///
/// The salt is stored with the user record and is not secret. The returned key
/// can only wrap and unwrap the data key.
pub fn derive_key_from_password(
    password: &SecretString,
    salt: &Salt,
    params: &KdfParams,
) -> MasterKey {
    MasterKey::from_bytes(pbkdf2_sha256(
        password.expose_secret().as_bytes(),
        salt.as_bytes(),
        params.iterations,
    ))
}

pub(crate) fn pbkdf2_sha256(secret: &[u8], salt: &[u8], iterations: u32) -> [u8; KEY_SIZE] {
    let mut out = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::private::Material;

    fn fast() -> KdfParams {
        KdfParams { iterations: 1_000 }
    }

    #[test]
    fn test_kdf_deterministic() {
        let passphrase = SecretString::from("test-passphrase-123");
        let salt = Salt::from_bytes([1u8; 16]);

        let key1 = derive_key_from_password(&passphrase, &salt, &fast());
        let key2 = derive_key_from_password(&passphrase, &salt, &fast());

        assert_eq!(key1.material(), key2.material(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_passphrases() {
        let salt = Salt::from_bytes([1u8; 16]);

        let key1 = derive_key_from_password(&SecretString::from("passphrase-a"), &salt, &fast());
        let key2 = derive_key_from_password(&SecretString::from("passphrase-b"), &salt, &fast());

        assert_ne!(key1.material(), key2.material());
    }

    #[test]
    fn test_kdf_different_salts() {
        let passphrase = SecretString::from("same-passphrase");

        let key1 = derive_key_from_password(&passphrase, &Salt::from_bytes([1u8; 16]), &fast());
        let key2 = derive_key_from_password(&passphrase, &Salt::from_bytes([2u8; 16]), &fast());

        assert_ne!(key1.material(), key2.material());
    }

    #[test]
    fn test_pbkdf2_rfc7914_vector() {
        // RFC 7914 §11, PBKDF2-HMAC-SHA256, P="passwd", S="salt", c=1
        let out = pbkdf2_sha256(b"passwd", b"salt", 1);
        assert_eq!(
            hex::encode(out),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn test_params_from_config() {
        let cfg = keepsake_core::config::KdfConfig { iterations: 42 };
        assert_eq!(KdfParams::from(&cfg).iterations, 42);
    }
}
