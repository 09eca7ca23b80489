use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures of the key hierarchy.
///
/// `InvalidCredentials` and `Decryption` share one message so nothing rendered
/// from them tells a wrong passphrase apart from a corrupted record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Wrong passphrase, or a user record that does not unwrap.
    #[error("unable to unlock or decrypt")]
    InvalidCredentials,

    /// AEAD tag mismatch on any unwrap or decrypt.
    #[error("unable to unlock or decrypt")]
    Decryption,

    /// Structurally invalid envelope, detected before any cryptographic step.
    #[error("malformed {what}: {actual} bytes, expected {expected}")]
    MalformedEnvelope {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An operation needing the data key ran on a locked session.
    #[error("vault is locked")]
    VaultLocked,

    #[error("passphrase too short (min {min} characters)")]
    PassphraseTooShort { min: usize },

    /// A hex field that is not valid hex.
    #[error("invalid hex in {field}")]
    Encoding { field: &'static str },

    #[error("encryption failed")]
    Encryption,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

impl CryptoError {
    /// Whether this error is one a user may see: everything else indicates a
    /// defect in the caller or in stored data layout.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            CryptoError::InvalidCredentials
                | CryptoError::Decryption
                | CryptoError::PassphraseTooShort { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_and_decryption_render_identically() {
        assert_eq!(
            CryptoError::InvalidCredentials.to_string(),
            CryptoError::Decryption.to_string()
        );
    }

    #[test]
    fn test_contract_violations_are_not_user_facing() {
        assert!(!CryptoError::VaultLocked.is_user_facing());
        assert!(!CryptoError::MalformedEnvelope {
            what: "content envelope",
            expected: 28,
            actual: 3
        }
        .is_user_facing());
        assert!(CryptoError::Decryption.is_user_facing());
    }
}
