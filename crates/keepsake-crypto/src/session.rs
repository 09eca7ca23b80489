//! Owner session: the Locked → Unlocking → Unlocked state machine holding the
//! unwrapped DataKey.
//!
//! A `VaultSession` is an ordinary value owned by the caller. Every operation
//! that needs the DataKey goes through [`VaultSession::data_key`], which is the
//! single place the locked and idle checks happen.

use std::time::{Duration, Instant};

use keepsake_core::types::UserKeyRecord;
use secrecy::{ExposeSecret, SecretString};

use crate::cipher;
use crate::envelope::{decode_hex, WrappedKey};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{derive_key_from_password, KdfParams};
use crate::keys::{DataKey, ItemKey, MasterKey};
use crate::random::{generate_iv, generate_salt, Iv, Salt};
use crate::wrap::{unwrap, wrap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Unlocking,
    Unlocked,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Locked => f.write_str("locked"),
            SessionState::Unlocking => f.write_str("unlocking"),
            SessionState::Unlocked => f.write_str("unlocked"),
        }
    }
}

/// Result of a successful [`VaultSession::unlock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// An existing DataKey was unwrapped.
    Unlocked,
    /// First unlock: a DataKey was generated. The record must be persisted.
    Enrolled(UserKeyRecord),
}

/// Item key handed out by [`VaultSession::item_key`].
#[derive(Debug)]
pub struct ItemKeyGrant {
    pub key: ItemKey,
    /// Set when the key was freshly generated and its wrapping must be persisted.
    pub created: Option<WrappedKey>,
}

/// Freshly encrypted item content plus its wrapped key.
#[derive(Debug, Clone)]
pub struct SealedItem {
    /// `salt || iv || ciphertext || tag`
    pub envelope: Vec<u8>,
    /// Salt field of `envelope`, persisted as `itemKeySalt`.
    pub salt: Salt,
    pub wrapped: WrappedKey,
}

pub struct VaultSession {
    state: SessionState,
    data_key: Option<DataKey>,
    params: KdfParams,
    min_passphrase_len: usize,
    idle_timeout: Option<Duration>,
    last_used: Instant,
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("state", &self.state)
            .field("params", &self.params)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl VaultSession {
    pub fn new(params: KdfParams, min_passphrase_len: usize) -> Self {
        Self {
            state: SessionState::Locked,
            data_key: None,
            params,
            min_passphrase_len,
            idle_timeout: None,
            last_used: Instant::now(),
        }
    }

    /// Lock automatically once no operation has run for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Current state. An unlocked session past its idle deadline reports `Locked`.
    pub fn state(&self) -> SessionState {
        if self.state == SessionState::Unlocked && self.idle_expired() {
            SessionState::Locked
        } else {
            self.state
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == SessionState::Unlocked
    }

    /// Unlock with `passphrase` against the stored user record.
    ///
    /// An enrolled record is unwrapped; any failure, including a missing or
    /// malformed field, is `InvalidCredentials`. A record without a wrapped key
    /// or IV enrolls: a new DataKey is generated and returned wrapped in
    /// [`UnlockOutcome::Enrolled`].
    pub fn unlock(
        &mut self,
        passphrase: &SecretString,
        record: &UserKeyRecord,
    ) -> CryptoResult<UnlockOutcome> {
        self.lock();
        self.state = SessionState::Unlocking;

        let result = if record.is_enrolled() {
            unwrap_data_key(passphrase, record, &self.params).map(|dk| (dk, UnlockOutcome::Unlocked))
        } else if record.wrapped_data_key_iv.is_some() {
            // An IV without its wrapped key is a damaged record, not a new user.
            Err(CryptoError::InvalidCredentials)
        } else {
            self.enroll(passphrase, record)
        };

        match result {
            Ok((data_key, outcome)) => {
                self.data_key = Some(data_key);
                self.state = SessionState::Unlocked;
                self.last_used = Instant::now();
                match &outcome {
                    UnlockOutcome::Unlocked => tracing::info!("vault unlocked"),
                    UnlockOutcome::Enrolled(_) => tracing::info!("vault enrolled and unlocked"),
                }
                Ok(outcome)
            }
            Err(e) => {
                self.state = SessionState::Locked;
                tracing::warn!("unlock failed");
                Err(e)
            }
        }
    }

    fn enroll(
        &self,
        passphrase: &SecretString,
        record: &UserKeyRecord,
    ) -> CryptoResult<(DataKey, UnlockOutcome)> {
        self.check_passphrase_len(passphrase)?;

        let salt = match &record.data_key_salt {
            Some(hex) => {
                Salt::from_hex("dataKeySalt", hex).map_err(|_| CryptoError::InvalidCredentials)?
            }
            None => generate_salt(),
        };
        let master = derive_key_from_password(passphrase, &salt, &self.params);
        let data_key = DataKey::generate();
        let record = wrap_data_key(&data_key, &master, &salt)?;

        Ok((data_key, UnlockOutcome::Enrolled(record)))
    }

    fn check_passphrase_len(&self, passphrase: &SecretString) -> CryptoResult<()> {
        if passphrase.expose_secret().chars().count() < self.min_passphrase_len {
            return Err(CryptoError::PassphraseTooShort {
                min: self.min_passphrase_len,
            });
        }
        Ok(())
    }

    /// Discard the DataKey and return to `Locked`. Idempotent.
    pub fn lock(&mut self) {
        let was_unlocked = self.data_key.take().is_some();
        self.state = SessionState::Locked;
        if was_unlocked {
            tracing::info!("vault locked");
        }
    }

    fn idle_expired(&self) -> bool {
        self.idle_timeout
            .is_some_and(|timeout| self.last_used.elapsed() >= timeout)
    }

    /// The unwrapped DataKey, or `VaultLocked`.
    pub(crate) fn data_key(&mut self) -> CryptoResult<&DataKey> {
        if self.state != SessionState::Unlocked {
            return Err(CryptoError::VaultLocked);
        }
        if self.idle_expired() {
            tracing::info!("idle timeout reached");
            self.lock();
            return Err(CryptoError::VaultLocked);
        }
        self.last_used = Instant::now();
        self.data_key.as_ref().ok_or(CryptoError::VaultLocked)
    }

    /// Generate a new ItemKey and wrap it under the DataKey.
    pub fn new_item_key(&mut self) -> CryptoResult<(ItemKey, WrappedKey)> {
        let data_key = self.data_key()?;
        let item_key = ItemKey::generate();
        let iv = generate_iv();
        let wrapped = WrappedKey::new(iv, wrap(&item_key, data_key, &iv)?)?;
        tracing::debug!("generated item key");
        Ok((item_key, wrapped))
    }

    /// Unwrap a stored ItemKey.
    pub fn open_item_key(&mut self, wrapped: &WrappedKey) -> CryptoResult<ItemKey> {
        let data_key = self.data_key()?;
        unwrap(&wrapped.wrapped, data_key, &wrapped.iv)
    }

    /// Unwrap the item's key, or create one when the item has none yet.
    pub fn item_key(&mut self, stored: Option<&WrappedKey>) -> CryptoResult<ItemKeyGrant> {
        match stored {
            Some(wrapped) => Ok(ItemKeyGrant {
                key: self.open_item_key(wrapped)?,
                created: None,
            }),
            None => {
                let (key, wrapped) = self.new_item_key()?;
                Ok(ItemKeyGrant {
                    key,
                    created: Some(wrapped),
                })
            }
        }
    }

    /// Encrypt new item content under a fresh ItemKey.
    pub fn seal_item(&mut self, plaintext: &[u8]) -> CryptoResult<SealedItem> {
        let (item_key, wrapped) = self.new_item_key()?;
        let envelope = cipher::encrypt_envelope(plaintext, &item_key)?;
        Ok(SealedItem {
            salt: envelope.salt,
            envelope: envelope.encode(),
            wrapped,
        })
    }

    /// Decrypt item content given its stored wrapped key.
    pub fn open_item(&mut self, wrapped: &WrappedKey, envelope: &[u8]) -> CryptoResult<Vec<u8>> {
        let item_key = self.open_item_key(wrapped)?;
        cipher::decrypt(envelope, &item_key)
    }

    /// Re-wrap the current DataKey under a new passphrase with a fresh salt.
    ///
    /// Returns the replacement user record. Item keys are untouched.
    pub fn change_passphrase(&mut self, new_passphrase: &SecretString) -> CryptoResult<UserKeyRecord> {
        self.data_key()?;
        self.check_passphrase_len(new_passphrase)?;
        let params = self.params;
        let data_key = self.data_key()?;

        let salt = generate_salt();
        let master = derive_key_from_password(new_passphrase, &salt, &params);
        let record = wrap_data_key(data_key, &master, &salt)?;

        tracing::info!("passphrase changed");
        Ok(record)
    }
}

impl Drop for VaultSession {
    fn drop(&mut self) {
        self.lock();
    }
}

fn wrap_data_key(data_key: &DataKey, master: &MasterKey, salt: &Salt) -> CryptoResult<UserKeyRecord> {
    let iv = generate_iv();
    let wrapped = wrap(data_key, master, &iv)?;
    Ok(UserKeyRecord {
        data_key_salt: Some(salt.to_hex()),
        wrapped_data_key: Some(hex::encode(wrapped)),
        wrapped_data_key_iv: Some(iv.to_hex()),
    })
}

fn unwrap_data_key(
    passphrase: &SecretString,
    record: &UserKeyRecord,
    params: &KdfParams,
) -> CryptoResult<DataKey> {
    let fields = (
        record.data_key_salt.as_deref(),
        record.wrapped_data_key.as_deref(),
        record.wrapped_data_key_iv.as_deref(),
    );
    let (Some(salt), Some(wrapped), Some(iv)) = fields else {
        return Err(CryptoError::InvalidCredentials);
    };

    let salt = Salt::from_hex("dataKeySalt", salt).map_err(|_| CryptoError::InvalidCredentials)?;
    let wrapped =
        decode_hex("wrappedDataKey", wrapped).map_err(|_| CryptoError::InvalidCredentials)?;
    let iv = Iv::from_hex("wrappedDataKeyIV", iv).map_err(|_| CryptoError::InvalidCredentials)?;

    let master = derive_key_from_password(passphrase, &salt, params);
    unwrap::<DataKey, MasterKey>(&wrapped, &master, &iv).map_err(|_| CryptoError::InvalidCredentials)
}
