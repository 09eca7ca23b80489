//! keepsake-crypto: zero-knowledge envelope encryption for vault items
//!
//! Key hierarchy:
//! ```text
//! Master Key (PBKDF2-SHA256 from passphrase + per-user salt, never stored)
//!   └── Data Key (random, stored wrapped under the master key)
//!         └── Item Key (random per item, stored wrapped under the data key)
//!               └── Content AEAD: AES-256-GCM, envelope = salt(16) || iv(12) || ct || tag(16)
//!
//! Release token (random, held by trustees)
//!   └── PBKDF2-SHA256(token, salt = SHA-256(token)[..16])
//!         ├── Bundle Key: re-wraps item keys for one bundle
//!         └── Note Key (HKDF, "keepsake-bundle-note"): seals the bundle note
//! ```
//!
//! An item shared into N bundles has N independent wrappings of the same item
//! key; its ciphertext is stored once.

pub mod bundle;
pub mod cipher;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod random;
pub mod release;
pub mod session;
pub mod wrap;

pub use bundle::{derive_bundle_key, derive_bundle_keys, generate_release_token, BundleKeys};
pub use cipher::{decrypt, encrypt};
pub use envelope::{ContentEnvelope, WrappedKey};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key_from_password, KdfParams};
pub use keys::{
    BundleKey, ContentKey, DataKey, ItemKey, KeyOperation, KeyRole, MasterKey, NoteKey, RoleKey,
    WrappableKey, Wraps,
};
pub use random::{generate_iv, generate_salt, Iv, Salt};
pub use release::{rewrap_for_bundle, seal_bundle_note, TrusteeOpener};
pub use session::{ItemKeyGrant, SealedItem, SessionState, UnlockOutcome, VaultSession};
pub use wrap::{unwrap, wrap};

/// Size of every symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a KDF salt and of the content-envelope salt field (128-bit)
pub const SALT_SIZE: usize = 16;

/// Size of an AES-GCM IV (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of an AES-GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a wrapped 256-bit key: key bytes + tag
pub const WRAPPED_KEY_SIZE: usize = KEY_SIZE + TAG_SIZE;
