//! Key roles and their capabilities.
//!
//! Each role is its own type and may only be used where its capability trait
//! allows:
//!
//! | role        | wraps          | content AEAD | exportable        |
//! |-------------|----------------|--------------|-------------------|
//! | `MasterKey` | `DataKey`      | no           | no                |
//! | `DataKey`   | `ItemKey`      | no           | only by wrapping  |
//! | `ItemKey`   | -              | yes          | only by wrapping  |
//! | `BundleKey` | `ItemKey`      | no           | no                |
//! | `NoteKey`   | -              | yes          | no                |
//!
//! All key types zeroize on drop and redact themselves in `Debug`.

use zeroize::Zeroize;

use crate::random::fill_random;
use crate::KEY_SIZE;

/// Name of a key role, for logs and capability checks at runtime boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Master,
    Data,
    Item,
    Bundle,
    Note,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyOperation {
    Encrypt,
    Decrypt,
    WrapKey,
    UnwrapKey,
}

impl KeyRole {
    /// The fixed operation set of this role.
    pub const fn allowed_operations(self) -> &'static [KeyOperation] {
        match self {
            KeyRole::Master | KeyRole::Data | KeyRole::Bundle => {
                &[KeyOperation::WrapKey, KeyOperation::UnwrapKey]
            }
            KeyRole::Item | KeyRole::Note => &[KeyOperation::Encrypt, KeyOperation::Decrypt],
        }
    }

    pub fn permits(self, op: KeyOperation) -> bool {
        self.allowed_operations().contains(&op)
    }
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeyRole::Master => "master",
            KeyRole::Data => "data",
            KeyRole::Item => "item",
            KeyRole::Bundle => "bundle",
            KeyRole::Note => "note",
        };
        f.write_str(name)
    }
}

pub(crate) mod private {
    use crate::KEY_SIZE;

    /// Raw key access, unnameable outside this crate.
    pub trait Material {
        fn material(&self) -> &[u8; KEY_SIZE];
    }

    /// Construction from unwrapped bytes, for roles that can be unwrapped.
    pub trait FromMaterial: Sized {
        fn from_material(bytes: [u8; KEY_SIZE]) -> Self;
    }
}

/// Any key of the hierarchy.
pub trait RoleKey: private::Material {
    const ROLE: KeyRole;

    fn role(&self) -> KeyRole {
        Self::ROLE
    }
}

/// A key that may itself be wrapped and later unwrapped.
pub trait WrappableKey: RoleKey + private::FromMaterial {}

/// `Self` may wrap and unwrap keys of type `K`.
pub trait Wraps<K: WrappableKey>: RoleKey {}

/// A key usable for bulk content encryption.
pub trait ContentKey: RoleKey {}

macro_rules! role_key {
    ($(#[$doc:meta])* $name:ident, $role:expr) => {
        $(#[$doc])*
        pub struct $name {
            bytes: [u8; KEY_SIZE],
        }

        impl $name {
            pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self { bytes }
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }

        impl private::Material for $name {
            fn material(&self) -> &[u8; KEY_SIZE] {
                &self.bytes
            }
        }

        impl RoleKey for $name {
            const ROLE: KeyRole = $role;
        }
    };
}

role_key!(
    /// Derived from the owner passphrase. Lives only in an unlocked session.
    MasterKey,
    KeyRole::Master
);

role_key!(
    /// Per-user random key, persisted only wrapped under the master key.
    DataKey,
    KeyRole::Data
);

role_key!(
    /// Per-item random content key, persisted wrapped under the data key and,
    /// once per bundle, under that bundle's key.
    ItemKey,
    KeyRole::Item
);

role_key!(
    /// Derived from a release token. Wraps item keys for one bundle.
    BundleKey,
    KeyRole::Bundle
);

role_key!(
    /// Derived from a release token. Seals the bundle's note.
    NoteKey,
    KeyRole::Note
);

fn random_key_bytes() -> [u8; KEY_SIZE] {
    let mut bytes = [0u8; KEY_SIZE];
    fill_random(&mut bytes);
    bytes
}

impl DataKey {
    /// Generate a random 256-bit data key.
    pub fn generate() -> Self {
        Self::from_bytes(random_key_bytes())
    }
}

impl ItemKey {
    /// Generate a random 256-bit item key.
    pub fn generate() -> Self {
        Self::from_bytes(random_key_bytes())
    }
}

impl private::FromMaterial for DataKey {
    fn from_material(bytes: [u8; KEY_SIZE]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl private::FromMaterial for ItemKey {
    fn from_material(bytes: [u8; KEY_SIZE]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl WrappableKey for DataKey {}
impl WrappableKey for ItemKey {}

impl Wraps<DataKey> for MasterKey {}
impl Wraps<ItemKey> for DataKey {}
impl Wraps<ItemKey> for BundleKey {}

impl ContentKey for ItemKey {}
impl ContentKey for NoteKey {}
