//! keepsake-release: bundle lifecycle around the key hierarchy
//!
//! - [`ledger`]: JSON-persisted user record, items, bundles, and the
//!   bundle-item relation table
//! - [`bundle`]: release bundles, the monotonic `released` flag, and the
//!   trustee access window
//! - [`vault`]: owner and trustee workflows over session + ledger + blob store

pub mod bundle;
pub mod error;
pub mod ledger;
pub mod vault;

pub use bundle::ReleaseBundle;
pub use error::{ReleaseError, ReleaseResult};
pub use ledger::{BundleItemLink, Ledger};

/// Current Unix time in seconds
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
