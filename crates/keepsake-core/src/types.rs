//! Persisted and on-wire record shapes.
//!
//! Field names follow the JSON contract shared with the web tier: camelCase,
//! with `IV` kept upper-case. Binary fields are lowercase hex.

use serde::{Deserialize, Serialize};

/// Key material stored per user. All three fields are absent before the first unlock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserKeyRecord {
    pub data_key_salt: Option<String>,
    pub wrapped_data_key: Option<String>,
    #[serde(rename = "wrappedDataKeyIV")]
    pub wrapped_data_key_iv: Option<String>,
}

impl UserKeyRecord {
    /// True once a DataKey has been generated and wrapped for this user.
    pub fn is_enrolled(&self) -> bool {
        self.wrapped_data_key.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Note,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::File => f.write_str("file"),
            ItemKind::Note => f.write_str("note"),
        }
    }
}

/// A vault item. The content lives in object storage at `r2_key`; this row
/// only carries its wrapped ItemKey and display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Plaintext size in bytes
    pub size: u64,
    pub version: u32,
    /// Salt field of the content envelope (hex)
    pub item_key_salt: String,
    pub wrapped_item_key: String,
    #[serde(rename = "wrappedItemKeyIV")]
    pub wrapped_item_key_iv: String,
    /// Object-storage key of the content envelope
    pub r2_key: String,
    pub created_at: u64,
}

/// ItemKey re-wrapped under one bundle's BundleKey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleItemRecord {
    pub item_id: String,
    pub bundle_wrapped_key: String,
    #[serde(rename = "bundleWrappedKeyIV")]
    pub bundle_wrapped_key_iv: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trustee {
    pub name: String,
    pub email: String,
}

/// When a bundle becomes due for release. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ReleasePolicy {
    #[serde(rename_all = "camelCase")]
    TimeLock { release_date: u64 },
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        interval_secs: u64,
        grace_secs: u64,
        last_check_in: u64,
    },
}

impl ReleasePolicy {
    /// Whether the policy has fired at `now`.
    pub fn is_due(&self, now: u64) -> bool {
        match self {
            ReleasePolicy::TimeLock { release_date } => now >= *release_date,
            ReleasePolicy::Heartbeat {
                interval_secs,
                grace_secs,
                last_check_in,
            } => {
                let deadline = last_check_in
                    .saturating_add(*interval_secs)
                    .saturating_add(*grace_secs);
                now > deadline
            }
        }
    }

    /// Record an owner check-in. No-op for time-lock bundles.
    pub fn check_in(&mut self, now: u64) {
        if let ReleasePolicy::Heartbeat { last_check_in, .. } = self {
            *last_check_in = (*last_check_in).max(now);
        }
    }
}

/// Public bundle header handed to trustees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadBundle {
    pub name: String,
    pub bundle_note_encrypted: Option<String>,
    #[serde(rename = "bundleNoteIV")]
    pub bundle_note_iv: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub size: u64,
    pub r2_key: String,
    pub bundle_wrapped_key: String,
    #[serde(rename = "bundleWrappedKeyIV")]
    pub bundle_wrapped_key_iv: String,
}

/// Response body of `GET /release/{releaseToken}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePayload {
    pub bundle: PayloadBundle,
    pub items: Vec<PayloadItem>,
}

/// Object-storage key for one version of an item's ciphertext.
pub fn blob_key(user_id: &str, item_id: &str, version: u32) -> String {
    format!("{user_id}/{item_id}/{version}")
}
