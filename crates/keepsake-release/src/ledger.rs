//! Persistent ledger: the owner's user record, items, bundles, and the
//! bundle-item relation table.
//!
//! Loaded entirely into memory and flushed atomically via temp+rename. Bundle
//! membership lives in its own table of `(bundleId, itemId) → wrapped key`
//! rows, so no bundle operation ever rewrites an item record.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use keepsake_core::types::{
    BundleItemRecord, ItemRecord, PayloadItem, ReleasePayload, ReleasePolicy, Trustee,
    UserKeyRecord,
};
use serde::{Deserialize, Serialize};

use crate::bundle::ReleaseBundle;
use crate::error::{ReleaseError, ReleaseResult};

/// One row of the relation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleItemLink {
    pub bundle_id: String,
    #[serde(flatten)]
    pub record: BundleItemRecord,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerData {
    user_id: String,
    #[serde(default)]
    user: UserKeyRecord,
    #[serde(default)]
    items: BTreeMap<String, ItemRecord>,
    #[serde(default)]
    bundles: BTreeMap<String, ReleaseBundle>,
    #[serde(default)]
    bundle_items: Vec<BundleItemLink>,
}

pub struct Ledger {
    path: PathBuf,
    data: LedgerData,
    dirty: bool,
}

impl Ledger {
    /// Load the ledger at `path`, or start an empty one with a new user id.
    pub fn open(path: &Path) -> ReleaseResult<Self> {
        let (data, dirty) = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            (serde_json::from_str(&content)?, false)
        } else {
            let data = LedgerData {
                user_id: uuid::Uuid::new_v4().to_string(),
                ..Default::default()
            };
            (data, true)
        };

        tracing::debug!(path = %path.display(), "opened ledger");
        Ok(Ledger {
            path: path.to_path_buf(),
            data,
            dirty,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush dirty changes to disk using an atomic write (write then rename).
    pub fn flush(&mut self) -> ReleaseResult<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.data)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        self.dirty = false;
        Ok(())
    }

    // ── user ────────────────────────────────────────────────────────────────

    pub fn user_id(&self) -> &str {
        &self.data.user_id
    }

    pub fn user_record(&self) -> &UserKeyRecord {
        &self.data.user
    }

    pub fn set_user_record(&mut self, record: UserKeyRecord) {
        self.data.user = record;
        self.dirty = true;
    }

    // ── items ───────────────────────────────────────────────────────────────

    pub fn items(&self) -> impl Iterator<Item = &ItemRecord> {
        self.data.items.values()
    }

    pub fn item(&self, id: &str) -> Option<&ItemRecord> {
        self.data.items.get(id)
    }

    fn require_item(&self, id: &str) -> ReleaseResult<&ItemRecord> {
        self.item(id)
            .ok_or_else(|| ReleaseError::ItemNotFound(id.to_string()))
    }

    pub fn insert_item(&mut self, item: ItemRecord) {
        self.data.items.insert(item.id.clone(), item);
        self.dirty = true;
    }

    /// Delete an item and its links from unreleased bundles.
    ///
    /// Refused with `BundleFrozen` while any released bundle holds the item.
    pub fn delete_item(&mut self, id: &str) -> ReleaseResult<ItemRecord> {
        self.require_item(id)?;
        if let Some(frozen) = self
            .bundles_containing(id)
            .into_iter()
            .find(|b| b.released)
        {
            return Err(ReleaseError::BundleFrozen(frozen.id.clone()));
        }

        self.data.bundle_items.retain(|l| l.record.item_id != id);
        let removed = self
            .data
            .items
            .remove(id)
            .ok_or_else(|| ReleaseError::ItemNotFound(id.to_string()))?;
        self.dirty = true;
        tracing::info!(item = %id, "item deleted");
        Ok(removed)
    }

    // ── bundles ─────────────────────────────────────────────────────────────

    pub fn bundles(&self) -> impl Iterator<Item = &ReleaseBundle> {
        self.data.bundles.values()
    }

    pub fn bundle(&self, id: &str) -> Option<&ReleaseBundle> {
        self.data.bundles.get(id)
    }

    fn bundle_mut(&mut self, id: &str) -> ReleaseResult<&mut ReleaseBundle> {
        self.data
            .bundles
            .get_mut(id)
            .ok_or(ReleaseError::BundleNotFound)
    }

    pub fn bundle_by_token(&self, token: &str) -> Option<&ReleaseBundle> {
        self.data.bundles.values().find(|b| b.release_token == token)
    }

    /// Wrapped-key rows of one bundle.
    pub fn bundle_links(&self, bundle_id: &str) -> Vec<&BundleItemRecord> {
        self.data
            .bundle_items
            .iter()
            .filter(|l| l.bundle_id == bundle_id)
            .map(|l| &l.record)
            .collect()
    }

    pub fn bundles_containing(&self, item_id: &str) -> Vec<&ReleaseBundle> {
        self.data
            .bundle_items
            .iter()
            .filter(|l| l.record.item_id == item_id)
            .filter_map(|l| self.data.bundles.get(&l.bundle_id))
            .collect()
    }

    /// Persist a new bundle with its initial links.
    ///
    /// At most one link per item is kept; later duplicates are dropped.
    pub fn create_bundle(
        &mut self,
        bundle: ReleaseBundle,
        links: Vec<BundleItemRecord>,
    ) -> ReleaseResult<()> {
        for link in &links {
            self.require_item(&link.item_id)?;
        }
        let mut seen = HashSet::new();
        let links: Vec<_> = links
            .into_iter()
            .filter(|l| seen.insert(l.item_id.clone()))
            .collect();
        let bundle_id = bundle.id.clone();
        self.data.bundle_items.extend(links.into_iter().map(|record| BundleItemLink {
            bundle_id: bundle_id.clone(),
            record,
        }));
        tracing::info!(bundle = %bundle_id, mode = bundle.mode(), "bundle created");
        self.data.bundles.insert(bundle_id, bundle);
        self.dirty = true;
        Ok(())
    }

    /// Add or replace one item's link in an unreleased bundle.
    pub fn add_bundle_item(&mut self, bundle_id: &str, record: BundleItemRecord) -> ReleaseResult<()> {
        self.require_item(&record.item_id)?;
        self.bundle_mut(bundle_id)?.ensure_mutable()?;

        self.data
            .bundle_items
            .retain(|l| !(l.bundle_id == bundle_id && l.record.item_id == record.item_id));
        self.data.bundle_items.push(BundleItemLink {
            bundle_id: bundle_id.to_string(),
            record,
        });
        self.dirty = true;
        Ok(())
    }

    /// Returns whether a link was removed.
    pub fn remove_bundle_item(&mut self, bundle_id: &str, item_id: &str) -> ReleaseResult<bool> {
        self.bundle_mut(bundle_id)?.ensure_mutable()?;

        let before = self.data.bundle_items.len();
        self.data
            .bundle_items
            .retain(|l| !(l.bundle_id == bundle_id && l.record.item_id == item_id));
        let removed = self.data.bundle_items.len() != before;
        self.dirty |= removed;
        Ok(removed)
    }

    pub fn add_trustee(&mut self, bundle_id: &str, trustee: Trustee) -> ReleaseResult<()> {
        let bundle = self.bundle_mut(bundle_id)?;
        bundle.ensure_mutable()?;
        bundle.trustees.retain(|t| t.email != trustee.email);
        bundle.trustees.push(trustee);
        self.dirty = true;
        Ok(())
    }

    /// Remove a trustee by email. Returns whether one was removed.
    pub fn remove_trustee(&mut self, bundle_id: &str, email: &str) -> ReleaseResult<bool> {
        let bundle = self.bundle_mut(bundle_id)?;
        bundle.ensure_mutable()?;
        let before = bundle.trustees.len();
        bundle.trustees.retain(|t| t.email != email);
        let removed = bundle.trustees.len() != before;
        self.dirty |= removed;
        Ok(removed)
    }

    /// Flip `released` to true. A second call fails with `AlreadyReleased`.
    pub fn release_bundle(&mut self, bundle_id: &str, now: u64) -> ReleaseResult<()> {
        self.bundle_mut(bundle_id)?.mark_released(now)?;
        self.dirty = true;
        tracing::info!(bundle = %bundle_id, "bundle released");
        Ok(())
    }

    /// Remove a bundle and its links. Items are untouched.
    pub fn delete_bundle(&mut self, bundle_id: &str) -> ReleaseResult<ReleaseBundle> {
        let bundle = self
            .data
            .bundles
            .remove(bundle_id)
            .ok_or(ReleaseError::BundleNotFound)?;
        self.data.bundle_items.retain(|l| l.bundle_id != bundle_id);
        self.dirty = true;
        tracing::info!(bundle = %bundle_id, "bundle deleted");
        Ok(bundle)
    }

    // ── release policy ──────────────────────────────────────────────────────

    /// Record an owner heartbeat on every unreleased bundle. Returns how many
    /// heartbeat bundles were touched.
    pub fn check_in(&mut self, now: u64) -> usize {
        let mut touched = 0;
        for bundle in self.data.bundles.values_mut().filter(|b| !b.released) {
            if matches!(bundle.policy, ReleasePolicy::Heartbeat { .. }) {
                bundle.policy.check_in(now);
                touched += 1;
            }
        }
        if touched > 0 {
            self.dirty = true;
            tracing::info!(bundles = touched, "heartbeat recorded");
        }
        touched
    }

    /// Ids of unreleased bundles whose policy has fired at `now`.
    pub fn due_bundles(&self, now: u64) -> Vec<String> {
        self.data
            .bundles
            .values()
            .filter(|b| b.is_due(now))
            .map(|b| b.id.clone())
            .collect()
    }

    /// Release every due bundle. Returns the released ids.
    pub fn release_due(&mut self, now: u64) -> ReleaseResult<Vec<String>> {
        let due = self.due_bundles(now);
        for id in &due {
            self.release_bundle(id, now)?;
        }
        Ok(due)
    }

    // ── trustee payload ─────────────────────────────────────────────────────

    /// Assemble the public payload for `token`.
    ///
    /// The bundle must be released. The first call opens the access window;
    /// once it has elapsed every call fails with `AccessWindowClosed`.
    pub fn release_payload(
        &mut self,
        token: &str,
        now: u64,
        window_secs: u64,
    ) -> ReleaseResult<ReleasePayload> {
        let bundle_id = self
            .bundle_by_token(token)
            .map(|b| b.id.clone())
            .ok_or(ReleaseError::BundleNotFound)?;

        let bundle = self.bundle_mut(&bundle_id)?;
        let was_fetched = bundle.first_fetched_at.is_some();
        let fetched = bundle.record_fetch(now, window_secs);
        let opened_now = !was_fetched && bundle.first_fetched_at.is_some();
        let header = bundle.payload_header();
        if opened_now {
            self.dirty = true;
            tracing::info!(bundle = %bundle_id, "release access window opened");
        }
        fetched?;

        let items = self
            .bundle_links(&bundle_id)
            .into_iter()
            .map(|link| {
                let item = self.require_item(&link.item_id)?;
                Ok(PayloadItem {
                    id: item.id.clone(),
                    name: item.name.clone(),
                    kind: item.kind,
                    size: item.size,
                    r2_key: item.r2_key.clone(),
                    bundle_wrapped_key: link.bundle_wrapped_key.clone(),
                    bundle_wrapped_key_iv: link.bundle_wrapped_key_iv.clone(),
                })
            })
            .collect::<ReleaseResult<Vec<_>>>()?;

        Ok(ReleasePayload {
            bundle: header,
            items,
        })
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.flush() {
                tracing::warn!("failed to flush ledger on drop: {e}");
            }
        }
    }
}
