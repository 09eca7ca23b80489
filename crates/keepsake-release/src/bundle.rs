//! Release bundles.
//!
//! `released` moves false → true once. While it is false, items and trustees may
//! change; afterwards every membership mutation is refused with `BundleFrozen`.

use keepsake_core::types::{PayloadBundle, ReleasePolicy, Trustee};
use serde::{Deserialize, Serialize};

use crate::error::{ReleaseError, ReleaseResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBundle {
    pub id: String,
    pub name: String,
    pub policy: ReleasePolicy,
    /// The only secret a trustee needs. Stored so the owner can re-share it.
    pub release_token: String,
    pub bundle_note_encrypted: Option<String>,
    #[serde(rename = "bundleNoteIV")]
    pub bundle_note_iv: Option<String>,
    #[serde(default)]
    pub trustees: Vec<Trustee>,
    #[serde(default)]
    pub released: bool,
    pub released_at: Option<u64>,
    /// Start of the trustee access window
    pub first_fetched_at: Option<u64>,
    pub created_at: u64,
}

impl ReleaseBundle {
    /// Fails with `BundleFrozen` once the bundle is released.
    pub fn ensure_mutable(&self) -> ReleaseResult<()> {
        if self.released {
            return Err(ReleaseError::BundleFrozen(self.id.clone()));
        }
        Ok(())
    }

    /// Unreleased and its policy has fired.
    pub fn is_due(&self, now: u64) -> bool {
        !self.released && self.policy.is_due(now)
    }

    /// Compare-and-swap `released` from false to true.
    pub fn mark_released(&mut self, now: u64) -> ReleaseResult<()> {
        if self.released {
            return Err(ReleaseError::AlreadyReleased(self.id.clone()));
        }
        self.released = true;
        self.released_at = Some(now);
        Ok(())
    }

    /// Record a trustee fetch and check the access window.
    ///
    /// The first fetch opens a window of `window_secs`; fetches at or past its
    /// end fail with `AccessWindowClosed`.
    pub fn record_fetch(&mut self, now: u64, window_secs: u64) -> ReleaseResult<()> {
        if !self.released {
            return Err(ReleaseError::NotReleased);
        }
        let opened = *self.first_fetched_at.get_or_insert(now);
        if now >= opened.saturating_add(window_secs) {
            return Err(ReleaseError::AccessWindowClosed);
        }
        Ok(())
    }

    pub fn payload_header(&self) -> PayloadBundle {
        PayloadBundle {
            name: self.name.clone(),
            bundle_note_encrypted: self.bundle_note_encrypted.clone(),
            bundle_note_iv: self.bundle_note_iv.clone(),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self.policy {
            ReleasePolicy::TimeLock { .. } => "time-lock",
            ReleasePolicy::Heartbeat { .. } => "heartbeat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(policy: ReleasePolicy) -> ReleaseBundle {
        ReleaseBundle {
            id: "b1".into(),
            name: "For the kids".into(),
            policy,
            release_token: "tok".into(),
            bundle_note_encrypted: None,
            bundle_note_iv: None,
            trustees: vec![],
            released: false,
            released_at: None,
            first_fetched_at: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_release_is_monotonic() {
        let mut b = bundle(ReleasePolicy::TimeLock { release_date: 10 });
        assert!(b.ensure_mutable().is_ok());

        b.mark_released(20).unwrap();
        assert_eq!(b.released_at, Some(20));
        assert!(matches!(b.mark_released(30), Err(ReleaseError::AlreadyReleased(_))));
        assert_eq!(b.released_at, Some(20));
        assert!(matches!(b.ensure_mutable(), Err(ReleaseError::BundleFrozen(_))));
    }

    #[test]
    fn test_released_bundle_is_never_due() {
        let mut b = bundle(ReleasePolicy::TimeLock { release_date: 10 });
        assert!(b.is_due(10));
        b.mark_released(10).unwrap();
        assert!(!b.is_due(11));
    }

    #[test]
    fn test_access_window_starts_at_first_fetch() {
        let mut b = bundle(ReleasePolicy::TimeLock { release_date: 0 });
        assert!(matches!(b.record_fetch(5, 100), Err(ReleaseError::NotReleased)));
        assert_eq!(b.first_fetched_at, None);

        b.mark_released(0).unwrap();
        b.record_fetch(1_000, 100).unwrap();
        b.record_fetch(1_099, 100).unwrap();
        assert_eq!(b.first_fetched_at, Some(1_000));
        assert!(matches!(
            b.record_fetch(1_100, 100),
            Err(ReleaseError::AccessWindowClosed)
        ));
    }

    #[test]
    fn test_serde_field_names() {
        let mut b = bundle(ReleasePolicy::TimeLock { release_date: 7 });
        b.bundle_note_iv = Some("aa".into());
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["releaseToken"], "tok");
        assert_eq!(json["bundleNoteIV"], "aa");
        assert_eq!(json["policy"]["mode"], "time-lock");
    }
}
