//! Owner and trustee workflows.
//!
//! Owner side needs an unlocked [`VaultSession`]; the trustee side needs only a
//! release token, the public payload, and read access to the blob store.

use std::collections::HashSet;

use keepsake_core::types::{ItemKind, ItemRecord, ReleasePayload, ReleasePolicy, Trustee};
use keepsake_crypto::{
    derive_bundle_key, derive_bundle_keys, generate_release_token, rewrap_for_bundle,
    seal_bundle_note, TrusteeOpener, VaultSession, WrappedKey,
};
use keepsake_storage::BlobStore;

use crate::bundle::ReleaseBundle;
use crate::error::{ReleaseError, ReleaseResult};
use crate::ledger::Ledger;
use crate::now_secs;

fn wrapped_item_key(item: &ItemRecord) -> ReleaseResult<WrappedKey> {
    Ok(WrappedKey::from_hex_parts(
        &item.wrapped_item_key,
        &item.wrapped_item_key_iv,
        "wrappedItemKey",
    )?)
}

/// Encrypt `plaintext` as a new item, upload its envelope, and record it.
pub async fn store_item(
    session: &mut VaultSession,
    ledger: &mut Ledger,
    blobs: &BlobStore,
    name: &str,
    kind: ItemKind,
    plaintext: &[u8],
) -> ReleaseResult<ItemRecord> {
    let sealed = session.seal_item(plaintext)?;
    let id = uuid::Uuid::new_v4().to_string();
    let version = 1;

    let r2_key = blobs
        .put(ledger.user_id(), &id, version, sealed.envelope)
        .await?;

    let (wrapped_item_key, wrapped_item_key_iv) = sealed.wrapped.to_hex_parts();
    let record = ItemRecord {
        id,
        name: name.to_string(),
        kind,
        size: plaintext.len() as u64,
        version,
        item_key_salt: sealed.salt.to_hex(),
        wrapped_item_key,
        wrapped_item_key_iv,
        r2_key,
        created_at: now_secs(),
    };
    ledger.insert_item(record.clone());
    ledger.flush()?;

    tracing::info!(item = %record.id, kind = %kind, size = record.size, "item stored");
    Ok(record)
}

/// Fetch and decrypt one of the owner's items.
pub async fn read_item(
    session: &mut VaultSession,
    ledger: &Ledger,
    blobs: &BlobStore,
    item_id: &str,
) -> ReleaseResult<Vec<u8>> {
    let item = ledger
        .item(item_id)
        .ok_or_else(|| ReleaseError::ItemNotFound(item_id.to_string()))?;
    let wrapped = wrapped_item_key(item)?;
    let envelope = blobs.get(&item.r2_key).await?;
    Ok(session.open_item(&wrapped, &envelope)?)
}

/// Delete an item record, its unreleased bundle links, and its blob.
pub async fn delete_item(
    ledger: &mut Ledger,
    blobs: &BlobStore,
    item_id: &str,
) -> ReleaseResult<ItemRecord> {
    let removed = ledger.delete_item(item_id)?;
    ledger.flush()?;
    blobs.delete(&removed.r2_key).await?;
    Ok(removed)
}

/// Parameters of a new bundle.
#[derive(Debug, Clone)]
pub struct NewBundle {
    pub name: String,
    pub policy: ReleasePolicy,
    pub item_ids: Vec<String>,
    pub trustees: Vec<Trustee>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedBundle {
    pub id: String,
    pub release_token: String,
}

/// Create a bundle: generate its token, re-wrap every selected item key under
/// the derived bundle key, seal the note, and persist.
///
/// No content is re-encrypted. Repeated item ids are linked once.
pub fn create_bundle(
    session: &mut VaultSession,
    ledger: &mut Ledger,
    request: NewBundle,
) -> ReleaseResult<CreatedBundle> {
    let mut seen = HashSet::new();
    let items = request
        .item_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .map(|id| -> ReleaseResult<(String, WrappedKey)> {
            let item = ledger
                .item(id)
                .ok_or_else(|| ReleaseError::ItemNotFound(id.clone()))?;
            Ok((id.clone(), wrapped_item_key(item)?))
        })
        .collect::<ReleaseResult<Vec<_>>>()?;

    let release_token = generate_release_token();
    let keys = derive_bundle_keys(&release_token)?;
    let links = rewrap_for_bundle(session, &keys.key, &items)?;

    let (bundle_note_encrypted, bundle_note_iv) = match &request.note {
        Some(note) => {
            let (ct, iv) = seal_bundle_note(&keys.note, note)?;
            (Some(ct), Some(iv))
        }
        None => (None, None),
    };

    let bundle = ReleaseBundle {
        id: uuid::Uuid::new_v4().to_string(),
        name: request.name,
        policy: request.policy,
        release_token: release_token.clone(),
        bundle_note_encrypted,
        bundle_note_iv,
        trustees: request.trustees,
        released: false,
        released_at: None,
        first_fetched_at: None,
        created_at: now_secs(),
    };
    let id = bundle.id.clone();
    ledger.create_bundle(bundle, links)?;
    ledger.flush()?;

    Ok(CreatedBundle { id, release_token })
}

/// Add one item to an unreleased bundle by re-wrapping its key under the
/// bundle's key.
pub fn add_item_to_bundle(
    session: &mut VaultSession,
    ledger: &mut Ledger,
    bundle_id: &str,
    item_id: &str,
) -> ReleaseResult<()> {
    let bundle = ledger.bundle(bundle_id).ok_or(ReleaseError::BundleNotFound)?;
    bundle.ensure_mutable()?;
    let item = ledger
        .item(item_id)
        .ok_or_else(|| ReleaseError::ItemNotFound(item_id.to_string()))?;

    let bundle_key = derive_bundle_key(&bundle.release_token);
    let items = [(item_id.to_string(), wrapped_item_key(item)?)];
    let mut links = rewrap_for_bundle(session, &bundle_key, &items)?;

    if let Some(link) = links.pop() {
        ledger.add_bundle_item(bundle_id, link)?;
        ledger.flush()?;
    }
    Ok(())
}

/// One item as seen by a trustee.
#[derive(Debug)]
pub struct OpenedItem {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub size: u64,
    /// Plaintext, or `ItemInaccessible`
    pub content: ReleaseResult<Vec<u8>>,
}

#[derive(Debug)]
pub struct OpenedBundle {
    pub name: String,
    /// `None` when the bundle has no note
    pub note: Option<ReleaseResult<String>>,
    pub items: Vec<OpenedItem>,
}

/// Trustee side: open every item of a release payload with the token alone.
///
/// Each item succeeds or fails on its own. A failed item reports only
/// `ItemInaccessible`, whether the blob, the wrapped key, or the token was at
/// fault.
pub async fn open_release(
    token: &str,
    payload: &ReleasePayload,
    blobs: &BlobStore,
) -> ReleaseResult<OpenedBundle> {
    // Token stretching is a full PBKDF2 run; keep it off the async workers.
    let owned = token.to_string();
    let opener = tokio::task::spawn_blocking(move || TrusteeOpener::new(&owned)).await??;

    let note = match (&payload.bundle.bundle_note_encrypted, &payload.bundle.bundle_note_iv) {
        (Some(ct), Some(iv)) => Some(
            opener
                .open_note(ct, iv)
                .map_err(|_| ReleaseError::NoteInaccessible),
        ),
        _ => None,
    };

    let mut items = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        let content = match blobs.get(&item.r2_key).await {
            Ok(envelope) => opener
                .open_item(&item.bundle_wrapped_key, &item.bundle_wrapped_key_iv, &envelope)
                .map_err(|_| ReleaseError::ItemInaccessible {
                    item_id: item.id.clone(),
                }),
            Err(e) => {
                tracing::debug!(item = %item.id, "blob fetch failed: {e}");
                Err(ReleaseError::ItemInaccessible {
                    item_id: item.id.clone(),
                })
            }
        };
        items.push(OpenedItem {
            id: item.id.clone(),
            name: item.name.clone(),
            kind: item.kind,
            size: item.size,
            content,
        });
    }

    let opened = items.iter().filter(|i| i.content.is_ok()).count();
    tracing::info!(items = items.len(), opened, "release opened");
    Ok(OpenedBundle {
        name: payload.bundle.name.clone(),
        note,
        items,
    })
}
