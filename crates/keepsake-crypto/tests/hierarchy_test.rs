//! End-to-end key hierarchy: owner enrollment, item sealing, bundle re-wrap and
//! token-only disclosure.

use keepsake_core::types::UserKeyRecord;
use keepsake_crypto::{
    decrypt, derive_bundle_key, derive_bundle_keys, encrypt, rewrap_for_bundle, seal_bundle_note,
    CryptoError, KdfParams, SessionState, TrusteeOpener, UnlockOutcome, VaultSession, WrappedKey,
};
use secrecy::SecretString;

const PASSPHRASE: &str = "Correct-Horse-1!";
const TOKEN: &str = "tok-abc123";

fn unlocked_session() -> (VaultSession, UserKeyRecord) {
    let mut session = VaultSession::new(KdfParams { iterations: 2_000 }, 8);
    match session
        .unlock(&SecretString::from(PASSPHRASE), &UserKeyRecord::default())
        .unwrap()
    {
        UnlockOutcome::Enrolled(record) => (session, record),
        UnlockOutcome::Unlocked => panic!("empty record must enroll"),
    }
}

#[test]
fn owner_note_is_readable_by_token_holder() {
    let (mut session, record) = unlocked_session();

    // Upload the note; persist only the envelope and wrapped key.
    let sealed = session.seal_item(b"Hello").unwrap();
    let (wrapped_item_key, wrapped_item_key_iv) = sealed.wrapped.to_hex_parts();
    let stored_envelope = sealed.envelope.clone();

    // Later session: unlock from the stored user record and build bundle B1.
    session.lock();
    session
        .unlock(&SecretString::from(PASSPHRASE), &record)
        .unwrap();
    let stored =
        WrappedKey::from_hex_parts(&wrapped_item_key, &wrapped_item_key_iv, "wrappedItemKey")
            .unwrap();
    let links = rewrap_for_bundle(
        &mut session,
        &derive_bundle_key(TOKEN),
        &[("note-1".to_string(), stored)],
    )
    .unwrap();
    drop(session);

    // Trustee: only the token plus the bundle-item record and blob.
    let link = &links[0];
    let opener = TrusteeOpener::new(TOKEN).unwrap();
    let plaintext = opener
        .open_item(
            &link.bundle_wrapped_key,
            &link.bundle_wrapped_key_iv,
            &stored_envelope,
        )
        .unwrap();
    assert_eq!(plaintext, b"Hello");

    // Any single-character change to the token breaks the unwrap.
    for i in 0..TOKEN.len() {
        let mut altered: Vec<u8> = TOKEN.bytes().collect();
        altered[i] = if altered[i] == b'x' { b'y' } else { b'x' };
        let altered = String::from_utf8(altered).unwrap();

        let err = TrusteeOpener::new(&altered)
            .unwrap()
            .open_item_key(&link.bundle_wrapped_key, &link.bundle_wrapped_key_iv)
            .unwrap_err();
        assert_eq!(err, CryptoError::Decryption, "token variant {altered}");
    }
}

#[test]
fn one_item_in_two_bundles_unwraps_independently() {
    let (mut session, _) = unlocked_session();
    let sealed = session.seal_item(b"shared document").unwrap();
    let items = [("doc".to_string(), sealed.wrapped.clone())];

    let first = rewrap_for_bundle(&mut session, &derive_bundle_key("bundle-one"), &items).unwrap();
    let second = rewrap_for_bundle(&mut session, &derive_bundle_key("bundle-two"), &items).unwrap();
    assert_ne!(first[0].bundle_wrapped_key, second[0].bundle_wrapped_key);

    // Corrupt the first bundle's record; the second is unaffected.
    let mut corrupted = first[0].clone();
    let mut bytes = hex::decode(&corrupted.bundle_wrapped_key).unwrap();
    bytes[0] ^= 0x01;
    corrupted.bundle_wrapped_key = hex::encode(bytes);
    assert_ne!(corrupted.bundle_wrapped_key, first[0].bundle_wrapped_key);
    let one = TrusteeOpener::new("bundle-one").unwrap();
    let two = TrusteeOpener::new("bundle-two").unwrap();

    assert_eq!(
        one.open_item(
            &corrupted.bundle_wrapped_key,
            &corrupted.bundle_wrapped_key_iv,
            &sealed.envelope
        )
        .unwrap_err(),
        CryptoError::Decryption
    );
    assert_eq!(
        two.open_item(
            &second[0].bundle_wrapped_key,
            &second[0].bundle_wrapped_key_iv,
            &sealed.envelope
        )
        .unwrap(),
        b"shared document"
    );

    // Keys from the wrong token are not interchangeable.
    assert_eq!(
        one.open_item_key(&second[0].bundle_wrapped_key, &second[0].bundle_wrapped_key_iv)
            .unwrap_err(),
        CryptoError::Decryption
    );
}

#[test]
fn recovered_item_key_decrypts_same_as_original() {
    let (mut session, _) = unlocked_session();
    let grant = session.item_key(None).unwrap();
    let wrapped = grant.created.clone().unwrap();
    let envelope = encrypt(b"payload", &grant.key).unwrap();

    let links =
        rewrap_for_bundle(&mut session, &derive_bundle_key(TOKEN), &[("x".into(), wrapped)])
            .unwrap();
    let recovered = TrusteeOpener::new(TOKEN)
        .unwrap()
        .open_item_key(&links[0].bundle_wrapped_key, &links[0].bundle_wrapped_key_iv)
        .unwrap();

    assert_eq!(decrypt(&envelope, &recovered).unwrap(), b"payload");
}

#[test]
fn locked_session_refuses_item_operations() {
    let (mut session, _) = unlocked_session();
    let (_, wrapped) = session.new_item_key().unwrap();
    session.lock();
    assert_eq!(session.state(), SessionState::Locked);

    assert_eq!(session.open_item_key(&wrapped).unwrap_err(), CryptoError::VaultLocked);
    assert_eq!(session.item_key(None).unwrap_err(), CryptoError::VaultLocked);
    assert_eq!(
        rewrap_for_bundle(&mut session, &derive_bundle_key(TOKEN), &[("x".into(), wrapped)])
            .unwrap_err(),
        CryptoError::VaultLocked
    );
}

#[test]
fn bundle_note_opens_with_token_only() {
    let keys = derive_bundle_keys(TOKEN).unwrap();
    let (ciphertext, iv) = seal_bundle_note(&keys.note, "Passwords are in the blue folder.").unwrap();
    drop(keys);

    let note = TrusteeOpener::new(TOKEN)
        .unwrap()
        .open_note(&ciphertext, &iv)
        .unwrap();
    assert_eq!(note, "Passwords are in the blue folder.");
}

#[test]
fn user_record_serializes_with_contract_field_names() {
    let (_, record) = unlocked_session();
    let json = serde_json::to_value(&record).unwrap();
    assert!(json.get("dataKeySalt").is_some());
    assert!(json.get("wrappedDataKey").is_some());
    assert!(json.get("wrappedDataKeyIV").is_some());
}
