//! Exercises the real kernel keyring through the process keyring.
//!
//! Container seccomp profiles commonly block the keyctl family; every test
//! returns early when the facility cannot be reached.

use apikey_keyring::core::kernel::KernelBackend;
use apikey_keyring::core::{
    CredentialStore, Handle, KeyType, Keyring, KeyringLayout, Plaintext, PruneOptions, SpecialKeyring,
};
use apikey_keyring::models::credential::{ApiKeyAlgorithm, CredentialRecord};
use apikey_keyring::KeyringError;
use std::sync::Arc;
use std::time::Duration;

fn process_keyring() -> Option<Keyring> {
    match Keyring::special(Arc::new(KernelBackend::new()), SpecialKeyring::Process) {
        Ok(ring) => Some(ring),
        Err(e) => {
            eprintln!("kernel keyring unavailable, skipping: {}", e);
            None
        }
    }
}

/// A fresh keyring under the process keyring, unique to this test.
fn scratch(name: &str) -> Option<Keyring> {
    let root = process_keyring()?;
    let ring = root
        .add_keyring(&format!("apikey-keyring-test-{}-{}", std::process::id(), name))
        .unwrap();
    ring.clear().unwrap();
    Some(ring)
}

fn record(id: i64, expiry: i64) -> CredentialRecord {
    CredentialRecord {
        username: "admin".into(),
        record_id: id,
        algorithm: ApiKeyAlgorithm::Sha512,
        iteration_count: 500_000,
        expiry,
        salt: "c2FsdA==".into(),
        server_key: "c2VydmVy".into(),
        stored_key: "c3RvcmVk".into(),
    }
}

#[test]
fn test_key_roundtrip() {
    let Some(ring) = scratch("roundtrip") else { return };
    let key = ring.add_key("secret", b"payload").unwrap();
    assert_eq!(key.key_type(), KeyType::User);
    assert_eq!(key.description(), "secret");
    assert!(key.uid().is_some());
    assert_eq!(key.read_payload().unwrap().as_slice(), b"payload");

    match ring.search(KeyType::User, "secret").unwrap() {
        Handle::Key(found) => assert_eq!(found.serial(), key.serial()),
        Handle::Keyring(_) => panic!("expected a leaf key"),
    }
    ring.invalidate().unwrap();
}

#[test]
fn test_search_miss_is_not_found() {
    let Some(ring) = scratch("miss") else { return };
    assert!(ring.search(KeyType::User, "absent").unwrap_err().is_not_found());
    ring.invalidate().unwrap();
}

#[test]
fn test_revoked_key_is_pruned() {
    let Some(ring) = scratch("revoke") else { return };
    let live = ring.add_key("live", b"x").unwrap();
    let dead = ring.add_key("dead", b"x").unwrap();
    dead.revoke().unwrap();
    assert!(dead.read_payload().unwrap_err().is_not_found());

    let seen: Vec<_> = ring
        .iter(PruneOptions::prune_all())
        .unwrap()
        .map(|h| h.unwrap().serial())
        .collect();
    assert_eq!(seen, vec![live.serial()]);
    assert_eq!(ring.child_serials().unwrap(), vec![live.serial()]);
    ring.invalidate().unwrap();
}

#[test]
fn test_expired_key_is_pruned() {
    let Some(ring) = scratch("expire") else { return };
    let live = ring.add_key("live", b"x").unwrap();
    let doomed = ring.add_key("doomed", b"x").unwrap();
    doomed.set_expiry(Duration::from_secs(1)).unwrap();
    std::thread::sleep(Duration::from_millis(2100));

    let seen: Vec<_> = ring
        .list(PruneOptions::prune_all())
        .unwrap()
        .iter()
        .map(|h| h.serial())
        .collect();
    assert_eq!(seen, vec![live.serial()]);
    ring.invalidate().unwrap();
}

#[test]
fn test_create_key_rejects_keyring_kind() {
    let Some(ring) = scratch("kind") else { return };
    let err = apikey_keyring::core::handle::create_key(KeyType::Keyring, "nested", b"", &ring).unwrap_err();
    assert!(matches!(err, KeyringError::InvalidArgument(_)));
    ring.invalidate().unwrap();
}

#[test]
fn test_lifecycle_on_kernel() {
    let Some(ring) = scratch("lifecycle") else { return };
    let store = CredentialStore::new(ring.clone(), KeyringLayout::default());
    store.commit("admin", &[record(1, 0), record(2, -1)], &Plaintext).unwrap();
    assert_eq!(store.dump("admin", &Plaintext).unwrap(), vec![record(1, 0)]);

    store.commit("admin", &[record(3, 0)], &Plaintext).unwrap();
    assert_eq!(store.dump("admin", &Plaintext).unwrap(), vec![record(3, 0)]);
    assert_eq!(store.users().unwrap(), vec!["admin".to_string()]);

    assert_eq!(store.clear_all().unwrap(), 1);
    assert!(store.dump("admin", &Plaintext).unwrap().is_empty());
    ring.invalidate().unwrap();
}
