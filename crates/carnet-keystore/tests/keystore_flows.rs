#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! End-to-end keystore flows over real temp directories: the daily
//! unlock cycle, lockout persistence, secret rotation, recovery, and
//! multi-device bootstrap.

use carnet_keystore::{Keystore, KeystoreError, MemoryRemoteStore};
use tempfile::TempDir;

const PIN: &str = "123456";
const NEW_PIN: &str = "654321";

#[test]
fn first_run_setup_and_daily_unlock_cycle() {
    let dir = TempDir::new().unwrap();

    let mut ks = Keystore::open(dir.path()).unwrap();
    assert!(!ks.status().configured);

    ks.setup(PIN).unwrap();
    let blob = ks.encrypt(b"my first note").unwrap();

    // App closes and reopens: fresh keystore over the same directory.
    drop(ks);
    let mut ks = Keystore::open(dir.path()).unwrap();
    assert!(ks.status().configured);
    assert!(!ks.is_unlocked());

    ks.unlock(PIN).unwrap();
    assert_eq!(ks.decrypt(&blob).unwrap(), b"my first note");
}

#[test]
fn lockout_blocks_correct_pin_and_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let mut ks = Keystore::open(dir.path()).unwrap();
        ks.setup(PIN).unwrap();
        ks.lock();

        for attempt in 1..=4u32 {
            match ks.unlock("000000").expect_err("wrong pin") {
                KeystoreError::WrongSecret { attempts_remaining } => {
                    assert_eq!(attempts_remaining, 5 - attempt);
                }
                other => panic!("expected WrongSecret, got {other:?}"),
            }
        }
        // Fifth failure starts the window.
        assert!(matches!(
            ks.unlock("000000").expect_err("wrong pin"),
            KeystoreError::Locked { .. }
        ));
        // Even the correct pin is refused now.
        assert!(matches!(
            ks.unlock(PIN).expect_err("locked"),
            KeystoreError::Locked { .. }
        ));
    }

    // Restart does not reset the window.
    let mut ks = Keystore::open(dir.path()).unwrap();
    let status = ks.status();
    assert!(status.locked_for_secs.is_some());
    assert!(matches!(
        ks.unlock(PIN).expect_err("still locked"),
        KeystoreError::Locked { .. }
    ));
}

#[test]
fn change_pin_migrates_existing_notes() {
    let dir = TempDir::new().unwrap();
    let mut ks = Keystore::open(dir.path()).unwrap();
    ks.setup(PIN).unwrap();

    let notes: Vec<String> = ["groceries", "meeting minutes", "journal"]
        .iter()
        .map(|text| ks.encrypt(text.as_bytes()).unwrap())
        .collect();

    let rotation = ks.change_secret(PIN, NEW_PIN).unwrap();
    let migrated: Vec<String> = notes
        .iter()
        .map(|blob| rotation.reencrypt(blob).unwrap())
        .collect();

    // Pre-rotation blobs are dead under the live key.
    for blob in &notes {
        assert!(matches!(
            ks.decrypt(blob),
            Err(KeystoreError::DecryptionFailed)
        ));
    }

    // Migrated blobs open after a full lock/unlock with the new pin.
    ks.lock();
    assert!(ks.unlock(PIN).is_err());
    ks.unlock(NEW_PIN).unwrap();
    assert_eq!(ks.decrypt(&migrated[0]).unwrap(), b"groceries");
    assert_eq!(ks.decrypt(&migrated[2]).unwrap(), b"journal");
}

#[test]
fn recovery_code_works_after_forgotten_pin() {
    let dir = TempDir::new().unwrap();
    let mut ks = Keystore::open(dir.path()).unwrap();
    ks.setup(PIN).unwrap();
    let blob = ks.encrypt(b"do not lose this").unwrap();
    let code = ks.generate_recovery().unwrap();

    // User forgets the pin; app restarts.
    drop(ks);
    let mut ks = Keystore::open(dir.path()).unwrap();

    // Sloppy entry still decodes: lowercase, no dashes, padded.
    let sloppy = format!("  {}  ", code.to_lowercase().replace('-', ""));
    ks.unlock_with_recovery(&sloppy).unwrap();
    assert_eq!(ks.decrypt(&blob).unwrap(), b"do not lose this");

    // Set a new pin and confirm the old code is gone.
    let rotation = ks.rotate_secret(NEW_PIN).unwrap();
    let migrated = rotation.reencrypt(&blob).unwrap();
    ks.lock();
    assert!(matches!(
        ks.unlock_with_recovery(&code),
        Err(KeystoreError::RecoveryNotConfigured)
    ));
    ks.unlock(NEW_PIN).unwrap();
    assert_eq!(ks.decrypt(&migrated).unwrap(), b"do not lose this");
}

#[test]
fn signing_in_adopts_local_records_into_account_scope() {
    let dir = TempDir::new().unwrap();

    // Anonymous usage first.
    let blob = {
        let mut ks = Keystore::open(dir.path()).unwrap();
        ks.setup(PIN).unwrap();
        ks.encrypt(b"pre-signin note").unwrap()
    };

    // Sign-in: same directory, now account-scoped. Existing records move.
    let mut ks = Keystore::open_for_account(dir.path(), "user-42").unwrap();
    assert!(ks.status().configured);
    ks.unlock(PIN).unwrap();
    assert_eq!(ks.decrypt(&blob).unwrap(), b"pre-signin note");

    // Adoption is one-way: the plain local scope is empty afterwards.
    let local = Keystore::open(dir.path()).unwrap();
    assert!(!local.status().configured);
}

#[test]
fn accounts_on_one_device_are_isolated() {
    let dir = TempDir::new().unwrap();

    let mut alice = Keystore::open_for_account(dir.path(), "alice").unwrap();
    alice.setup(PIN).unwrap();
    alice.lock();
    for _ in 0..5 {
        let _ = alice.unlock("000000").expect_err("wrong pin");
    }

    // Alice's lockout and records do not bleed into Bob's namespace.
    let mut bob = Keystore::open_for_account(dir.path(), "bob").unwrap();
    assert!(!bob.status().configured);
    bob.setup(NEW_PIN).unwrap();
    assert!(bob.is_unlocked());
}

#[test]
fn new_device_bootstraps_from_remote_and_derives_the_same_key() {
    let remote = MemoryRemoteStore::new();

    // Device A: enroll with the backend attached — setup publishes.
    let device_a = TempDir::new().unwrap();
    let blob = {
        let mut ks = Keystore::open_for_account(device_a.path(), "alice").unwrap();
        ks.attach_remote(Box::new(remote.clone()));
        ks.setup(PIN).unwrap();
        ks.encrypt(b"synced note").unwrap()
    };

    // Device B: empty directory, records fetched from the backend.
    let device_b = TempDir::new().unwrap();
    let mut ks = Keystore::open_for_account(device_b.path(), "alice").unwrap();
    ks.attach_remote(Box::new(remote.clone()));
    assert!(!ks.status().configured);
    ks.bootstrap_from_remote().unwrap();
    assert!(ks.status().configured);

    // Same secret, same salt, same key: device A's blob opens here.
    ks.unlock(PIN).unwrap();
    assert_eq!(ks.decrypt(&blob).unwrap(), b"synced note");

    // And the wrong pin is still just wrong.
    ks.lock();
    assert!(matches!(
        ks.unlock("000000").expect_err("wrong pin"),
        KeystoreError::WrongSecret { .. }
    ));
}

#[test]
fn pin_change_republishes_so_other_devices_get_the_new_credentials() {
    let remote = MemoryRemoteStore::new();

    // Device A: enroll, then rotate the pin and migrate a note.
    let device_a = TempDir::new().unwrap();
    let migrated = {
        let mut ks = Keystore::open_for_account(device_a.path(), "alice").unwrap();
        ks.attach_remote(Box::new(remote.clone()));
        ks.setup(PIN).unwrap();
        let blob = ks.encrypt(b"synced note").unwrap();
        let rotation = ks.change_secret(PIN, NEW_PIN).unwrap();
        rotation.reencrypt(&blob).unwrap()
    };

    // Device B bootstraps after the rotation: only the new pin works, and
    // its key opens the migrated note.
    let device_b = TempDir::new().unwrap();
    let mut ks = Keystore::open_for_account(device_b.path(), "alice").unwrap();
    ks.attach_remote(Box::new(remote.clone()));
    ks.bootstrap_from_remote().unwrap();

    assert!(matches!(
        ks.unlock(PIN).expect_err("pre-rotation pin"),
        KeystoreError::WrongSecret { .. }
    ));
    ks.unlock(NEW_PIN).unwrap();
    assert_eq!(ks.decrypt(&migrated).unwrap(), b"synced note");
}

#[test]
fn bootstrap_never_overwrites_existing_local_records() {
    let remote = MemoryRemoteStore::new();

    // Backend holds records from some other enrollment.
    {
        let other = TempDir::new().unwrap();
        let mut ks = Keystore::open_for_account(other.path(), "alice").unwrap();
        ks.attach_remote(Box::new(remote.clone()));
        ks.setup("999999").unwrap();
    }

    // This device already has its own records for the account.
    let dir = TempDir::new().unwrap();
    let mut ks = Keystore::open_for_account(dir.path(), "alice").unwrap();
    ks.attach_remote(Box::new(remote.clone()));
    ks.setup(PIN).unwrap();
    ks.lock();

    ks.bootstrap_from_remote().unwrap();
    // Local enrollment still wins.
    ks.unlock(PIN).unwrap();
}

#[test]
fn unreachable_backend_surfaces_storage_unavailable() {
    let remote = MemoryRemoteStore::new();
    remote.set_offline(true);

    let dir = TempDir::new().unwrap();
    let mut ks = Keystore::open_for_account(dir.path(), "alice").unwrap();
    ks.attach_remote(Box::new(remote.clone()));

    // Setup succeeds locally even though the automatic push fails...
    ks.setup(PIN).unwrap();
    assert!(ks.is_unlocked());

    // ...and the explicit retry surfaces the transport failure.
    assert!(matches!(
        ks.publish_to_remote(),
        Err(KeystoreError::StorageUnavailable(_))
    ));

    // Once the backend is reachable again the retry lands the records.
    remote.set_offline(false);
    ks.publish_to_remote().unwrap();
}

#[test]
fn remote_operations_require_account_scope() {
    let dir = TempDir::new().unwrap();
    let mut ks = Keystore::open(dir.path()).unwrap();
    ks.attach_remote(Box::new(MemoryRemoteStore::new()));
    ks.setup(PIN).unwrap();

    assert!(matches!(
        ks.publish_to_remote(),
        Err(KeystoreError::InvalidInput(_))
    ));
}

#[test]
fn publish_without_attached_remote_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut ks = Keystore::open_for_account(dir.path(), "alice").unwrap();
    ks.setup(PIN).unwrap();

    assert!(matches!(
        ks.publish_to_remote(),
        Err(KeystoreError::StorageUnavailable(_))
    ));
}
