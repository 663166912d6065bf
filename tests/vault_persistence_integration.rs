mod common;

use lockbox::crypto::content_hash;
use lockbox::record::{Metadata, Payload, Query, RecordType};
use lockbox::{Error, Vault};
use std::fs::{self, OpenOptions};
use std::io::Write;
use tempfile::TempDir;

#[test]
fn test_hello_survives_restart_and_is_encrypted_on_disk() {
    let dir = TempDir::new().unwrap();
    let config = common::vault_config(dir.path());

    {
        let mut vault = Vault::open(&config, "correct horse").unwrap();
        vault.add_text("hello", Metadata::new()).unwrap();
    }

    let on_disk = fs::read_to_string(config.storage.log_path()).unwrap();
    assert_eq!(on_disk.lines().count(), 1);
    assert!(!on_disk.contains("hello"));

    let vault = Vault::open(&config, "correct horse").unwrap();
    let texts = vault.list(RecordType::Text);
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].payload, Payload::text("hello"));
}

#[test]
fn test_local_ids_continue_after_restart() {
    let dir = TempDir::new().unwrap();
    let config = common::vault_config(dir.path());

    {
        let mut vault = Vault::open(&config, "pw").unwrap();
        for i in 0..5 {
            vault.add_text(format!("note {}", i), Metadata::new()).unwrap();
        }
        assert!(vault.get(-5).is_ok());
    }

    let mut vault = Vault::open(&config, "pw").unwrap();
    assert_eq!(vault.add_text("sixth", Metadata::new()).unwrap(), -6);
}

#[test]
fn test_compaction_keeps_latest_version_only() {
    let dir = TempDir::new().unwrap();
    let config = common::vault_config(dir.path());

    let mut vault = Vault::open(&config, "pw").unwrap();
    let id = vault.add_credential("me", "v1", Metadata::new()).unwrap();
    for password in ["v2", "v3"] {
        let mut record = vault.get(id).unwrap().clone();
        record.payload = Payload::credential("me", password);
        vault.update(record).unwrap();
    }
    assert_eq!(
        fs::read_to_string(config.storage.log_path()).unwrap().lines().count(),
        3
    );

    assert_eq!(vault.save().unwrap(), 1);
    drop(vault);

    let vault = Vault::open(&config, "pw").unwrap();
    assert_eq!(vault.get(id).unwrap().payload, Payload::credential("me", "v3"));
}

#[test]
fn test_corrupt_log_line_is_skipped() {
    let dir = TempDir::new().unwrap();
    let config = common::vault_config(dir.path());

    {
        let mut vault = Vault::open(&config, "pw").unwrap();
        vault.add_text("first", Metadata::new()).unwrap();
    }
    let mut log = OpenOptions::new()
        .append(true)
        .open(config.storage.log_path())
        .unwrap();
    writeln!(log, "{{\"id\":-9,\"data\":\"truncated").unwrap();
    drop(log);

    let mut vault = Vault::open(&config, "pw").unwrap();
    assert_eq!(vault.store().len(), 1);
    vault.add_text("second", Metadata::new()).unwrap();
    assert_eq!(vault.list(RecordType::Text).len(), 2);
}

#[test]
fn test_wrong_passphrase_cannot_open() {
    let dir = TempDir::new().unwrap();
    let config = common::vault_config(dir.path());
    Vault::open(&config, "right")
        .unwrap()
        .add_text("secret", Metadata::new())
        .unwrap();

    assert!(matches!(
        Vault::open(&config, "wrong"),
        Err(Error::InvalidPassphrase)
    ));
}

#[test]
fn test_tampered_blob_fails_integrity() {
    let dir = TempDir::new().unwrap();
    let config = common::vault_config(dir.path());
    let mut vault = Vault::open(&config, "pw").unwrap();

    let id = vault.add_file("a.txt", b"original", Metadata::new()).unwrap();
    let key = content_hash(b"original");
    let blob_path = config.storage.blob_path().join(key.as_str());
    assert!(!fs::read_to_string(&blob_path).unwrap().contains("original"));

    // Swap in a validly encrypted blob of different content
    let other = vault.blobs().save(b"forged").unwrap();
    fs::copy(config.storage.blob_path().join(other.as_str()), &blob_path).unwrap();

    let err = vault.read_file(id).unwrap_err();
    assert!(err.is_integrity());
}

#[test]
fn test_metadata_filters_are_conjunctive() {
    let dir = TempDir::new().unwrap();
    let mut vault = Vault::open(&common::vault_config(dir.path()), "pw").unwrap();

    let tags = |pairs: &[(&str, &str)]| -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    };
    let both = vault
        .add_credential("u", "p", tags(&[("site", "bank"), ("owner", "me")]))
        .unwrap();
    vault
        .add_credential("u2", "p2", tags(&[("site", "bank")]))
        .unwrap();
    vault.add_text("n", tags(&[("owner", "me")])).unwrap();

    let hits = vault.query(
        &Query::new(RecordType::Credential)
            .filter("site", "bank")
            .filter("owner", "me"),
    );
    assert_eq!(hits.iter().map(|r| r.id).collect::<Vec<_>>(), vec![both]);

    let any_me = vault.query(&Query::new(RecordType::Any).any_value("me"));
    assert_eq!(any_me.len(), 2);
}
