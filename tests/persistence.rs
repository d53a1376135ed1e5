//! Cross-instance persistence integration tests.

mod common;

use std::sync::Arc;

use serde_json::json;

use credvault::{
    open, AppKey, FsStore, InitializeOptions, MemoryStore, OpenOptions, RecordDraft, UnlockOptions,
};

fn draft() -> RecordDraft {
    RecordDraft {
        title: "persistent".to_string(),
        entry: json!({"kind": "login", "username": "alice", "password": "s3cret"}),
        ..RecordDraft::default()
    }
}

#[tokio::test]
async fn records_survive_across_instances() {
    let root = common::temp_root();
    let app_key = AppKey::generate();

    let record = {
        let store = Arc::new(FsStore::open(&root).expect("fs store"));
        let datastore = open(store, OpenOptions::default()).await.expect("open");
        datastore
            .initialize(InitializeOptions {
                app_key: Some(app_key.clone()),
                ..InitializeOptions::default()
            })
            .await
            .expect("initialize");
        datastore
            .unlock(UnlockOptions::with_app_key(app_key.clone()))
            .await
            .expect("unlock");
        datastore.add(draft()).await.expect("add")
    };

    let store = Arc::new(FsStore::open(&root).expect("fs store"));
    let datastore = open(store, OpenOptions::default()).await.expect("open");
    assert!(datastore.is_initialized().await);

    datastore
        .unlock(UnlockOptions::with_app_key(app_key))
        .await
        .expect("unlock");
    let fetched = datastore
        .get(&record.id)
        .await
        .expect("get")
        .expect("record present");
    assert_eq!(fetched, record);

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn passphrase_unlock_survives_across_instances() {
    let root = common::temp_root();

    {
        let store = Arc::new(FsStore::open(&root).expect("fs store"));
        let datastore = open(store, OpenOptions::default()).await.expect("open");
        datastore
            .initialize(InitializeOptions {
                passphrase: Some("long walks on the beach".to_string()),
                ..InitializeOptions::default()
            })
            .await
            .expect("initialize");
        datastore
            .unlock(UnlockOptions::with_passphrase("long walks on the beach"))
            .await
            .expect("unlock");
        datastore.add(draft()).await.expect("add");
    }

    // The persisted salt makes the same passphrase derive the same key.
    let store = Arc::new(FsStore::open(&root).expect("fs store"));
    let datastore = open(store, OpenOptions::default()).await.expect("open");
    datastore
        .unlock(UnlockOptions::with_passphrase("long walks on the beach"))
        .await
        .expect("unlock");
    assert_eq!(datastore.list().await.expect("list").len(), 1);

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn exported_key_blob_seeds_a_fresh_store() {
    let app_key = AppKey::generate();

    let source = open(Arc::new(MemoryStore::new()), OpenOptions::default())
        .await
        .expect("open");
    source
        .initialize(InitializeOptions {
            app_key: Some(app_key.clone()),
            ..InitializeOptions::default()
        })
        .await
        .expect("initialize");
    let blob = source
        .encrypted_keys()
        .await
        .expect("export")
        .expect("blob present");

    let target = open(
        Arc::new(MemoryStore::new()),
        OpenOptions {
            keys: Some(blob),
            ..OpenOptions::default()
        },
    )
    .await
    .expect("open");
    assert!(target.is_initialized().await);

    target
        .unlock(UnlockOptions::with_app_key(app_key))
        .await
        .expect("unlock seeded store");
    assert!(target.list().await.expect("list").is_empty());
}

#[tokio::test]
async fn reset_wipes_the_filesystem_store() {
    let root = common::temp_root();

    let store = Arc::new(FsStore::open(&root).expect("fs store"));
    let datastore = open(store.clone(), OpenOptions::default())
        .await
        .expect("open");
    datastore
        .initialize(InitializeOptions::default())
        .await
        .expect("initialize");
    datastore
        .unlock(UnlockOptions::default())
        .await
        .expect("unlock");
    datastore.add(draft()).await.expect("add");

    datastore.reset().await.expect("reset");
    assert!(!datastore.is_initialized().await);

    // A new instance against the same directory sees nothing.
    let reopened = open(
        Arc::new(FsStore::open(&root).expect("fs store")),
        OpenOptions::default(),
    )
    .await
    .expect("open");
    assert!(!reopened.is_initialized().await);

    let _ = std::fs::remove_dir_all(&root);
}
