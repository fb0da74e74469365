//! Contract tests run against both KV backends.

use burrow_localstore::{KeySpace, LocalStore};
use tempfile::tempdir;

async fn open_backends() -> (tempfile::TempDir, Vec<LocalStore>) {
    let temp = tempdir().unwrap();
    let sqlite = LocalStore::open_sqlite(temp.path().join("local.db"))
        .await
        .unwrap();
    (temp, vec![LocalStore::new_memory(), sqlite])
}

#[tokio::test]
async fn point_ops_contract() {
    let (_temp, backends) = open_backends().await;
    for store in backends {
        assert!(store.get(KeySpace::ProxyHash, b"k").await.unwrap().is_none());
        assert!(!store.has(KeySpace::ProxyHash, b"k").await.unwrap());

        store.put(KeySpace::ProxyHash, b"k", b"v1").await.unwrap();
        store.put(KeySpace::ProxyHash, b"k", b"v2").await.unwrap();
        assert_eq!(
            store.get(KeySpace::ProxyHash, b"k").await.unwrap().as_deref(),
            Some(b"v2".as_ref())
        );
        assert!(store.has(KeySpace::ProxyHash, b"k").await.unwrap());

        // Keyspaces are disjoint.
        assert!(store.get(KeySpace::BlobCache, b"k").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn clear_keyspace_contract() {
    let (_temp, backends) = open_backends().await;
    for store in backends {
        store.put(KeySpace::BlobCache, b"a", b"1").await.unwrap();
        store.put(KeySpace::TreeCache, b"b", b"2").await.unwrap();

        store.clear_keyspace(KeySpace::BlobCache).await.unwrap();
        assert!(store.get(KeySpace::BlobCache, b"a").await.unwrap().is_none());
        // Other keyspaces untouched.
        assert!(store.get(KeySpace::TreeCache, b"b").await.unwrap().is_some());

        store.compact_keyspace(KeySpace::BlobCache).await.unwrap();
    }
}

#[tokio::test]
async fn clear_ephemeral_keeps_durable_keyspaces() {
    let (_temp, backends) = open_backends().await;
    for store in backends {
        store.put(KeySpace::ProxyHash, b"p", b"1").await.unwrap();
        store.put(KeySpace::CommitToTree, b"c", b"2").await.unwrap();
        store.put(KeySpace::BlobCache, b"b", b"3").await.unwrap();
        store.put(KeySpace::BlobAuxCache, b"m", b"4").await.unwrap();

        store.clear_ephemeral_caches().await.unwrap();

        assert!(store.has(KeySpace::ProxyHash, b"p").await.unwrap());
        assert!(store.has(KeySpace::CommitToTree, b"c").await.unwrap());
        assert!(!store.has(KeySpace::BlobCache, b"b").await.unwrap());
        assert!(!store.has(KeySpace::BlobAuxCache, b"m").await.unwrap());
    }
}

#[tokio::test]
async fn write_batch_applies_across_keyspaces() {
    let (_temp, backends) = open_backends().await;
    for store in backends {
        let mut batch = store.begin_write();
        batch.put(KeySpace::ProxyHash, b"p", b"1");
        batch.put(KeySpace::CommitToTree, b"c", b"2");
        batch.put(KeySpace::ProxyHash, b"p", b"3"); // last writer wins
        assert_eq!(batch.len(), 3);
        batch.flush().await.unwrap();

        assert_eq!(
            store.get(KeySpace::ProxyHash, b"p").await.unwrap().as_deref(),
            Some(b"3".as_ref())
        );
        assert_eq!(
            store
                .get(KeySpace::CommitToTree, b"c")
                .await
                .unwrap()
                .as_deref(),
            Some(b"2".as_ref())
        );
    }
}

#[tokio::test]
async fn unflushed_batch_writes_nothing() {
    let (_temp, backends) = open_backends().await;
    for store in backends {
        {
            let mut batch = store.begin_write();
            batch.put(KeySpace::ProxyHash, b"p", b"1");
            // Dropped without flush.
        }
        assert!(store.get(KeySpace::ProxyHash, b"p").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn failed_flush_leaves_no_partial_keys() {
    let temp = tempdir().unwrap();
    let store = LocalStore::open_sqlite(temp.path().join("local.db"))
        .await
        .unwrap();

    let mut batch = store.begin_write();
    batch.put(KeySpace::ProxyHash, b"p", b"1");
    batch.put(KeySpace::CommitToTree, b"c", b"2");

    // Closing the store makes the flush fail mid-transaction.
    store.close().await;
    assert!(batch.flush().await.is_err());

    // Reopen and verify nothing became visible.
    let store = LocalStore::open_sqlite(temp.path().join("local.db"))
        .await
        .unwrap();
    assert!(store.get(KeySpace::ProxyHash, b"p").await.unwrap().is_none());
    assert!(store.get(KeySpace::CommitToTree, b"c").await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_persists_across_reopen() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("local.db");

    let store = LocalStore::open_sqlite(&path).await.unwrap();
    store.put(KeySpace::CommitToTree, b"c", b"tree").await.unwrap();
    store.close().await;

    let store = LocalStore::open_sqlite(&path).await.unwrap();
    assert_eq!(
        store
            .get(KeySpace::CommitToTree, b"c")
            .await
            .unwrap()
            .as_deref(),
        Some(b"tree".as_ref())
    );
}

#[tokio::test]
async fn closed_store_rejects_operations() {
    let (_temp, backends) = open_backends().await;
    for store in backends {
        store.close().await;
        store.close().await; // idempotent
        assert!(store.get(KeySpace::ProxyHash, b"k").await.is_err());
        assert!(store.put(KeySpace::ProxyHash, b"k", b"v").await.is_err());
    }
}
