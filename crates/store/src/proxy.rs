//! Proxy-hash persistence: recovering (rev, path) pairs from object ids and
//! minting ids for newly-ingested objects.

use crate::error::{FetchError, FetchResult};
use burrow_core::{Hash20, ObjectId, ObjectIdFormat, ProxyHash, RepoPathBuf};
use burrow_localstore::{KeySpace, LocalStore};
use sha2::{Digest, Sha256};

/// Recover the proxy hash for an object id.
///
/// Embedded ids decode without touching the KV store; legacy indirect ids
/// cost one point lookup in the `ProxyHash` keyspace.
pub async fn load(local: &LocalStore, id: &ObjectId) -> FetchResult<ProxyHash> {
    if let Some(proxy) = ProxyHash::try_parse_embedded(id) {
        return Ok(proxy);
    }
    match local.get(KeySpace::ProxyHash, id.as_bytes()).await? {
        Some(record) => ProxyHash::from_record(&record)
            .map_err(|err| FetchError::Fatal(format!("corrupt proxy hash record: {err}"))),
        None => Err(FetchError::ProxyHashMissing(id.to_string())),
    }
}

/// Recover proxy hashes for a batch of ids, amortizing the KV round trips.
pub async fn load_batch(local: &LocalStore, ids: &[ObjectId]) -> FetchResult<Vec<ProxyHash>> {
    let mut proxies = Vec::with_capacity(ids.len());
    for id in ids {
        proxies.push(load(local, id).await?);
    }
    Ok(proxies)
}

/// Mint an object id for a (path, rev) pair.
///
/// Embedded formats carry the pair inline. The legacy indirect format
/// writes a `ProxyHash` row and returns its 20-byte key.
pub async fn store(
    local: &LocalStore,
    path: &RepoPathBuf,
    rev: Hash20,
    format: ObjectIdFormat,
) -> FetchResult<ObjectId> {
    match format {
        ObjectIdFormat::EmbeddedWithPath => Ok(ProxyHash::embed_with_path(rev, path)),
        ObjectIdFormat::EmbeddedHashOnly => Ok(ProxyHash::embed_hash_only(rev)),
        ObjectIdFormat::Indirect => {
            let proxy = ProxyHash::new(rev, path.clone());
            let key = indirect_key(&proxy);
            let mut batch = local.begin_write();
            batch.put(KeySpace::ProxyHash, &key, &proxy.to_record());
            batch.flush().await?;
            Ok(ObjectId::from_bytes(key.to_vec()))
        }
    }
}

/// Row key of an indirect proxy hash: the first 20 bytes of
/// sha256(rev ∥ path).
fn indirect_key(proxy: &ProxyHash) -> [u8; 20] {
    let mut hasher = Sha256::new();
    hasher.update(proxy.rev().as_bytes());
    hasher.update(proxy.path().as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 20];
    key.copy_from_slice(&digest[..20]);
    key
}
