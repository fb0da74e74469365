//! Proxy hashes: the (revision hash, path) pair addressing history-aware
//! objects in the source-control store.

use crate::hash::Hash20;
use crate::id::ObjectId;
use crate::path::RepoPathBuf;
use std::fmt;

/// Layout tag for an embedded proxy hash carrying a path.
const TAG_WITH_PATH: u8 = 0x01;
/// Layout tag for an embedded proxy hash with no path.
const TAG_HASH_ONLY: u8 = 0x02;

/// The (revision hash, path) pair the native adapter needs to address an
/// object. Recoverable from an embedded object id without any lookup, or
/// from the `ProxyHash` keyspace for legacy indirect ids.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProxyHash {
    rev: Hash20,
    path: RepoPathBuf,
}

impl ProxyHash {
    /// Create a proxy hash from its parts.
    pub fn new(rev: Hash20, path: RepoPathBuf) -> Self {
        Self { rev, path }
    }

    /// The revision hash addressing the object in the native store.
    pub fn rev(&self) -> &Hash20 {
        &self.rev
    }

    /// The checkout-relative path of the object.
    pub fn path(&self) -> &RepoPathBuf {
        &self.path
    }

    /// Build an embedded object id carrying both the hash and the path.
    ///
    /// An empty path normalizes to the hash-only layout so that every id
    /// has exactly one byte form and text round-trips are exact.
    pub fn embed_with_path(rev: Hash20, path: &RepoPathBuf) -> ObjectId {
        if path.is_empty() {
            return Self::embed_hash_only(rev);
        }
        let mut bytes = Vec::with_capacity(1 + Hash20::RAW_SIZE + path.as_bytes().len());
        bytes.push(TAG_WITH_PATH);
        bytes.extend_from_slice(rev.as_bytes());
        bytes.extend_from_slice(path.as_bytes());
        ObjectId::from_bytes(bytes)
    }

    /// Build an embedded object id carrying only the hash.
    pub fn embed_hash_only(rev: Hash20) -> ObjectId {
        let mut bytes = Vec::with_capacity(1 + Hash20::RAW_SIZE);
        bytes.push(TAG_HASH_ONLY);
        bytes.extend_from_slice(rev.as_bytes());
        ObjectId::from_bytes(bytes)
    }

    /// Decode an embedded object id, if it is one.
    ///
    /// Legacy indirect ids are exactly 20 bytes with no tag, so the three
    /// layouts never overlap: embedded ids are at least 21 bytes long.
    pub fn try_parse_embedded(id: &ObjectId) -> Option<ProxyHash> {
        let bytes = id.as_bytes();
        if bytes.len() == 1 + Hash20::RAW_SIZE && bytes[0] == TAG_HASH_ONLY {
            let rev = Hash20::from_slice(&bytes[1..]).ok()?;
            return Some(ProxyHash::new(rev, RepoPathBuf::root()));
        }
        if bytes.len() > Hash20::RAW_SIZE && bytes[0] == TAG_WITH_PATH {
            let rev = Hash20::from_slice(&bytes[1..=Hash20::RAW_SIZE]).ok()?;
            let path = std::str::from_utf8(&bytes[1 + Hash20::RAW_SIZE..]).ok()?;
            let path = RepoPathBuf::new(path).ok()?;
            return Some(ProxyHash::new(rev, path));
        }
        None
    }

    /// Serialize to the stored record form: 20 hash bytes followed by the
    /// path bytes.
    pub fn to_record(&self) -> Vec<u8> {
        let mut record = Vec::with_capacity(Hash20::RAW_SIZE + self.path.as_bytes().len());
        record.extend_from_slice(self.rev.as_bytes());
        record.extend_from_slice(self.path.as_bytes());
        record
    }

    /// Parse from the stored record form.
    pub fn from_record(record: &[u8]) -> crate::Result<Self> {
        if record.len() < Hash20::RAW_SIZE {
            return Err(crate::Error::InvalidProxyRecord(format!(
                "record too short: {} bytes",
                record.len()
            )));
        }
        let rev = Hash20::from_slice(&record[..Hash20::RAW_SIZE])
            .map_err(|e| crate::Error::InvalidProxyRecord(e.to_string()))?;
        let path = std::str::from_utf8(&record[Hash20::RAW_SIZE..])
            .map_err(|e| crate::Error::InvalidProxyRecord(e.to_string()))?;
        let path =
            RepoPathBuf::new(path).map_err(|e| crate::Error::InvalidProxyRecord(e.to_string()))?;
        Ok(Self::new(rev, path))
    }
}

impl fmt::Debug for ProxyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHash")
            .field("rev", &self.rev)
            .field("path", &self.path)
            .finish()
    }
}

impl fmt::Display for ProxyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.rev)
        } else {
            write!(f, "{}:{}", self.rev, self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev() -> Hash20 {
        Hash20::from_hex(&"ab".repeat(20)).unwrap()
    }

    #[test]
    fn test_embed_with_path_roundtrip() {
        let path = RepoPathBuf::new("src/lib.rs").unwrap();
        let id = ProxyHash::embed_with_path(rev(), &path);
        let proxy = ProxyHash::try_parse_embedded(&id).unwrap();
        assert_eq!(proxy.rev(), &rev());
        assert_eq!(proxy.path(), &path);
    }

    #[test]
    fn test_embed_hash_only_roundtrip() {
        let id = ProxyHash::embed_hash_only(rev());
        assert_eq!(id.as_bytes().len(), 21);
        let proxy = ProxyHash::try_parse_embedded(&id).unwrap();
        assert_eq!(proxy.rev(), &rev());
        assert!(proxy.path().is_empty());
    }

    #[test]
    fn test_indirect_ids_are_not_embedded() {
        // A legacy indirect key is 20 raw bytes, below the embedded minimum.
        let id = ObjectId::from_bytes(vec![TAG_WITH_PATH; 20]);
        assert!(ProxyHash::try_parse_embedded(&id).is_none());
    }

    #[test]
    fn test_record_roundtrip() {
        let path = RepoPathBuf::new("a/b").unwrap();
        let proxy = ProxyHash::new(rev(), path);
        let record = proxy.to_record();
        assert_eq!(ProxyHash::from_record(&record).unwrap(), proxy);
    }

    #[test]
    fn test_record_too_short() {
        assert!(ProxyHash::from_record(&[0u8; 10]).is_err());
    }
}
