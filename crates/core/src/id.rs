//! Root ids and object ids, with their stable text forms.

use crate::hash::Hash20;
use crate::path::RepoPathBuf;
use crate::proxy::ProxyHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A revision identifier naming a root tree.
///
/// Stored canonically as 40-char lowercase hex. A default-constructed root
/// id is the null revision and renders as the all-zero hex string.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RootId(String);

impl RootId {
    /// Parse a root id from its wire form: either 20 binary bytes or a
    /// 40-char hex string. Canonicalizes to lowercase hex.
    pub fn parse(input: &[u8]) -> crate::Result<Self> {
        if input.len() == Hash20::RAW_SIZE {
            let hash = Hash20::from_slice(input)
                .map_err(|e| crate::Error::InvalidRootId(e.to_string()))?;
            return Ok(Self(hash.to_hex()));
        }
        if input.len() == 2 * Hash20::RAW_SIZE {
            let text = std::str::from_utf8(input)
                .map_err(|e| crate::Error::InvalidRootId(e.to_string()))?;
            let hash = Hash20::from_hex(&text.to_ascii_lowercase())
                .map_err(|e| crate::Error::InvalidRootId(e.to_string()))?;
            return Ok(Self(hash.to_hex()));
        }
        Err(crate::Error::InvalidRootId(format!(
            "expected 20 binary bytes or 40 hex chars, got {} bytes",
            input.len()
        )))
    }

    /// Render the canonical hex form. The default root renders as all zeros.
    pub fn render(&self) -> String {
        if self.0.is_empty() {
            Hash20::ZERO.to_hex()
        } else {
            self.0.clone()
        }
    }

    /// The 20-byte binary form, used as the commit-to-tree cache key.
    pub fn to_binary(&self) -> crate::Result<Hash20> {
        if self.0.is_empty() {
            return Ok(Hash20::ZERO);
        }
        Hash20::from_hex(&self.0).map_err(|e| crate::Error::InvalidRootId(e.to_string()))
    }

    /// Whether this is the null revision.
    pub fn is_null(&self) -> bool {
        self.0.is_empty() || self.0 == Hash20::ZERO.to_hex()
    }
}

impl fmt::Debug for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootId({})", self.render())
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// An opaque object identifier.
///
/// Three byte layouts share this space: embedded-with-path and
/// embedded-hash-only proxy hashes (tagged, at least 21 bytes), and legacy
/// 20-byte indirect keys into the `ProxyHash` keyspace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Vec<u8>);

/// Text prefix of legacy indirect object ids.
const INDIRECT_PREFIX: &str = "proxy-";

impl ObjectId {
    /// Wrap raw id bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw id bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse an object id from its stable text form. Accepts:
    ///
    /// - `proxy-{40hex}`: legacy indirect key of a `ProxyHash` row
    /// - `{40hex}`: embedded hash with no path
    /// - `{40hex}:{path}`: embedded hash with path
    pub fn parse(text: &str) -> crate::Result<Self> {
        if let Some(hex) = text.strip_prefix(INDIRECT_PREFIX) {
            if text.len() != INDIRECT_PREFIX.len() + 2 * Hash20::RAW_SIZE {
                return Err(crate::Error::InvalidObjectId(format!(
                    "invalid indirect id length: {}",
                    text.len()
                )));
            }
            let key = Hash20::from_hex(hex)
                .map_err(|e| crate::Error::InvalidObjectId(e.to_string()))?;
            return Ok(Self(key.as_bytes().to_vec()));
        }

        if text.len() == 2 * Hash20::RAW_SIZE {
            let rev = Hash20::from_hex(text)
                .map_err(|e| crate::Error::InvalidObjectId(e.to_string()))?;
            return Ok(ProxyHash::embed_hash_only(rev));
        }

        if text.len() < 2 * Hash20::RAW_SIZE + 1 {
            return Err(crate::Error::InvalidObjectId(format!(
                "object id too short: {text}"
            )));
        }
        if text.as_bytes()[2 * Hash20::RAW_SIZE] != b':' {
            return Err(crate::Error::InvalidObjectId(format!(
                "missing separator colon in object id: {text}"
            )));
        }

        let rev = Hash20::from_hex(&text[..2 * Hash20::RAW_SIZE])
            .map_err(|e| crate::Error::InvalidObjectId(e.to_string()))?;
        let path = RepoPathBuf::new(&text[2 * Hash20::RAW_SIZE + 1..])
            .map_err(|e| crate::Error::InvalidObjectId(e.to_string()))?;
        Ok(ProxyHash::embed_with_path(rev, &path))
    }

    /// Render the stable text form. Inverse of [`ObjectId::parse`].
    pub fn render(&self) -> String {
        if let Some(proxy) = ProxyHash::try_parse_embedded(self) {
            if proxy.path().is_empty() {
                return proxy.rev().to_hex();
            }
            return format!("{}:{}", proxy.rev().to_hex(), proxy.path());
        }
        let hex: String = self.0.iter().map(|b| format!("{b:02x}")).collect();
        format!("{INDIRECT_PREFIX}{hex}")
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.render())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}
