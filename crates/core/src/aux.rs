//! Precomputed aux-data summaries of blobs and trees.

use crate::hash::{Hash20, Hash32};

/// Precomputed summary of a blob: content digests and size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobAuxData {
    pub sha1: Hash20,
    pub blake3: Hash32,
    pub size: u64,
}

/// Precomputed summary of a tree: aggregate digest and total size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeAuxData {
    pub digest_hash: Hash32,
    pub digest_size: u64,
}
