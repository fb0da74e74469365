//! File-content blobs.

use bytes::Bytes;
use std::fmt;

/// The bytes of one file version. Immutable; shared via `Arc` by callers.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    data: Bytes,
}

impl Blob {
    /// Create a blob from its contents.
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Get the blob contents.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob").field("size", &self.data.len()).finish()
    }
}

impl From<&'static [u8]> for Blob {
    fn from(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }
}
