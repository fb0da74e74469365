//! Repository-relative paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A relative path inside the checkout, as carried by proxy hashes and trees.
///
/// Paths are UTF-8, use `/` separators, never start with a separator, and
/// contain no NUL bytes and no `.` or `..` components. The empty path names
/// the checkout root.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoPathBuf(String);

impl RepoPathBuf {
    /// The empty path, naming the checkout root.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Validate and wrap a path string.
    pub fn new(path: impl Into<String>) -> crate::Result<Self> {
        let path = path.into();
        if path.is_empty() {
            return Ok(Self(path));
        }
        if path.contains('\0') {
            return Err(crate::Error::InvalidPath("contains NUL byte".to_string()));
        }
        if path.starts_with('/') {
            return Err(crate::Error::InvalidPath(format!(
                "path is not relative: {path}"
            )));
        }
        for component in path.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(crate::Error::InvalidPath(format!(
                    "unsafe path component in: {path}"
                )));
            }
        }
        Ok(Self(path))
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the raw path bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Whether this is the root path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RepoPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoPathBuf({:?})", self.0)
    }
}

impl fmt::Display for RepoPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
