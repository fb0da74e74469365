//! Fixed-size revision and digest hashes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 20-byte hash, the native revision hash size of the source-control store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash20([u8; 20]);

/// A 32-byte hash, used for content digests in aux data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash32([u8; 32]);

fn parse_hex<const N: usize>(s: &str) -> crate::Result<[u8; N]> {
    if s.len() != N * 2 {
        return Err(crate::Error::InvalidHash(format!(
            "expected {} hex chars, got {}",
            N * 2,
            s.len()
        )));
    }
    let mut bytes = [0u8; N];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hex_str =
            std::str::from_utf8(chunk).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        bytes[i] = u8::from_str_radix(hex_str, 16)
            .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
    }
    Ok(bytes)
}

fn render_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl Hash20 {
    pub const RAW_SIZE: usize = 20;

    /// The all-zero hash, the null revision of the source-control store.
    pub const ZERO: Hash20 = Hash20([0u8; 20]);

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Create from a byte slice of exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() != Self::RAW_SIZE {
            return Err(crate::Error::InvalidHash(format!(
                "expected {} bytes, got {}",
                Self::RAW_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Parse from a 40-char hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        Ok(Self(parse_hex(s)?))
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        render_hex(&self.0)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the null revision hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl Hash32 {
    pub const RAW_SIZE: usize = 32;

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a byte slice of exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() != Self::RAW_SIZE {
            return Err(crate::Error::InvalidHash(format!(
                "expected {} bytes, got {}",
                Self::RAW_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Parse from a 64-char hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        Ok(Self(parse_hex(s)?))
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        render_hex(&self.0)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash20 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash20({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Hash20 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
