//! Core domain types and shared logic for the Burrow object-fetch subsystem.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Fixed-size revision hashes and their hex codecs
//! - Root ids, object ids, and the proxy-hash encodings that tie them together
//! - Trees, blobs, and their aux-data summaries
//! - Import priorities, fetch causes, and fetch contexts
//! - Fetch configuration and the local-store caching policy

pub mod aux;
pub mod blob;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod id;
pub mod path;
pub mod proxy;
pub mod tree;

pub use aux::{BlobAuxData, TreeAuxData};
pub use blob::Blob;
pub use config::{CachingPolicy, FetchConfig, ObjectIdFormat};
pub use error::{Error, Result};
pub use fetch::{
    FetchCause, FetchContext, FetchType, FetchedSource, ImportPriority, ObjectComparison, Origin,
    PriorityClass,
};
pub use hash::{Hash20, Hash32};
pub use id::{ObjectId, RootId};
pub use path::RepoPathBuf;
pub use proxy::ProxyHash;
pub use tree::{EntryType, Tree, TreeEntry};
