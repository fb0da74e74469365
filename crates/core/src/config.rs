//! Fetch configuration and the local-store caching policy.

use serde::{Deserialize, Serialize};

/// Which object id encoding newly-ingested objects receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectIdFormat {
    /// Embed the revision hash and the path in the id.
    EmbeddedWithPath,
    /// Embed only the revision hash.
    EmbeddedHashOnly,
    /// Write a proxy-hash row and hand out the indirect key.
    Indirect,
}

/// Which successfully-fetched object kinds the layer above writes back into
/// the local KV store. Pure data; the core itself persists only the
/// commit-to-root-tree mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachingPolicy {
    #[serde(default)]
    pub trees: bool,
    #[serde(default)]
    pub blobs: bool,
    #[serde(default)]
    pub blob_aux: bool,
}

impl CachingPolicy {
    /// Cache nothing.
    pub fn no_caching() -> Self {
        Self::default()
    }

    /// Cache every object kind.
    pub fn everything() -> Self {
        Self {
            trees: true,
            blobs: true,
            blob_aux: true,
        }
    }
}

/// Configuration of the object-fetch core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Number of fetcher worker tasks. Zero is coerced to one with a warning.
    #[serde(default = "default_fetcher_workers")]
    pub num_fetcher_workers: usize,
    /// Maximum concurrent single-item retries.
    #[serde(default = "default_retry_workers")]
    pub num_retry_workers: usize,
    /// Dequeue batch size for blob requests.
    #[serde(default = "default_batch_size")]
    pub import_batch_size: usize,
    /// Dequeue batch size for tree requests.
    #[serde(default = "default_batch_size_tree")]
    pub import_batch_size_tree: usize,
    /// Dequeue batch size for aux-data requests.
    #[serde(default = "default_batch_size_aux")]
    pub import_batch_size_aux: usize,
    /// Issue a single AllowRemote batch instead of the staged
    /// LocalOnly/RemoteOnly cascade. The fetched-source tag is then Unknown.
    #[serde(default)]
    pub allow_remote_get_batch: bool,
    /// Object ids are bijective with content: distinct ids imply distinct
    /// content in `compare_objects_by_id`.
    #[serde(default)]
    pub bijective_object_ids: bool,
    /// Legacy toggle for blob write-back. Must agree with
    /// `caching_policy.blobs`; construction rejects disagreement.
    #[serde(default)]
    pub enable_blob_localstore_caching: bool,
    /// Which fetched object kinds the layer above persists locally.
    #[serde(default)]
    pub caching_policy: CachingPolicy,
    /// Encoding of newly-ingested object ids.
    #[serde(default = "default_object_id_format")]
    pub object_id_format: ObjectIdFormat,
    /// Minimum seconds between missing-proxy-hash log events.
    #[serde(default = "default_missing_proxy_log_interval_secs")]
    pub missing_proxy_log_interval_secs: u64,
    /// Regex over checkout paths selecting fetches to audit-log.
    #[serde(default)]
    pub log_fetch_path_regex: Option<String>,
    /// Capacity of the in-memory activity buffer.
    #[serde(default = "default_activity_buffer_size")]
    pub activity_buffer_size: usize,
    /// Capacity of the trace bus.
    #[serde(default = "default_trace_bus_capacity")]
    pub trace_bus_capacity: usize,
    /// Seconds between periodic adapter flushes.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Case sensitivity of the checkout; empty trees are built with it.
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
    /// Run retries inline on the worker instead of the retry pool.
    /// For unit tests.
    #[serde(default)]
    pub inline_retries: bool,
}

impl FetchConfig {
    /// Validate cross-field constraints.
    ///
    /// The blob write-back toggle and the caching policy are two surfaces
    /// for one decision; they must agree.
    pub fn validate(&self) -> crate::Result<()> {
        if self.enable_blob_localstore_caching != self.caching_policy.blobs {
            return Err(crate::Error::Config(format!(
                "enable_blob_localstore_caching ({}) disagrees with caching_policy.blobs ({})",
                self.enable_blob_localstore_caching, self.caching_policy.blobs
            )));
        }
        Ok(())
    }

    /// Create a test configuration: one worker, tiny batches, inline
    /// retries.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            num_fetcher_workers: 1,
            num_retry_workers: 1,
            import_batch_size: 4,
            import_batch_size_tree: 4,
            import_batch_size_aux: 4,
            allow_remote_get_batch: false,
            bijective_object_ids: false,
            enable_blob_localstore_caching: false,
            caching_policy: CachingPolicy::no_caching(),
            object_id_format: ObjectIdFormat::EmbeddedWithPath,
            missing_proxy_log_interval_secs: 0,
            log_fetch_path_regex: None,
            activity_buffer_size: 32,
            trace_bus_capacity: 256,
            flush_interval_secs: 600,
            case_sensitive: true,
            inline_retries: true,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            num_fetcher_workers: default_fetcher_workers(),
            num_retry_workers: default_retry_workers(),
            import_batch_size: default_batch_size(),
            import_batch_size_tree: default_batch_size_tree(),
            import_batch_size_aux: default_batch_size_aux(),
            allow_remote_get_batch: false,
            bijective_object_ids: false,
            enable_blob_localstore_caching: false,
            caching_policy: CachingPolicy::default(),
            object_id_format: default_object_id_format(),
            missing_proxy_log_interval_secs: default_missing_proxy_log_interval_secs(),
            log_fetch_path_regex: None,
            activity_buffer_size: default_activity_buffer_size(),
            trace_bus_capacity: default_trace_bus_capacity(),
            flush_interval_secs: default_flush_interval_secs(),
            case_sensitive: default_case_sensitive(),
            inline_retries: false,
        }
    }
}

fn default_fetcher_workers() -> usize {
    8
}

fn default_retry_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    32
}

fn default_batch_size_tree() -> usize {
    16
}

fn default_batch_size_aux() -> usize {
    64
}

fn default_object_id_format() -> ObjectIdFormat {
    ObjectIdFormat::EmbeddedWithPath
}

fn default_missing_proxy_log_interval_secs() -> u64 {
    600 // 10 minutes
}

fn default_activity_buffer_size() -> usize {
    100
}

fn default_trace_bus_capacity() -> usize {
    1000
}

fn default_flush_interval_secs() -> u64 {
    600
}

fn default_case_sensitive() -> bool {
    cfg!(not(any(target_os = "windows", target_os = "macos")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FetchConfig::default().validate().is_ok());
        assert!(FetchConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_policy_disagreement() {
        let mut config = FetchConfig::for_testing();
        config.enable_blob_localstore_caching = true;
        config.caching_policy.blobs = false;
        assert!(config.validate().is_err());

        config.enable_blob_localstore_caching = false;
        config.caching_policy.blobs = true;
        assert!(config.validate().is_err());

        config.enable_blob_localstore_caching = true;
        assert!(config.validate().is_ok());
    }
}
