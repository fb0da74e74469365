//! Import priorities, fetch causes, and per-request context.

/// Coarse priority band of an import request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityClass {
    Low,
    Normal,
    High,
}

/// Priority of an import request: class-major total order with a fine
/// adjustment inside the class. FIFO order breaks ties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImportPriority {
    pub class: PriorityClass,
    pub adjustment: u16,
}

impl ImportPriority {
    pub fn new(class: PriorityClass, adjustment: u16) -> Self {
        Self { class, adjustment }
    }

    pub fn low() -> Self {
        Self::new(PriorityClass::Low, 0)
    }

    pub fn normal() -> Self {
        Self::new(PriorityClass::Normal, 0)
    }

    pub fn high() -> Self {
        Self::new(PriorityClass::High, 0)
    }
}

impl Default for ImportPriority {
    fn default() -> Self {
        Self::normal()
    }
}

/// Why a request was issued. Propagated to the native adapter and to
/// telemetry; requests with the same id but distinct causes each reach the
/// adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchCause {
    /// Unknown or unattributed.
    Unknown,
    /// A filesystem-channel read.
    Fs,
    /// A service RPC on behalf of a client tool.
    Thrift,
    /// Background prefetching.
    Prefetch,
}

/// Whether a request is a demand fetch or part of a prefetch sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchType {
    Fetch,
    Prefetch,
}

/// Where the native adapter found an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchedSource {
    Local,
    Remote,
    /// The adapter was allowed to pick either and did not say which.
    Unknown,
}

/// Where a resolved object came from, as seen by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    FromDiskCache,
    FromNetworkFetch,
    NotFetched,
}

/// Result of comparing two object ids for content equivalence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectComparison {
    /// The ids name identical content.
    Identical,
    /// The ids name different content (only derivable under bijective ids).
    Different,
    /// History is mixed into the hash; distinct ids may share content.
    Unknown,
}

/// Caller-supplied context accompanying a fetch.
#[derive(Clone, Debug)]
pub struct FetchContext {
    pub priority: ImportPriority,
    pub cause: FetchCause,
    pub client_pid: Option<u32>,
}

impl FetchContext {
    pub fn new(priority: ImportPriority, cause: FetchCause) -> Self {
        Self {
            priority,
            cause,
            client_pid: None,
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.client_pid = Some(pid);
        self
    }

    /// Context for a filesystem-channel read.
    pub fn fs() -> Self {
        Self::new(ImportPriority::high(), FetchCause::Fs)
    }

    /// Context for background prefetching.
    pub fn prefetch() -> Self {
        Self::new(ImportPriority::low(), FetchCause::Prefetch)
    }
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::new(ImportPriority::normal(), FetchCause::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_total_order() {
        assert!(ImportPriority::high() > ImportPriority::normal());
        assert!(ImportPriority::normal() > ImportPriority::low());
        assert!(
            ImportPriority::new(PriorityClass::Normal, 5)
                > ImportPriority::new(PriorityClass::Normal, 1)
        );
        // Class dominates adjustment.
        assert!(
            ImportPriority::new(PriorityClass::High, 0)
                > ImportPriority::new(PriorityClass::Normal, u16::MAX)
        );
    }
}
