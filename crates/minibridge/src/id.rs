use core::fmt;
use portable_atomic::{AtomicU64, Ordering};

/// Opaque identifier correlating a submission with its completion.
///
/// Unique within one [`ServiceClient`]. The engine treats it as a token and
/// hands it back unchanged with the result.
///
/// [`ServiceClient`]: crate::ServiceClient
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Hands out request identifiers from a single monotonically increasing
/// counter.
///
/// Starts at zero. Identifiers are never recycled; the counter wraps on
/// overflow, which is unreachable at any realistic request rate.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Returns the next identifier.
    ///
    /// Only uniqueness matters, so a relaxed increment is sufficient.
    pub fn next_id(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
