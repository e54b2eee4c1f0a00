use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing source for connection ids.
static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one visitor connection.
///
/// Ids are never reused, so a stale id can only ever refer to a connection
/// that is already gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
