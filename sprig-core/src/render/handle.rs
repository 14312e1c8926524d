//! Host Node Handles
//!
//! The reconciler never touches host nodes directly. A [`HostAdapter`]
//! hands out opaque [`NodeHandle`]s and the reconciler passes them back.
//!
//! [`HostAdapter`]: super::HostAdapter

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Opaque identity of a node in the host tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeHandle(u64);

impl NodeHandle {
    /// Generate a new unique handle.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeHandle {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique() {
        let a = NodeHandle::new();
        let b = NodeHandle::new();
        assert_ne!(a, b);
        assert_eq!(NodeHandle::from(a.raw()), a);
    }
}
