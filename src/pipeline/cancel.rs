//! Cooperative cancellation shared between a caller and a running pipeline.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::network::{EdgeId, JunctionId};

/// Flag checked once per edge or junction by every pass.
///
/// Clones share the same flag, so a caller can keep one and hand another to the run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A unit of work a cancelled pass did not reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkItem {
    Edge(EdgeId),
    Junction(JunctionId),
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Edge(id) => write!(f, "edge {}", id),
            WorkItem::Junction(id) => write!(f, "junction {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_work_item_display() {
        assert_eq!(WorkItem::Edge(EdgeId(4)).to_string(), "edge 4");
        assert_eq!(WorkItem::Junction(JunctionId(2)).to_string(), "junction 2");
    }
}
