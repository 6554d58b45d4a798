//! Per-session node handle cache.
//!
//! Maps a derived `NodeId` to the handle the server returned for it, plus
//! the last value sent. Every entry belongs to one session generation;
//! a reconnect bumps the generation and empties the cache so stale
//! handles are never reused.

use std::collections::HashMap;
use std::sync::Arc;

use thermo_core::NodeId;
use tokio::sync::Mutex;

/// Cache shared between the session manager and the submitter.
pub type SharedNodeCache = Arc<Mutex<NodeCache>>;

/// A resolved node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedNode {
    pub handle: NodeId,
    /// Last value written through this handle, if any
    pub last_sent: Option<f64>,
}

#[derive(Debug, Default)]
pub struct NodeCache {
    generation: u64,
    nodes: HashMap<NodeId, CachedNode>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedNodeCache {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drops every entry and moves the cache to `generation`.
    pub fn invalidate(&mut self, generation: u64) {
        self.generation = generation;
        self.nodes.clear();
    }

    /// Looks up `node_id`, only if the cache is still at `generation`.
    pub fn get(&self, generation: u64, node_id: NodeId) -> Option<CachedNode> {
        if generation != self.generation {
            return None;
        }
        self.nodes.get(&node_id).copied()
    }

    /// Stores a handle. Ignored when `generation` is stale.
    pub fn insert(&mut self, generation: u64, node_id: NodeId, handle: NodeId) {
        if generation != self.generation {
            return;
        }
        self.nodes.entry(node_id).or_insert(CachedNode {
            handle,
            last_sent: None,
        });
    }

    /// Records a successful write. Ignored when `generation` is stale.
    pub fn record_sent(&mut self, generation: u64, node_id: NodeId, value: f64) {
        if generation != self.generation {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.last_sent = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> NodeId {
        NodeId::new(raw).unwrap()
    }

    #[test]
    fn test_insert_and_record() {
        let mut cache = NodeCache::new();
        cache.invalidate(1);
        cache.insert(1, id(7), id(7));
        assert_eq!(cache.get(1, id(7)).unwrap().last_sent, None);

        cache.record_sent(1, id(7), 42.5);
        assert_eq!(cache.get(1, id(7)).unwrap().last_sent, Some(42.5));
    }

    #[test]
    fn test_invalidate_drops_entries() {
        let mut cache = NodeCache::new();
        cache.invalidate(1);
        cache.insert(1, id(7), id(7));

        cache.invalidate(2);
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), 2);
        assert!(cache.get(2, id(7)).is_none());
    }

    #[test]
    fn test_stale_generation_ignored() {
        let mut cache = NodeCache::new();
        cache.invalidate(3);

        cache.insert(2, id(7), id(7));
        assert!(cache.is_empty());

        cache.insert(3, id(7), id(7));
        cache.record_sent(2, id(7), 50.0);
        assert!(cache.get(2, id(7)).is_none());
        assert_eq!(cache.get(3, id(7)).unwrap().last_sent, None);
    }
}
