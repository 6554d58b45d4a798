//! Deterministic node id derivation.
//!
//! Producer and registry never exchange an allocation handshake: both sides
//! derive the same `NodeId` from a `SensorKey` alone. The derivation hashes
//! the key's canonical string with MD5, reads the first four digest bytes as
//! a big-endian integer and reduces it modulo [`NODE_ID_SPACE`].
//!
//! The id space is bounded, so distinct keys can collide. Collisions are not
//! resolved here; the registry detects and reports them.

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::sensor::SensorKey;

/// Size of the node id space. Ids are always in `0..NODE_ID_SPACE`.
pub const NODE_ID_SPACE: u32 = 1_000_000;

/// Numeric identifier of one address-space slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct NodeId(u32);

impl NodeId {
    /// Wraps a raw id, returning `None` when it lies outside the id space.
    pub fn new(raw: u32) -> Option<Self> {
        (raw < NODE_ID_SPACE).then_some(Self(raw))
    }

    /// Derives the node id for a sensor key.
    ///
    /// Pure and total: equal keys yield equal ids in every process.
    pub fn derive(key: &SensorKey) -> Self {
        let digest = Md5::digest(key.canonical().as_bytes());
        let prefix = digest
            .as_slice()
            .first_chunk::<4>()
            .copied()
            .unwrap_or_default();
        Self(u32::from_be_bytes(prefix) % NODE_ID_SPACE)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for NodeId {
    type Error = String;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| format!("node id {raw} outside 0..{NODE_ID_SPACE}"))
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shorthand for [`NodeId::derive`].
pub fn derive(key: &SensorKey) -> NodeId {
    NodeId::derive(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{HardwareType, Location};

    fn key(b: u32, r: u32, p: u32, kind: HardwareType, idx: u32) -> SensorKey {
        SensorKey::new(Location::new(b, r, p), kind, idx)
    }

    #[test]
    fn test_reference_vectors() {
        // Values computed independently from md5("b.r.p.KIND.idx")[..8] % 1e6.
        assert_eq!(derive(&key(1, 101, 1, HardwareType::CPU, 2)).get(), 415_735);
        assert_eq!(derive(&key(1, 101, 1, HardwareType::CPU, 0)).get(), 7_881);
        assert_eq!(
            derive(&key(2, 105, 3, HardwareType::GpuNvidia, 0)).get(),
            443_465
        );
        assert_eq!(derive(&key(4, 109, 5, HardwareType::SSD, 1)).get(), 202_934);
        assert_eq!(
            derive(&key(1, 100, 1, HardwareType::SuperIO, 0)).get(),
            825_452
        );
    }

    #[test]
    fn test_derive_is_deterministic() {
        let k = key(3, 107, 2, HardwareType::HDD, 1);
        let first = derive(&k);
        for _ in 0..100 {
            assert_eq!(derive(&k), first);
        }
        // A copy built separately agrees too.
        assert_eq!(derive(&key(3, 107, 2, HardwareType::HDD, 1)), first);
    }

    #[test]
    fn test_derive_stays_in_space() {
        for building in 0..3 {
            for kind in HardwareType::ALL {
                for idx in 0..8 {
                    let id = derive(&key(building, 100, 1, kind, idx));
                    assert!(id.get() < NODE_ID_SPACE);
                }
            }
        }
    }

    #[test]
    fn test_known_collision_is_not_hidden() {
        // Two unrelated sensors share a slot; the deriver reports it as-is.
        let a = derive(&key(1, 101, 2, HardwareType::CPU, 4));
        let b = derive(&key(4, 103, 5, HardwareType::SSD, 1));
        assert_eq!(a, b);
        assert_eq!(a.get(), 68_758);
    }

    #[test]
    fn test_node_id_new_bounds() {
        assert!(NodeId::new(0).is_some());
        assert!(NodeId::new(NODE_ID_SPACE - 1).is_some());
        assert!(NodeId::new(NODE_ID_SPACE).is_none());
    }

    #[test]
    fn test_node_id_serde() {
        let id = derive(&key(1, 101, 1, HardwareType::CPU, 2));
        assert_eq!(serde_json::to_string(&id).unwrap(), "415735");
        assert_eq!(serde_json::from_str::<NodeId>("415735").unwrap(), id);
        assert!(serde_json::from_str::<NodeId>("1000000").is_err());
    }
}
