//! Common types for the HandGrasp environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a grabbable object.
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    /// Creates a new random ObjectId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic ObjectId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Handle to a collision shape owned by the geometry service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(pub u32);

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shape#{}", self.0)
    }
}

/// Handle to a joint node owned by a transform store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointId(pub u32);

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "joint#{}", self.0)
    }
}

/// Bit set of collision layers used to filter ray queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    /// Matches every layer.
    pub const ALL: LayerMask = LayerMask(u32::MAX);

    /// Matches nothing.
    pub const NONE: LayerMask = LayerMask(0);

    /// Mask containing a single layer (0..32).
    pub fn layer(index: u8) -> Self {
        Self(1u32.checked_shl(index as u32).unwrap_or(0))
    }

    /// Returns true if `layer` is part of this mask.
    pub fn contains(&self, layer: u8) -> bool {
        self.0 & Self::layer(layer).0 != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_from_seed_is_deterministic() {
        assert_eq!(ObjectId::from_seed(7), ObjectId::from_seed(7));
        assert_ne!(ObjectId::from_seed(7), ObjectId::from_seed(8));
    }

    #[test]
    fn test_object_id_display_is_short() {
        let id = ObjectId::from_seed(1);
        assert_eq!(id.to_string().len(), 8);
    }

    #[test]
    fn test_layer_mask() {
        let mask = LayerMask::layer(3);
        assert!(mask.contains(3));
        assert!(!mask.contains(4));
        assert!(LayerMask::ALL.contains(31));
        assert!(!LayerMask::NONE.contains(0));
        assert_eq!(LayerMask::layer(40), LayerMask::NONE);
    }
}
