//! Read-only frame data handed to renderers.

use serde::{Deserialize, Serialize};
use slotmap::Key;

use crate::entity::{Entity, EntityId, Role};
use crate::machine::StateLabel;

/// Per-entity appearance inputs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// Stable numeric form of the entity handle.
    pub id: u64,
    pub position: [f32; 3],
    pub role: Role,
    pub progress: f32,
    pub observable: f32,
}

impl EntitySnapshot {
    #[must_use]
    pub fn new(id: EntityId, entity: &Entity) -> Self {
        Self {
            id: id.data().as_ffi(),
            position: entity.position().to_array(),
            role: entity.role(),
            progress: entity.progress(),
            observable: entity.observable(),
        }
    }
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    pub generation: u64,
    pub vignette: String,
    pub tick: u64,
    pub state: StateLabel,
    pub blend: f32,
    pub coherence: f32,
    pub pulses: usize,
    pub entities: Vec<EntitySnapshot>,
}

impl FrameSnapshot {
    /// Entities currently in `role`.
    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &EntitySnapshot> + '_ {
        self.entities.iter().filter(move |entity| entity.role == role)
    }

    /// Axis-aligned bounds of all entity positions.
    #[must_use]
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let mut iter = self.entities.iter();
        let first = iter.next()?.position;
        Some(iter.fold((first, first), |(mut lo, mut hi), entity| {
            for axis in 0..3 {
                lo[axis] = lo[axis].min(entity.position[axis]);
                hi[axis] = hi[axis].max(entity.position[axis]);
            }
            (lo, hi)
        }))
    }
}
