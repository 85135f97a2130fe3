//! Entity store for the active vignette.

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;

new_key_type! {
    /// Stable handle for entities backed by a generational slot map.
    pub struct EntityId;
}

/// Role tag deciding which rules touch an entity and how picks treat it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Free,
    Tracked,
    PairedA,
    PairedB,
    Marker,
    /// Moving toward a collapse target; only the collapse rule applies.
    Collapsing,
    /// Reached its collapse target; frozen until reset.
    Settled,
    /// Observed; frozen until reverted or reset.
    Measured,
}

impl Role {
    /// Roles only the interaction machine may assign.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Collapsing | Self::Settled | Self::Measured)
    }

    /// Roles that periodic rules must never mutate.
    #[must_use]
    pub const fn is_frozen(self) -> bool {
        matches!(self, Self::Settled | Self::Measured)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Tracked => "tracked",
            Self::PairedA => "paired-a",
            Self::PairedB => "paired-b",
            Self::Marker => "marker",
            Self::Collapsing => "collapsing",
            Self::Settled => "settled",
            Self::Measured => "measured",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Periodic motion parameters carried by an entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Oscillator {
    pub phase: f32,
    pub frequency: f32,
    pub amplitude: f32,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self {
            phase: 0.0,
            frequency: 1.0,
            amplitude: 1.0,
        }
    }
}

/// Initial state for one entity, as listed in a vignette descriptor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EntitySeed {
    pub position: Vec3,
    #[serde(default)]
    pub velocity: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oscillator: Option<Oscillator>,
    pub role: Role,
    #[serde(default)]
    pub observable: f32,
}

impl EntitySeed {
    /// Seed at `position` with no motion parameters.
    #[must_use]
    pub const fn new(position: Vec3, role: Role) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            oscillator: None,
            role,
            observable: 0.0,
        }
    }

    #[must_use]
    pub const fn with_oscillator(mut self, oscillator: Oscillator) -> Self {
        self.oscillator = Some(oscillator);
        self
    }

    #[must_use]
    pub const fn with_observable(mut self, observable: f32) -> Self {
        self.observable = observable;
        self
    }
}

/// In-flight collapse bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CollapseTrack {
    pub start: Vec3,
    pub steps: u32,
}

/// One simulated unit of the active vignette.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub(crate) position: Vec3,
    pub(crate) velocity: Vec3,
    pub(crate) oscillator: Option<Oscillator>,
    pub(crate) observable: f32,
    pub(crate) role: Role,
    home_role: Role,
    home_observable: f32,
    origin: Vec3,
    pair: Option<EntityId>,
    pub(crate) target: Option<Vec3>,
    pub(crate) progress: f32,
    pub(crate) collapse: Option<CollapseTrack>,
}

impl Entity {
    fn from_seed(seed: EntitySeed) -> Self {
        Self {
            position: seed.position,
            velocity: seed.velocity,
            oscillator: seed.oscillator,
            observable: seed.observable,
            role: seed.role,
            home_role: seed.role,
            home_observable: seed.observable,
            origin: seed.position,
            pair: None,
            target: None,
            progress: 0.0,
            collapse: None,
        }
    }

    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    #[must_use]
    pub const fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Oscillator parameters, falling back to the neutral oscillator.
    #[must_use]
    pub fn oscillator(&self) -> Oscillator {
        self.oscillator.unwrap_or_default()
    }

    #[must_use]
    pub const fn observable(&self) -> f32 {
        self.observable
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Role assigned at creation; restored by reset and revert.
    #[must_use]
    pub const fn home_role(&self) -> Role {
        self.home_role
    }

    /// Creation position.
    #[must_use]
    pub const fn origin(&self) -> Vec3 {
        self.origin
    }

    #[must_use]
    pub const fn pair(&self) -> Option<EntityId> {
        self.pair
    }

    #[must_use]
    pub const fn target(&self) -> Option<Vec3> {
        self.target
    }

    /// Collapse progress in `[0, 1]`.
    #[must_use]
    pub const fn progress(&self) -> f32 {
        self.progress
    }

    /// Returns the entity to its creation state, keeping its pair link.
    pub(crate) fn restore(&mut self) {
        self.position = self.origin;
        self.velocity = Vec3::ZERO;
        self.role = self.home_role;
        self.observable = self.home_observable;
        self.target = None;
        self.progress = 0.0;
        self.collapse = None;
    }

    /// Ends a measurement: the creation role and observable return, the
    /// position stays where the measurement froze it.
    pub(crate) fn unmeasure(&mut self) {
        if self.role == Role::Measured {
            self.role = self.home_role;
        }
        self.observable = self.home_observable;
    }
}

/// Errors raised by pair bookkeeping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity {0:?} is not in the store")]
    Missing(EntityId),
    #[error("entity {0:?} cannot be paired with itself")]
    SelfPair(EntityId),
    #[error("entity {0:?} already has a partner")]
    AlreadyPaired(EntityId),
}

/// Dense storage with generational handles for entity access.
///
/// Iteration order is insertion order until the first removal; removals
/// swap the last row into the hole.
#[derive(Debug, Default)]
pub struct EntityStore {
    slots: SlotMap<EntityId, usize>,
    handles: Vec<EntityId>,
    rows: Vec<Entity>,
}

impl EntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert every seed, returning handles in seed order.
    pub fn create_all(&mut self, seeds: impl IntoIterator<Item = EntitySeed>) -> Vec<EntityId> {
        let seeds = seeds.into_iter();
        let (lower, _) = seeds.size_hint();
        self.reserve(lower);
        seeds.map(|seed| self.insert(seed)).collect()
    }

    /// Reserve space for additional entities.
    pub fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
        self.handles.reserve(additional);
        self.rows.reserve(additional);
    }

    /// Insert a new entity and return its handle.
    pub fn insert(&mut self, seed: EntitySeed) -> EntityId {
        let index = self.rows.len();
        self.rows.push(Entity::from_seed(seed));
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.slots.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let index = *self.slots.get(id)?;
        self.rows.get(index)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let index = *self.slots.get(id)?;
        self.rows.get_mut(index)
    }

    /// Iterate over live entity handles in dense order.
    pub fn iter_handles(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.handles.iter().copied()
    }

    /// Iterate over `(handle, entity)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> + '_ {
        self.handles.iter().copied().zip(self.rows.iter())
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut Entity)> + '_ {
        self.handles.iter().copied().zip(self.rows.iter_mut())
    }

    /// Visit every live entity in dense order.
    pub fn for_each(&self, mut visitor: impl FnMut(EntityId, &Entity)) {
        for (id, entity) in self.iter() {
            visitor(id, entity);
        }
    }

    /// Partner of `id`, if both ends are still alive.
    #[must_use]
    pub fn partner(&self, id: EntityId) -> Option<EntityId> {
        self.get(id)?.pair.filter(|partner| self.contains(*partner))
    }

    /// Link `a` and `b` as a correlated pair (both directions).
    pub fn link_pair(&mut self, a: EntityId, b: EntityId) -> Result<(), StoreError> {
        if a == b {
            return Err(StoreError::SelfPair(a));
        }
        for id in [a, b] {
            let entity = self.get(id).ok_or(StoreError::Missing(id))?;
            if entity.pair.is_some() {
                return Err(StoreError::AlreadyPaired(id));
            }
        }
        if let Some(entity) = self.get_mut(a) {
            entity.pair = Some(b);
        }
        if let Some(entity) = self.get_mut(b) {
            entity.pair = Some(a);
        }
        Ok(())
    }

    /// Break the pair link of `id` on both ends. Returns the former partner.
    pub fn unlink(&mut self, id: EntityId) -> Option<EntityId> {
        let partner = self.get_mut(id)?.pair.take()?;
        if let Some(other) = self.get_mut(partner) {
            if other.pair == Some(id) {
                other.pair = None;
            }
        }
        Some(partner)
    }

    /// Remove `id`, clearing its partner's back-reference.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.unlink(id);
        let index = self.slots.remove(id)?;
        let removed = self.rows.swap_remove(index);
        let removed_handle = self.handles.swap_remove(index);
        debug_assert_eq!(removed_handle, id);
        if index < self.handles.len() {
            let moved = self.handles[index];
            if let Some(slot) = self.slots.get_mut(moved) {
                *slot = index;
            }
        }
        Some(removed)
    }

    /// Release every entity. Outstanding handles stop resolving.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.handles.clear();
        self.rows.clear();
    }
}
