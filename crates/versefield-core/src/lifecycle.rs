//! Scene lifecycle: activation, teardown, and generation-guarded dispatch.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::{ConfigError, Payload, VignetteDescriptor};
use crate::entity::EntityStore;
use crate::machine::{Event, PickEvent, StateLabel};
use crate::pick::{CameraDescriptor, CameraState, pick_along};
use crate::scene::Scene;
use crate::schedule::Scheduler;
use crate::snapshot::FrameSnapshot;
use crate::step::TickReport;
use crate::{SceneGeneration, SimClock};

/// Token returned by [`SceneManager::activate`]. It only addresses the
/// vignette it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneHandle {
    generation: SceneGeneration,
}

impl SceneHandle {
    #[must_use]
    pub const fn generation(&self) -> SceneGeneration {
        self.generation
    }
}

/// One host pointer action in normalized device coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerInput {
    pub ndc: Vec2,
    /// Host-assigned, strictly increasing per distinct action.
    pub sequence: u64,
}

/// Outcome of a host input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled { from: StateLabel, to: StateLabel },
    /// The machine did not react (unknown action or event).
    Ignored,
    /// The handle belongs to a torn-down vignette.
    Stale,
    /// The pointer sequence was already dispatched.
    Duplicate,
}

/// Owns the entity store, the scheduler, and at most one active scene.
#[derive(Debug, Default)]
pub struct SceneManager {
    store: EntityStore,
    scheduler: Scheduler,
    generation: SceneGeneration,
    active: Option<Scene>,
}

impl SceneManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `descriptor`, tear down the current vignette, then build the
    /// new one. On error the current vignette keeps running.
    pub fn activate(&mut self, descriptor: VignetteDescriptor) -> Result<SceneHandle, ConfigError> {
        let rules = descriptor.validate()?;
        self.teardown("replaced");

        self.generation = self.generation.next();
        let ids = self.store.create_all(descriptor.entities.iter().copied());
        for &[a, b] in &descriptor.pairs {
            if let Err(err) = self.store.link_pair(ids[a], ids[b]) {
                warn!(vignette = %descriptor.name, %err, "skipping pair");
            }
        }
        info!(
            vignette = %descriptor.name,
            generation = self.generation.0,
            entities = self.store.len(),
            pairs = descriptor.pairs.len(),
            shape = descriptor.interaction.shape_name(),
            "activated vignette"
        );
        self.active = Some(Scene::new(self.generation, descriptor, rules));
        Ok(SceneHandle {
            generation: self.generation,
        })
    }

    /// Tear down the vignette addressed by `handle`. Returns `false` when
    /// the handle is stale.
    pub fn deactivate(&mut self, handle: SceneHandle) -> bool {
        if !self.is_current(handle) {
            trace!(generation = handle.generation.0, "ignoring stale deactivate");
            return false;
        }
        self.teardown("deactivated");
        true
    }

    fn teardown(&mut self, reason: &'static str) {
        let Some(scene) = self.active.take() else {
            return;
        };
        let cancelled = self.scheduler.cancel_generation(scene.generation());
        let entities = self.store.len();
        self.store.clear();
        info!(
            vignette = %scene.descriptor().name,
            generation = scene.generation().0,
            entities,
            cancelled_timers = cancelled,
            dropped_mutations = scene.pending_mutations(),
            reason,
            "tore down vignette"
        );
    }

    /// Whether `handle` addresses the active vignette.
    #[must_use]
    pub fn is_current(&self, handle: SceneHandle) -> bool {
        self.active
            .as_ref()
            .is_some_and(|scene| scene.generation() == handle.generation)
    }

    /// Advance the active vignette by one tick.
    pub fn tick(&mut self, handle: SceneHandle) -> Option<TickReport> {
        if !self.is_current(handle) {
            trace!(generation = handle.generation.0, "ignoring stale tick");
            return None;
        }
        let scene = self.active.as_mut()?;
        Some(scene.step(&mut self.store, &mut self.scheduler))
    }

    /// Pick under the pointer and dispatch one pick event.
    pub fn pointer(
        &mut self,
        handle: SceneHandle,
        input: PointerInput,
        camera: &CameraDescriptor,
    ) -> Dispatch {
        if !self.is_current(handle) {
            trace!(generation = handle.generation.0, "ignoring stale pointer");
            return Dispatch::Stale;
        }
        let Some(scene) = self.active.as_mut() else {
            return Dispatch::Stale;
        };
        if !scene.accept_pointer(input.sequence) {
            trace!(sequence = input.sequence, "dropping duplicate pointer");
            return Dispatch::Duplicate;
        }

        let picking = scene.descriptor().picking;
        let ray = CameraState::new(camera).and_then(|camera| camera.ray(input.ndc));
        let event = match ray {
            Some(ray) => PickEvent {
                hit: pick_along(
                    &ray,
                    self.store
                        .iter()
                        .map(|(id, entity)| (id, entity.position())),
                    picking.tolerance,
                ),
                point: ray.intersect_plane_y(picking.ground_height),
            },
            None => {
                debug!(sequence = input.sequence, "pointer ray unavailable");
                PickEvent::default()
            }
        };
        let transition = scene.dispatch(&Event::Pick(event), &self.store, &mut self.scheduler);
        outcome(transition.accepted, transition.from, transition.next)
    }

    /// Dispatch a named control action.
    pub fn control(&mut self, handle: SceneHandle, action: &str, payload: Payload) -> Dispatch {
        if !self.is_current(handle) {
            trace!(generation = handle.generation.0, action, "ignoring stale control");
            return Dispatch::Stale;
        }
        let Some(scene) = self.active.as_mut() else {
            return Dispatch::Stale;
        };
        let Some(event) = scene
            .descriptor()
            .controls
            .get(action)
            .and_then(|binding| binding.to_event(payload))
        else {
            debug!(action, ?payload, "unbound control action");
            return Dispatch::Ignored;
        };
        let transition =
            scene.dispatch(&Event::Control(event), &self.store, &mut self.scheduler);
        outcome(transition.accepted, transition.from, transition.next)
    }

    /// Frame for the renderer, or `None` with nothing active.
    #[must_use]
    pub fn snapshot(&self) -> Option<FrameSnapshot> {
        self.active
            .as_ref()
            .map(|scene| scene.snapshot(&self.store))
    }

    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Latest generation issued.
    #[must_use]
    pub const fn generation(&self) -> SceneGeneration {
        self.generation
    }

    #[must_use]
    pub fn active_name(&self) -> Option<&str> {
        self.active
            .as_ref()
            .map(|scene| scene.descriptor().name.as_str())
    }

    #[must_use]
    pub fn state(&self) -> Option<StateLabel> {
        self.active.as_ref().map(|scene| scene.machine().state())
    }

    /// Shared coherence of the active vignette.
    #[must_use]
    pub fn coherence(&self) -> Option<f32> {
        self.active
            .as_ref()
            .map(|scene| scene.machine().coherence())
    }

    #[must_use]
    pub fn clock(&self) -> Option<SimClock> {
        self.active.as_ref().map(Scene::clock)
    }

    #[must_use]
    pub fn last_report(&self) -> Option<TickReport> {
        self.active.as_ref().map(Scene::last_report)
    }

    /// Timers waiting in the scheduler, stale ones included.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.scheduler.len()
    }
}

fn outcome(accepted: bool, from: StateLabel, to: StateLabel) -> Dispatch {
    if accepted {
        Dispatch::Handled { from, to }
    } else {
        Dispatch::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControlBinding, InteractionSpec, ToggleSpec};
    use crate::entity::{EntitySeed, Role};
    use glam::Vec3;
    use std::collections::BTreeMap;

    fn toggle_vignette(name: &str) -> VignetteDescriptor {
        VignetteDescriptor {
            name: name.to_owned(),
            seed: Some(5),
            entities: vec![EntitySeed::new(Vec3::ZERO, Role::Free); 2],
            pairs: vec![[0, 1]],
            rules: BTreeMap::new(),
            bindings: Vec::new(),
            interaction: InteractionSpec::Toggle(ToggleSpec {
                blend_ticks: 3,
                labels: ["wave".to_owned(), "particle".to_owned()],
            }),
            controls: BTreeMap::from([("flip".to_owned(), ControlBinding::Toggle)]),
            picking: Default::default(),
        }
    }

    #[test]
    fn activation_replaces_the_previous_vignette() {
        let mut manager = SceneManager::new();
        let first = manager.activate(toggle_vignette("first")).expect("first");
        let old_ids: Vec<_> = manager.store().iter_handles().collect();
        let second = manager.activate(toggle_vignette("second")).expect("second");
        assert_ne!(first, second);
        assert_eq!(manager.active_name(), Some("second"));
        assert_eq!(manager.store().len(), 2);
        assert!(old_ids.iter().all(|id| !manager.store().contains(*id)));
        assert_eq!(manager.tick(first), None);
        assert_eq!(manager.control(first, "flip", Payload::None), Dispatch::Stale);
        assert!(!manager.deactivate(first));
        assert!(manager.tick(second).is_some());
    }

    #[test]
    fn failed_activation_keeps_the_current_vignette() {
        let mut manager = SceneManager::new();
        let handle = manager.activate(toggle_vignette("keep")).expect("keep");
        let mut broken = toggle_vignette("broken");
        broken.pairs = vec![[0, 0]];
        assert!(manager.activate(broken).is_err());
        assert!(manager.is_current(handle));
        assert_eq!(manager.active_name(), Some("keep"));
    }

    #[test]
    fn controls_route_through_bindings() {
        let mut manager = SceneManager::new();
        let handle = manager.activate(toggle_vignette("toggle")).expect("toggle");
        assert_eq!(
            manager.control(handle, "flip", Payload::None),
            Dispatch::Handled {
                from: StateLabel::SideA,
                to: StateLabel::Blending
            }
        );
        assert_eq!(manager.control(handle, "missing", Payload::None), Dispatch::Ignored);
        for _ in 0..3 {
            manager.tick(handle);
        }
        assert_eq!(manager.state(), Some(StateLabel::SideB));
    }

    #[test]
    fn pointer_sequences_dispatch_once() {
        let mut manager = SceneManager::new();
        let handle = manager.activate(toggle_vignette("pointer")).expect("pointer");
        let camera = CameraDescriptor::default();
        let input = PointerInput {
            ndc: Vec2::ZERO,
            sequence: 4,
        };
        assert_eq!(manager.pointer(handle, input, &camera), Dispatch::Ignored);
        assert_eq!(manager.pointer(handle, input, &camera), Dispatch::Duplicate);
        let older = PointerInput {
            sequence: 3,
            ..input
        };
        assert_eq!(manager.pointer(handle, older, &camera), Dispatch::Duplicate);
    }

    #[test]
    fn deactivate_clears_everything() {
        let mut manager = SceneManager::new();
        let handle = manager.activate(toggle_vignette("gone")).expect("gone");
        assert!(manager.deactivate(handle));
        assert!(manager.store().is_empty());
        assert!(manager.snapshot().is_none());
        assert_eq!(manager.tick(handle), None);
    }
}
