//! Core types shared across the Versefield workspace.
//!
//! A vignette is a small particle simulation coupled to a pointer-driven
//! interaction machine. [`SceneManager`] owns the lifecycle: it validates a
//! [`VignetteDescriptor`], populates the [`EntityStore`], advances the
//! [`SimClock`] once per host frame, and guarantees that nothing from a torn
//! down vignette reaches the next one.

pub mod config;
pub mod entity;
pub mod lifecycle;
pub mod machine;
pub mod pick;
pub mod rules;
pub mod schedule;
pub mod snapshot;

mod scene;
mod step;

use serde::{Deserialize, Serialize};

pub use config::{
    BindingWeight, BoundRule, CollapseSpec, CompiledRules, ConfigError, ControlBinding,
    DisturbanceSpec, InteractionSpec, MeasurementSpec, Payload, PickingSpec, RippleSpec,
    RuleBinding, ToggleSpec, VignetteDescriptor,
};
pub use entity::{Entity, EntityId, EntitySeed, EntityStore, Oscillator, Role, StoreError};
pub use glam::{Vec2, Vec3};
pub use lifecycle::{Dispatch, PointerInput, SceneHandle, SceneManager};
pub use machine::{
    ControlEvent, Event, InteractionMachine, Mutation, PickEvent, Side, StateLabel, TimerKey,
    TimerOp, Transition,
};
pub use pick::{CameraDescriptor, CameraState, Ray, normalize_pointer, pick};
pub use rules::{
    Correlation, DiffusionParams, Motion, OrbitParams, Pulse, PulseParams, RuleContext, RuleSpec,
    SpringParams, WaveFieldParams, WaveShape, WaveTerm,
};
pub use schedule::Scheduler;
pub use snapshot::{EntitySnapshot, FrameSnapshot};
pub use step::TickReport;

/// Simulation clock value (ticks processed since activation).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Tick reached after waiting `ticks` more ticks.
    #[must_use]
    pub const fn after(self, ticks: u32) -> Self {
        Self(self.0 + ticks as u64)
    }
}

/// Scene generation token; bumped on every activation.
///
/// Anything deferred captures the generation it was created under and is
/// discarded once the manager has moved on.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct SceneGeneration(pub u64);

impl SceneGeneration {
    /// Advances to the next generation.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Monotonic per-vignette clock feeding every time-dependent rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimClock {
    tick: Tick,
}

impl SimClock {
    #[must_use]
    pub const fn new() -> Self {
        Self { tick: Tick::zero() }
    }

    /// Current tick.
    #[must_use]
    pub const fn now(&self) -> Tick {
        self.tick
    }

    /// Rule time in tick units.
    #[must_use]
    pub fn time(&self) -> f32 {
        self.tick.0 as f32
    }

    /// Moves the clock forward by one tick.
    pub fn advance(&mut self) -> Tick {
        self.tick = self.tick.next();
        self.tick
    }

    /// Rewinds to zero (used on activation).
    pub fn reset(&mut self) {
        self.tick = Tick::zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_and_resets() {
        let mut clock = SimClock::new();
        assert_eq!(clock.advance(), Tick(1));
        assert_eq!(clock.advance(), Tick(2));
        assert_eq!(clock.time(), 2.0);
        clock.reset();
        assert_eq!(clock.now(), Tick::zero());
    }

    #[test]
    fn tick_after_offsets_forward() {
        assert_eq!(Tick(10).after(5), Tick(15));
        assert_eq!(SceneGeneration(3).next(), SceneGeneration(4));
    }
}
