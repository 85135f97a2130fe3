//! Interaction state machines.
//!
//! Each vignette runs exactly one machine shape. The machine never touches
//! the entity store directly: [`InteractionMachine::handle`] returns a
//! [`Transition`] listing the entity mutations to apply on the next step
//! and the timers to start or cancel. Per-tick bookkeeping (blend ramps,
//! coherence recovery, settlement, pulse expiry) runs in
//! [`InteractionMachine::advance`] after the step.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use glam::{Vec2, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::{
    CollapseSpec, DisturbanceSpec, InteractionSpec, MeasurementSpec, RippleSpec, ToggleSpec,
};
use crate::entity::{EntityId, EntityStore};
use crate::rules::{Correlation, Pulse};
use crate::step::TickReport;

/// Largest factor a gain slider may apply.
pub const MAX_GAIN: f32 = 4.0;

/// Snap distance for the toggle blend.
const BLEND_EPSILON: f32 = 1e-6;

/// Toggle side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
    A,
    B,
}

impl Side {
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    const fn blend(self) -> f32 {
        match self {
            Self::A => 0.0,
            Self::B => 1.0,
        }
    }
}

/// Named host control action after payload decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    Toggle,
    Select(Side),
    Reset,
    Disturb { amount: Option<f32> },
    SetGain { rule: String, value: f32 },
}

/// Outcome of one pointer action.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PickEvent {
    /// Entity under the pointer.
    pub hit: Option<EntityId>,
    /// Where the pointer ray meets the ground plane.
    pub point: Option<Vec3>,
}

/// Events the machine consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Pick(PickEvent),
    Control(ControlEvent),
    Timer(TimerKey),
}

/// Identity of a deferred effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKey {
    /// End the measurement of an entity and its partner.
    Revert(EntityId),
}

/// Timer change requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    Start { key: TimerKey, after_ticks: u32 },
    Cancel(TimerKey),
}

/// Entity change applied at the start of the next step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation {
    /// Move toward `target` under the collapse rule.
    BeginCollapse { id: EntityId, target: Vec3 },
    /// Return to creation position, role, and observable.
    Restore { id: EntityId },
    /// Freeze with `value`; the correlation pass updates the partner.
    Measure { id: EntityId, value: f32 },
    /// End the measurement of `id` and its partner.
    Revert { id: EntityId },
}

/// Externally visible machine state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StateLabel {
    Passive,
    SideA,
    SideB,
    Blending,
    Idle,
    Collapsing,
    Settled,
    Coherent,
    PartiallyDecohered,
    FullyDecohered,
    Unmeasured,
    Measured,
    Calm,
    Rippling,
}

impl StateLabel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::SideA => "side-a",
            Self::SideB => "side-b",
            Self::Blending => "blending",
            Self::Idle => "idle",
            Self::Collapsing => "collapsing",
            Self::Settled => "settled",
            Self::Coherent => "coherent",
            Self::PartiallyDecohered => "partially-decohered",
            Self::FullyDecohered => "fully-decohered",
            Self::Unmeasured => "unmeasured",
            Self::Measured => "measured",
            Self::Calm => "calm",
            Self::Rippling => "rippling",
        }
    }
}

impl fmt::Display for StateLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: StateLabel,
    pub next: StateLabel,
    /// Whether the event changed anything. Ignored events leave every
    /// other field empty and `from == next`.
    pub accepted: bool,
    pub mutations: SmallVec<[Mutation; 4]>,
    pub timers: SmallVec<[TimerOp; 2]>,
}

impl Transition {
    fn ignored(state: StateLabel) -> Self {
        Self {
            from: state,
            next: state,
            accepted: false,
            mutations: SmallVec::new(),
            timers: SmallVec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollapsePhase {
    Idle,
    Collapsing,
    Settled,
}

#[derive(Debug, Clone)]
enum Shape {
    Passive,
    Toggle {
        spec: ToggleSpec,
        blend: f32,
        target: Side,
    },
    Collapse {
        spec: CollapseSpec,
        phase: CollapsePhase,
    },
    Disturbance {
        spec: DisturbanceSpec,
        coherence: f32,
    },
    Measurement {
        spec: MeasurementSpec,
        /// Measured entity mapped to the partner measured with it.
        measured: BTreeMap<EntityId, Option<EntityId>>,
    },
    Ripple {
        spec: RippleSpec,
        pulses: VecDeque<Pulse>,
    },
}

/// Interaction state for the active vignette.
#[derive(Debug, Clone)]
pub struct InteractionMachine {
    shape: Shape,
    gains: BTreeMap<String, f32>,
    pulses: Vec<Pulse>,
}

impl InteractionMachine {
    #[must_use]
    pub fn new(spec: &InteractionSpec) -> Self {
        let shape = match spec {
            InteractionSpec::Passive => Shape::Passive,
            InteractionSpec::Toggle(spec) => Shape::Toggle {
                spec: spec.clone(),
                blend: 0.0,
                target: Side::A,
            },
            InteractionSpec::Collapse(spec) => Shape::Collapse {
                spec: spec.clone(),
                phase: CollapsePhase::Idle,
            },
            InteractionSpec::Disturbance(spec) => Shape::Disturbance {
                spec: spec.clone(),
                coherence: 1.0,
            },
            InteractionSpec::Measurement(spec) => Shape::Measurement {
                spec: spec.clone(),
                measured: BTreeMap::new(),
            },
            InteractionSpec::Ripple(spec) => Shape::Ripple {
                spec: spec.clone(),
                pulses: VecDeque::new(),
            },
        };
        Self {
            shape,
            gains: BTreeMap::new(),
            pulses: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> StateLabel {
        match &self.shape {
            Shape::Passive => StateLabel::Passive,
            Shape::Toggle { blend, target, .. } => match (*target, *blend) {
                (Side::A, blend) if blend <= 0.0 => StateLabel::SideA,
                (Side::B, blend) if blend >= 1.0 => StateLabel::SideB,
                _ => StateLabel::Blending,
            },
            Shape::Collapse { phase, .. } => match phase {
                CollapsePhase::Idle => StateLabel::Idle,
                CollapsePhase::Collapsing => StateLabel::Collapsing,
                CollapsePhase::Settled => StateLabel::Settled,
            },
            Shape::Disturbance { coherence, .. } => {
                if *coherence >= 1.0 {
                    StateLabel::Coherent
                } else if *coherence <= 0.0 {
                    StateLabel::FullyDecohered
                } else {
                    StateLabel::PartiallyDecohered
                }
            }
            Shape::Measurement { measured, .. } => {
                if measured.is_empty() {
                    StateLabel::Unmeasured
                } else {
                    StateLabel::Measured
                }
            }
            Shape::Ripple { pulses, .. } => {
                if pulses.is_empty() {
                    StateLabel::Calm
                } else {
                    StateLabel::Rippling
                }
            }
        }
    }

    /// Toggle blend in `[0, 1]`; 0 shows side A. Always 0 for other shapes.
    #[must_use]
    pub fn blend(&self) -> f32 {
        match &self.shape {
            Shape::Toggle { blend, .. } => *blend,
            _ => 0.0,
        }
    }

    /// Shared coherence in `[0, 1]`; always 1 outside disturbance vignettes.
    #[must_use]
    pub fn coherence(&self) -> f32 {
        match &self.shape {
            Shape::Disturbance { coherence, .. } => *coherence,
            _ => 1.0,
        }
    }

    /// Active pulses, oldest first.
    #[must_use]
    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    /// Current gain for `rule` (1 unless a slider moved it).
    #[must_use]
    pub fn gain(&self, rule: &str) -> f32 {
        self.gains.get(rule).copied().unwrap_or(1.0)
    }

    /// Progress increment of a collapse vignette.
    #[must_use]
    pub fn collapse_increment(&self) -> Option<f32> {
        match &self.shape {
            Shape::Collapse { spec, .. } => Some(spec.increment),
            _ => None,
        }
    }

    /// Correlation applied to measured pairs.
    #[must_use]
    pub fn correlation(&self) -> Correlation {
        match &self.shape {
            Shape::Measurement { spec, .. } => spec.correlation,
            _ => Correlation::default(),
        }
    }

    /// Handle one event. Events a state does not recognise are ignored.
    pub fn handle(
        &mut self,
        event: &Event,
        store: &EntityStore,
        rng: &mut impl Rng,
        time: f32,
    ) -> Transition {
        let from = self.state();
        if let Event::Control(ControlEvent::SetGain { rule, value }) = event {
            if !value.is_finite() {
                return Transition::ignored(from);
            }
            self.gains
                .insert(rule.clone(), value.clamp(0.0, MAX_GAIN));
            return Transition {
                accepted: true,
                ..Transition::ignored(from)
            };
        }

        let mut transition = Transition::ignored(from);
        transition.accepted = match &mut self.shape {
            Shape::Passive => false,
            Shape::Toggle {
                blend, target, ..
            } => handle_toggle(event, blend, target),
            Shape::Collapse { spec, phase } => {
                handle_collapse(event, spec, phase, store, &mut transition)
            }
            Shape::Disturbance { spec, coherence } => handle_disturbance(event, spec, coherence),
            Shape::Measurement { spec, measured } => {
                handle_measurement(event, spec, measured, store, rng, &mut transition)
            }
            Shape::Ripple { spec, pulses } => handle_ripple(event, spec, pulses, store, time),
        };
        self.sync_pulses();
        transition.next = self.state();
        if transition.accepted {
            debug!(
                from = %transition.from,
                next = %transition.next,
                mutations = transition.mutations.len(),
                timers = transition.timers.len(),
                "interaction transition"
            );
        }
        transition
    }

    /// Per-tick bookkeeping after the step has run.
    pub fn advance(&mut self, report: &TickReport, time: f32) {
        match &mut self.shape {
            Shape::Passive | Shape::Measurement { .. } => {}
            Shape::Toggle {
                spec,
                blend,
                target,
            } => {
                let goal = target.blend();
                let step = 1.0 / spec.blend_ticks as f32;
                let next = if goal > *blend {
                    (*blend + step).min(goal)
                } else {
                    (*blend - step).max(goal)
                };
                *blend = if (next - goal).abs() <= BLEND_EPSILON {
                    goal
                } else {
                    next
                };
            }
            Shape::Collapse { phase, .. } => {
                if *phase == CollapsePhase::Collapsing && report.collapsing == 0 {
                    *phase = CollapsePhase::Settled;
                    debug!(tick = report.tick.0, settled = report.settled, "collapse settled");
                }
            }
            Shape::Disturbance { spec, coherence } => {
                let next = (*coherence + spec.recovery).clamp(0.0, 1.0);
                // f32 accumulation drifts below 1; land on it within half a step.
                *coherence = if 1.0 - next <= spec.recovery * 0.5 {
                    1.0
                } else {
                    next
                };
            }
            Shape::Ripple { pulses, .. } => {
                pulses.retain(|pulse| !pulse.is_expired(time));
            }
        }
        self.sync_pulses();
    }

    fn sync_pulses(&mut self) {
        self.pulses.clear();
        if let Shape::Ripple { pulses, .. } = &self.shape {
            self.pulses.extend(pulses.iter().copied());
        }
    }
}

fn handle_toggle(event: &Event, blend: &mut f32, target: &mut Side) -> bool {
    let Event::Control(control) = event else {
        return false;
    };
    match control {
        ControlEvent::Toggle => {
            *target = target.flipped();
            true
        }
        ControlEvent::Select(side) => {
            let changed = *side != *target;
            *target = *side;
            changed
        }
        ControlEvent::Reset => {
            *target = Side::A;
            *blend = 0.0;
            true
        }
        _ => false,
    }
}

fn handle_collapse(
    event: &Event,
    spec: &CollapseSpec,
    phase: &mut CollapsePhase,
    store: &EntityStore,
    transition: &mut Transition,
) -> bool {
    match (event, *phase) {
        (Event::Pick(pick), CollapsePhase::Idle) => {
            let anchor = pick
                .hit
                .and_then(|id| store.get(id))
                .filter(|entity| spec.roles.contains(&entity.home_role()))
                .map(|entity| entity.position())
                .or_else(|| pick.point.filter(|_| spec.empty_space));
            let Some(anchor) = anchor else {
                return false;
            };
            let affected: Vec<(EntityId, Vec3)> = store
                .iter()
                .filter(|(_, entity)| spec.roles.contains(&entity.home_role()))
                .map(|(id, entity)| (id, entity.origin()))
                .collect();
            if affected.is_empty() {
                return false;
            }
            let centroid =
                affected.iter().map(|(_, origin)| *origin).sum::<Vec3>() / affected.len() as f32;
            transition
                .mutations
                .extend(affected.into_iter().map(|(id, origin)| Mutation::BeginCollapse {
                    id,
                    target: anchor + (origin - centroid) * spec.spread,
                }));
            *phase = CollapsePhase::Collapsing;
            true
        }
        (Event::Control(ControlEvent::Reset), CollapsePhase::Collapsing | CollapsePhase::Settled) => {
            transition.mutations.extend(
                store
                    .iter()
                    .filter(|(_, entity)| spec.roles.contains(&entity.home_role()))
                    .map(|(id, _)| Mutation::Restore { id }),
            );
            *phase = CollapsePhase::Idle;
            true
        }
        _ => false,
    }
}

fn handle_disturbance(event: &Event, spec: &DisturbanceSpec, coherence: &mut f32) -> bool {
    let amount = match event {
        Event::Control(ControlEvent::Disturb { amount }) => amount.unwrap_or(spec.drop),
        Event::Pick(_) if spec.pick_disturbs => spec.drop,
        Event::Control(ControlEvent::Reset) => {
            *coherence = 1.0;
            return true;
        }
        _ => return false,
    };
    if !amount.is_finite() {
        return false;
    }
    *coherence = (*coherence - amount).clamp(0.0, 1.0);
    true
}

fn handle_measurement(
    event: &Event,
    spec: &MeasurementSpec,
    measured: &mut BTreeMap<EntityId, Option<EntityId>>,
    store: &EntityStore,
    rng: &mut impl Rng,
    transition: &mut Transition,
) -> bool {
    match event {
        Event::Pick(PickEvent { hit: Some(id), .. }) => {
            let Some(entity) = store.get(*id) else {
                return false;
            };
            if !spec.roles.contains(&entity.role()) {
                return false;
            }
            let partner = store.partner(*id);
            let busy = |candidate: EntityId| {
                measured
                    .iter()
                    .any(|(primary, other)| *primary == candidate || *other == Some(candidate))
            };
            if busy(*id) || partner.is_some_and(busy) {
                return false;
            }
            let value = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            measured.insert(*id, partner);
            transition.mutations.push(Mutation::Measure { id: *id, value });
            if let Some(after_ticks) = spec.cooldown_ticks {
                transition.timers.push(TimerOp::Start {
                    key: TimerKey::Revert(*id),
                    after_ticks,
                });
            }
            true
        }
        Event::Timer(TimerKey::Revert(id)) => {
            if measured.remove(id).is_none() {
                return false;
            }
            transition.mutations.push(Mutation::Revert { id: *id });
            true
        }
        Event::Control(ControlEvent::Reset) => {
            if measured.is_empty() {
                return false;
            }
            for (id, _) in std::mem::take(measured) {
                transition.mutations.push(Mutation::Revert { id });
                transition.timers.push(TimerOp::Cancel(TimerKey::Revert(id)));
            }
            true
        }
        _ => false,
    }
}

fn handle_ripple(
    event: &Event,
    spec: &RippleSpec,
    pulses: &mut VecDeque<Pulse>,
    store: &EntityStore,
    time: f32,
) -> bool {
    match event {
        Event::Pick(pick) => {
            let anchor = pick
                .hit
                .and_then(|id| store.get(id))
                .map(|entity| entity.position())
                .or(pick.point);
            let Some(anchor) = anchor else {
                return false;
            };
            pulses.push_back(Pulse {
                origin: Vec2::new(anchor.x, anchor.z),
                start: time,
                params: spec.pulse,
            });
            while pulses.len() > spec.max_pulses {
                pulses.pop_front();
            }
            true
        }
        Event::Control(ControlEvent::Reset) => {
            let had_pulses = !pulses.is_empty();
            pulses.clear();
            had_pulses
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tick;
    use crate::entity::{EntitySeed, Role};
    use crate::rules::PulseParams;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn report(collapsing: usize) -> TickReport {
        TickReport {
            tick: Tick(1),
            collapsing,
            ..TickReport::default()
        }
    }

    fn store_with(roles: &[Role]) -> (EntityStore, Vec<EntityId>) {
        let mut store = EntityStore::new();
        let ids = store.create_all(
            roles
                .iter()
                .enumerate()
                .map(|(i, role)| EntitySeed::new(Vec3::new(i as f32, 0.0, 0.0), *role)),
        );
        (store, ids)
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(11)
    }

    #[test]
    fn toggle_blends_over_fixed_ticks() {
        let mut machine = InteractionMachine::new(&InteractionSpec::Toggle(ToggleSpec {
            blend_ticks: 4,
            labels: ["wave".to_owned(), "particle".to_owned()],
        }));
        let (store, _) = store_with(&[]);
        let transition = machine.handle(
            &Event::Control(ControlEvent::Toggle),
            &store,
            &mut rng(),
            0.0,
        );
        assert!(transition.accepted);
        assert_eq!(transition.from, StateLabel::SideA);
        assert_eq!(transition.next, StateLabel::Blending);
        for _ in 0..3 {
            machine.advance(&report(0), 0.0);
            assert_eq!(machine.state(), StateLabel::Blending);
        }
        machine.advance(&report(0), 0.0);
        assert_eq!(machine.blend(), 1.0);
        assert_eq!(machine.state(), StateLabel::SideB);
    }

    #[test]
    fn toggle_mid_blend_reverses_from_current_value() {
        let mut machine = InteractionMachine::new(&InteractionSpec::Toggle(ToggleSpec {
            blend_ticks: 10,
            labels: ["a".to_owned(), "b".to_owned()],
        }));
        let (store, _) = store_with(&[]);
        let toggle = Event::Control(ControlEvent::Toggle);
        machine.handle(&toggle, &store, &mut rng(), 0.0);
        for _ in 0..3 {
            machine.advance(&report(0), 0.0);
        }
        machine.handle(&toggle, &store, &mut rng(), 0.0);
        machine.advance(&report(0), 0.0);
        assert!((machine.blend() - 0.2).abs() < 1e-5);
        let same = machine.handle(
            &Event::Control(ControlEvent::Select(Side::A)),
            &store,
            &mut rng(),
            0.0,
        );
        assert!(!same.accepted);
    }

    #[test]
    fn collapse_ignores_repeat_picks_until_reset() {
        let (store, ids) = store_with(&[Role::Free, Role::Free, Role::Marker]);
        let mut machine = InteractionMachine::new(&InteractionSpec::Collapse(CollapseSpec {
            increment: 0.25,
            roles: vec![Role::Free],
            spread: 0.0,
            empty_space: false,
        }));
        let pick = Event::Pick(PickEvent {
            hit: Some(ids[1]),
            point: None,
        });
        let first = machine.handle(&pick, &store, &mut rng(), 0.0);
        assert_eq!(first.next, StateLabel::Collapsing);
        assert_eq!(first.mutations.len(), 2);
        assert!(first.mutations.iter().all(|mutation| matches!(
            mutation,
            Mutation::BeginCollapse { target, .. } if *target == Vec3::new(1.0, 0.0, 0.0)
        )));

        let second = machine.handle(&pick, &store, &mut rng(), 0.0);
        assert!(!second.accepted);
        assert!(second.mutations.is_empty());

        machine.advance(&report(0), 1.0);
        assert_eq!(machine.state(), StateLabel::Settled);
        assert!(!machine.handle(&pick, &store, &mut rng(), 1.0).accepted);

        let reset = machine.handle(
            &Event::Control(ControlEvent::Reset),
            &store,
            &mut rng(),
            1.0,
        );
        assert_eq!(reset.next, StateLabel::Idle);
        assert_eq!(reset.mutations.len(), 2);
    }

    #[test]
    fn pick_after_reset_sees_entities_awaiting_restore() {
        let (mut store, ids) = store_with(&[Role::Free, Role::Free]);
        let mut machine = InteractionMachine::new(&InteractionSpec::Collapse(CollapseSpec {
            increment: 0.5,
            roles: vec![Role::Free],
            spread: 0.0,
            empty_space: false,
        }));
        let pick = Event::Pick(PickEvent {
            hit: Some(ids[0]),
            point: None,
        });
        assert!(machine.handle(&pick, &store, &mut rng(), 0.0).accepted);
        for id in &ids {
            store.get_mut(*id).expect("entity").role = Role::Settled;
        }
        machine.advance(&report(0), 1.0);
        machine.handle(&Event::Control(ControlEvent::Reset), &store, &mut rng(), 1.0);
        assert_eq!(machine.state(), StateLabel::Idle);

        let again = machine.handle(&pick, &store, &mut rng(), 1.0);
        assert!(again.accepted);
        assert_eq!(again.next, StateLabel::Collapsing);
        assert_eq!(again.mutations.len(), 2);
    }

    #[test]
    fn collapse_miss_without_empty_space_stays_idle() {
        let (store, ids) = store_with(&[Role::Free, Role::Marker]);
        let mut machine = InteractionMachine::new(&InteractionSpec::Collapse(CollapseSpec {
            increment: 0.5,
            roles: vec![Role::Free],
            spread: 1.0,
            empty_space: false,
        }));
        let miss = Event::Pick(PickEvent {
            hit: None,
            point: Some(Vec3::new(3.0, 0.0, 3.0)),
        });
        assert!(!machine.handle(&miss, &store, &mut rng(), 0.0).accepted);
        let wrong_role = Event::Pick(PickEvent {
            hit: Some(ids[1]),
            point: None,
        });
        assert!(!machine.handle(&wrong_role, &store, &mut rng(), 0.0).accepted);
        assert_eq!(machine.state(), StateLabel::Idle);
    }

    #[test]
    fn empty_space_collapse_spreads_around_anchor() {
        let (store, _) = store_with(&[Role::Free, Role::Free]);
        let mut machine = InteractionMachine::new(&InteractionSpec::Collapse(CollapseSpec {
            increment: 0.5,
            roles: vec![Role::Free],
            spread: 2.0,
            empty_space: true,
        }));
        let anchor = Vec3::new(0.0, 0.0, 5.0);
        let transition = machine.handle(
            &Event::Pick(PickEvent {
                hit: None,
                point: Some(anchor),
            }),
            &store,
            &mut rng(),
            0.0,
        );
        let targets: Vec<Vec3> = transition
            .mutations
            .iter()
            .filter_map(|mutation| match mutation {
                Mutation::BeginCollapse { target, .. } => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(
            targets,
            vec![Vec3::new(-1.0, 0.0, 5.0), Vec3::new(1.0, 0.0, 5.0)]
        );
    }

    #[test]
    fn disturbance_clamps_coherence() {
        let (store, _) = store_with(&[]);
        let mut machine = InteractionMachine::new(&InteractionSpec::Disturbance(DisturbanceSpec {
            drop: 0.4,
            recovery: 0.5,
            pick_disturbs: true,
        }));
        let disturb = Event::Control(ControlEvent::Disturb { amount: None });
        machine.handle(&disturb, &store, &mut rng(), 0.0);
        assert_eq!(machine.state(), StateLabel::PartiallyDecohered);
        for _ in 0..5 {
            machine.handle(&disturb, &store, &mut rng(), 0.0);
            assert!((0.0..=1.0).contains(&machine.coherence()));
        }
        assert_eq!(machine.state(), StateLabel::FullyDecohered);
        machine.handle(&Event::Pick(PickEvent::default()), &store, &mut rng(), 0.0);
        assert_eq!(machine.coherence(), 0.0);
        for _ in 0..5 {
            machine.advance(&report(0), 0.0);
        }
        assert_eq!(machine.coherence(), 1.0);
        assert_eq!(machine.state(), StateLabel::Coherent);
    }

    #[test]
    fn measurement_ignores_busy_pairs_and_reverts_on_timer() {
        let (mut store, ids) = store_with(&[Role::PairedA, Role::PairedB]);
        store.link_pair(ids[0], ids[1]).expect("pair");
        let mut machine = InteractionMachine::new(&InteractionSpec::Measurement(MeasurementSpec {
            roles: vec![Role::PairedA, Role::PairedB],
            cooldown_ticks: Some(30),
            correlation: Correlation::Inverse,
        }));
        let first = machine.handle(
            &Event::Pick(PickEvent {
                hit: Some(ids[0]),
                point: None,
            }),
            &store,
            &mut rng(),
            0.0,
        );
        assert_eq!(first.next, StateLabel::Measured);
        assert!(matches!(
            first.mutations.as_slice(),
            [Mutation::Measure { id, value }] if *id == ids[0] && value.abs() == 1.0
        ));
        assert_eq!(
            first.timers.as_slice(),
            [TimerOp::Start {
                key: TimerKey::Revert(ids[0]),
                after_ticks: 30
            }]
        );

        let partner_pick = machine.handle(
            &Event::Pick(PickEvent {
                hit: Some(ids[1]),
                point: None,
            }),
            &store,
            &mut rng(),
            0.0,
        );
        assert!(!partner_pick.accepted);

        let revert = machine.handle(
            &Event::Timer(TimerKey::Revert(ids[0])),
            &store,
            &mut rng(),
            30.0,
        );
        assert_eq!(revert.next, StateLabel::Unmeasured);
        assert_eq!(revert.mutations.as_slice(), [Mutation::Revert { id: ids[0] }]);
        let duplicate = machine.handle(
            &Event::Timer(TimerKey::Revert(ids[0])),
            &store,
            &mut rng(),
            31.0,
        );
        assert!(!duplicate.accepted);
    }

    #[test]
    fn ripple_caps_and_expires_pulses() {
        let (store, _) = store_with(&[]);
        let params = PulseParams {
            amplitude: 1.0,
            speed: 1.0,
            wavenumber: 1.0,
            width: 2.0,
            falloff: 5.0,
        };
        let mut machine = InteractionMachine::new(&InteractionSpec::Ripple(RippleSpec {
            pulse: params,
            max_pulses: 2,
        }));
        for i in 0..3 {
            machine.handle(
                &Event::Pick(PickEvent {
                    hit: None,
                    point: Some(Vec3::new(i as f32, 0.0, 0.0)),
                }),
                &store,
                &mut rng(),
                i as f32,
            );
        }
        assert_eq!(machine.pulses().len(), 2);
        assert_eq!(machine.pulses()[0].origin, Vec2::new(1.0, 0.0));
        assert_eq!(machine.state(), StateLabel::Rippling);
        machine.advance(&report(0), 10.0);
        assert!(machine.pulses().is_empty());
        assert_eq!(machine.state(), StateLabel::Calm);
    }

    #[test]
    fn gains_are_clamped_and_shape_independent() {
        let (store, _) = store_with(&[]);
        let mut machine = InteractionMachine::new(&InteractionSpec::Passive);
        let transition = machine.handle(
            &Event::Control(ControlEvent::SetGain {
                rule: "orbit".to_owned(),
                value: 9.0,
            }),
            &store,
            &mut rng(),
            0.0,
        );
        assert!(transition.accepted);
        assert_eq!(machine.gain("orbit"), MAX_GAIN);
        assert_eq!(machine.gain("other"), 1.0);
        let unknown = machine.handle(
            &Event::Control(ControlEvent::Toggle),
            &store,
            &mut rng(),
            0.0,
        );
        assert!(!unknown.accepted);
        assert_eq!(unknown.next, StateLabel::Passive);
    }
}
