//! Two-pass simulation step.
//!
//! Pass 1 applies queued mutations, then every bound rule, each reading only
//! its own entity. Pass 2 propagates measurements to partners from the
//! values committed in pass 1.

use glam::Vec3;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, trace};

use crate::Tick;
use crate::config::CompiledRules;
use crate::entity::{CollapseTrack, EntityId, EntityStore, Role};
use crate::machine::{InteractionMachine, Mutation};
use crate::rules::{Correlation, RuleContext, collapse_to_target};

/// Summary of one step, fed back to the machine and exposed to hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: Tick,
    /// Entities still moving toward a collapse target.
    pub collapsing: usize,
    /// Entities that reached their target during this step.
    pub settled: usize,
    /// Measurements committed during this step.
    pub measured: usize,
    /// Partners updated by the correlation pass.
    pub correlated: usize,
    /// Timers delivered to the machine before the step.
    pub fired_timers: usize,
}

/// Apply queued mutations and return the measurements they committed.
///
/// A revert later in the batch cancels an earlier measurement of either
/// pair member, so pass 2 never correlates from a value already undone.
pub(crate) fn apply_mutations(
    store: &mut EntityStore,
    mutations: impl IntoIterator<Item = Mutation>,
) -> Vec<(EntityId, f32)> {
    let mut measured = Vec::new();
    for mutation in mutations {
        match mutation {
            Mutation::BeginCollapse { id, target } => {
                let Some(entity) = store.get_mut(id) else {
                    trace!(?id, "collapse target no longer exists");
                    continue;
                };
                if entity.role.is_transient() {
                    continue;
                }
                entity.role = Role::Collapsing;
                entity.target = Some(target);
                entity.progress = 0.0;
                entity.velocity = Vec3::ZERO;
                entity.collapse = Some(CollapseTrack {
                    start: entity.position,
                    steps: 0,
                });
            }
            Mutation::Restore { id } => {
                if let Some(entity) = store.get_mut(id) {
                    entity.restore();
                }
            }
            Mutation::Measure { id, value } => {
                let Some(entity) = store.get_mut(id) else {
                    continue;
                };
                entity.observable = value;
                entity.role = Role::Measured;
                entity.velocity = Vec3::ZERO;
                measured.push((id, value));
            }
            Mutation::Revert { id } => {
                let partner = store.partner(id);
                for id in std::iter::once(id).chain(partner) {
                    if let Some(entity) = store.get_mut(id) {
                        entity.unmeasure();
                    }
                }
                measured.retain(|(other, _)| *other != id && Some(*other) != partner);
            }
        }
    }
    measured
}

/// Run every rule bound to each entity's current role.
///
/// Returns `(collapsing, settled)` counts. Frozen roles are skipped; an
/// entity whose rules produce a non-finite position keeps its old state.
pub(crate) fn run_rules(
    store: &mut EntityStore,
    rules: &CompiledRules,
    machine: &InteractionMachine,
    ctx: &RuleContext<'_>,
    rng: &mut impl Rng,
) -> (usize, usize) {
    let blend = machine.blend();
    let increment = machine.collapse_increment();
    let mut collapsing = 0;
    let mut settled = 0;

    for (id, entity) in store.iter_mut() {
        match entity.role {
            Role::Settled | Role::Measured => {}
            Role::Collapsing => {
                let (Some(track), Some(target), Some(increment)) =
                    (entity.collapse, entity.target, increment)
                else {
                    continue;
                };
                let step = collapse_to_target(track.start, track.steps, target, increment);
                entity.position = step.position;
                entity.progress = step.progress;
                if step.settled {
                    entity.role = Role::Settled;
                    entity.target = None;
                    entity.collapse = None;
                    settled += 1;
                } else {
                    entity.collapse = Some(CollapseTrack {
                        steps: step.steps,
                        ..track
                    });
                    collapsing += 1;
                }
            }
            role => {
                let bound = rules.for_role(role);
                if bound.is_empty() {
                    continue;
                }
                let origin = entity.origin();
                let mut offset = Vec3::ZERO;
                let mut velocity = None;
                for rule in bound {
                    let noise = if rule.spec.needs_noise() {
                        Vec3::new(
                            rng.gen_range(-1.0..=1.0),
                            rng.gen_range(-1.0..=1.0),
                            rng.gen_range(-1.0..=1.0),
                        )
                    } else {
                        Vec3::ZERO
                    };
                    let weight = rule.weight.at(blend) * machine.gain(&rule.name);
                    let motion = rule.spec.evaluate(entity, ctx, noise);
                    offset += (motion.position - origin) * weight;
                    if let Some(v) = motion.velocity {
                        velocity = Some(v * weight);
                    }
                }
                let position = origin + offset;
                if !position.is_finite() {
                    debug!(?id, %role, "rule produced a non-finite position; entity unchanged");
                    continue;
                }
                entity.position = position;
                if let Some(velocity) = velocity {
                    entity.velocity = velocity;
                }
            }
        }
    }
    (collapsing, settled)
}

/// Give each measured entity's partner the correlated value.
pub(crate) fn correlate(
    store: &mut EntityStore,
    measured: &[(EntityId, f32)],
    correlation: Correlation,
) -> usize {
    let mut correlated = 0;
    for &(id, value) in measured {
        if store.get(id).is_none_or(|entity| entity.role() != Role::Measured) {
            trace!(?id, "measurement was undone before correlation");
            continue;
        }
        let Some(partner) = store.partner(id) else {
            debug!(?id, "measured entity has no live partner; correlation skipped");
            continue;
        };
        if let Some(entity) = store.get_mut(partner) {
            entity.observable = correlation.apply(value);
            entity.role = Role::Measured;
            entity.velocity = Vec3::ZERO;
            correlated += 1;
        }
    }
    correlated
}
