//! Update rule library.
//!
//! Every rule is a pure function of one entity's committed state, the rule
//! time, and the rule parameters. Rules never look at other entities; the
//! only cross-entity effect, pair correlation, runs as a separate pass.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// Snap threshold absorbing float drift in accumulated collapse progress.
const PROGRESS_EPSILON: f32 = 1e-6;

/// Shared per-tick inputs available to every rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Rule time in ticks.
    pub time: f32,
    /// Active user-triggered pulses.
    pub pulses: &'a [Pulse],
    /// Shared coherence scalar in `[0, 1]`.
    pub coherence: f32,
}

impl Default for RuleContext<'_> {
    fn default() -> Self {
        Self {
            time: 0.0,
            pulses: &[],
            coherence: 1.0,
        }
    }
}

/// Motion produced by one rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub position: Vec3,
    pub velocity: Option<Vec3>,
}

impl Motion {
    const fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: None,
        }
    }
}

/// Serializable rule configuration bound to roles by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RuleSpec {
    Orbit(OrbitParams),
    WaveField(WaveFieldParams),
    Diffusion(DiffusionParams),
    Spring(SpringParams),
}

impl RuleSpec {
    /// Checks parameter ranges, returning a reason on failure.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            Self::Orbit(params) => {
                if !(params.radius.is_finite() && params.radius > 0.0) {
                    return Err("orbit radius must be positive");
                }
                if !params.angular_speed.is_finite() {
                    return Err("orbit angular_speed must be finite");
                }
                if !(params.squash.is_finite() && params.squash > 0.0) {
                    return Err("orbit squash must be positive");
                }
                if !params.center.is_finite() {
                    return Err("orbit center must be finite");
                }
                Ok(())
            }
            Self::WaveField(params) => {
                if params.terms.is_empty() && !params.respond_to_pulses {
                    return Err("wave field needs at least one term or pulse response");
                }
                for term in &params.terms {
                    let finite = term.amplitude.is_finite()
                        && term.wavenumber.is_finite()
                        && term.frequency.is_finite()
                        && term.phase.is_finite();
                    if !finite {
                        return Err("wave term parameters must be finite");
                    }
                    if let WaveShape::Traveling { direction } | WaveShape::Standing { direction } =
                        term.shape
                    {
                        if direction.length_squared() <= f32::EPSILON {
                            return Err("wave term direction must be non-zero");
                        }
                    }
                }
                Ok(())
            }
            Self::Diffusion(params) => {
                if !(params.step.is_finite() && params.step >= 0.0) {
                    return Err("diffusion step must be non-negative");
                }
                Ok(())
            }
            Self::Spring(params) => {
                if !(0.0..=1.0).contains(&params.stiffness) {
                    return Err("spring stiffness must be in [0, 1]");
                }
                if !(0.0..=1.0).contains(&params.damping) {
                    return Err("spring damping must be in [0, 1]");
                }
                Ok(())
            }
        }
    }

    /// Whether evaluating this rule consumes a noise sample.
    #[must_use]
    pub const fn needs_noise(&self) -> bool {
        matches!(self, Self::Diffusion(_))
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Orbit(_) => "orbit",
            Self::WaveField(_) => "wave-field",
            Self::Diffusion(_) => "diffusion",
            Self::Spring(_) => "spring",
        }
    }

    /// Evaluate the rule for `entity`. `noise` is only read by diffusion.
    #[must_use]
    pub fn evaluate(&self, entity: &Entity, ctx: &RuleContext<'_>, noise: Vec3) -> Motion {
        match self {
            Self::Orbit(params) => Motion::at(orbit(entity, ctx.time, params)),
            Self::WaveField(params) => Motion::at(wave_field(entity, ctx, params)),
            Self::Diffusion(params) => Motion::at(diffuse(entity, noise, ctx.coherence, params)),
            Self::Spring(params) => {
                let (position, velocity) = spring(entity, params);
                Motion {
                    position,
                    velocity: Some(velocity),
                }
            }
        }
    }
}

/// Circular or elliptical motion in the horizontal plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrbitParams {
    #[serde(default)]
    pub center: Vec3,
    pub radius: f32,
    /// Radians per tick.
    pub angular_speed: f32,
    /// Ratio of the z radius to the x radius; 1 is a circle.
    #[serde(default = "unit")]
    pub squash: f32,
}

/// Position on the orbit at `time`; the entity phase is the starting angle.
#[must_use]
pub fn orbit(entity: &Entity, time: f32, params: &OrbitParams) -> Vec3 {
    let oscillator = entity.oscillator();
    let angle = oscillator.phase + params.angular_speed * oscillator.frequency * time;
    let (sin, cos) = angle.sin_cos();
    params.center + Vec3::new(params.radius * cos, 0.0, params.radius * params.squash * sin)
}

/// Spatial form of one wave term.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum WaveShape {
    /// Plane wave moving along `direction` in the xz plane.
    Traveling { direction: Vec2 },
    /// Fixed nodes along `direction`, oscillating in place.
    Standing { direction: Vec2 },
    /// Concentric rings moving out from `center`.
    Radial { center: Vec2 },
}

/// One natural term of a wave field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WaveTerm {
    pub amplitude: f32,
    /// Radians per world unit.
    pub wavenumber: f32,
    /// Radians per tick.
    pub frequency: f32,
    #[serde(default)]
    pub phase: f32,
    #[serde(flatten)]
    pub shape: WaveShape,
}

impl WaveTerm {
    /// Displacement contributed at planar point `p` and `time`, with an
    /// extra phase `shift` in radians.
    #[must_use]
    pub fn sample(&self, p: Vec2, time: f32, shift: f32) -> f32 {
        let omega_t = self.frequency * time;
        let phase = self.phase + shift;
        match self.shape {
            WaveShape::Traveling { direction } => {
                let along = p.dot(direction.normalize_or_zero());
                self.amplitude * (self.wavenumber * along - omega_t + phase).sin()
            }
            WaveShape::Standing { direction } => {
                let along = p.dot(direction.normalize_or_zero());
                self.amplitude * (self.wavenumber * along + phase).sin() * omega_t.cos()
            }
            WaveShape::Radial { center } => {
                let distance = p.distance(center);
                self.amplitude * (self.wavenumber * distance - omega_t + phase).sin()
            }
        }
    }
}

/// Vertical displacement field sampled at each entity's planar coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaveFieldParams {
    #[serde(default)]
    pub terms: Vec<WaveTerm>,
    /// Whether active pulses add to this field.
    #[serde(default = "yes")]
    pub respond_to_pulses: bool,
}

/// Pulse shape shared by every pulse a ripple machine emits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PulseParams {
    pub amplitude: f32,
    /// Front speed in world units per tick.
    pub speed: f32,
    pub wavenumber: f32,
    /// Exponential damping length behind the front.
    pub width: f32,
    /// Front radius at which the pulse vanishes.
    pub falloff: f32,
}

impl PulseParams {
    /// Ticks until the front passes `falloff`.
    #[must_use]
    pub fn lifetime(&self) -> f32 {
        self.falloff / self.speed
    }
}

/// A user-triggered pulse anchored where the pick landed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pulse {
    pub origin: Vec2,
    /// Rule time at which the pick happened.
    pub start: f32,
    pub params: PulseParams,
}

impl Pulse {
    #[must_use]
    pub fn is_expired(&self, time: f32) -> bool {
        time - self.start > self.params.lifetime()
    }

    /// Contribution at planar point `p`; zero ahead of the front and after expiry.
    #[must_use]
    pub fn sample(&self, p: Vec2, time: f32) -> f32 {
        let age = time - self.start;
        if age < 0.0 {
            return 0.0;
        }
        let front = self.params.speed * age;
        if front > self.params.falloff {
            return 0.0;
        }
        let lag = front - p.distance(self.origin);
        if lag < 0.0 {
            return 0.0;
        }
        let fade = 1.0 - front / self.params.falloff;
        let envelope = fade * (-lag / self.params.width.max(f32::EPSILON)).exp();
        self.params.amplitude * envelope * (self.params.wavenumber * lag).sin()
    }
}

/// Sum of natural terms (shifted by `shift` radians) and active pulses at
/// planar point `p`.
#[must_use]
pub fn wave_displacement(
    p: Vec2,
    ctx: &RuleContext<'_>,
    params: &WaveFieldParams,
    shift: f32,
) -> f32 {
    let natural: f32 = params
        .terms
        .iter()
        .map(|term| term.sample(p, ctx.time, shift))
        .sum();
    if !params.respond_to_pulses {
        return natural;
    }
    natural
        + ctx
            .pulses
            .iter()
            .map(|pulse| pulse.sample(p, ctx.time))
            .sum::<f32>()
}

/// Entity origin lifted by the wave field. The entity oscillator's phase
/// shifts the natural terms and its amplitude scales the total.
#[must_use]
pub fn wave_field(entity: &Entity, ctx: &RuleContext<'_>, params: &WaveFieldParams) -> Vec3 {
    let origin = entity.origin();
    let oscillator = entity.oscillator();
    let planar = Vec2::new(origin.x, origin.z);
    let height = wave_displacement(planar, ctx, params, oscillator.phase);
    origin + Vec3::Y * height * oscillator.amplitude
}

/// Random-walk parameters for decoherence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DiffusionParams {
    /// Largest per-axis perturbation at zero coherence.
    pub step: f32,
}

/// Perturbs the current position by `noise` and pulls it toward the origin
/// in proportion to `coherence`.
#[must_use]
pub fn diffuse(entity: &Entity, noise: Vec3, coherence: f32, params: &DiffusionParams) -> Vec3 {
    let coherence = coherence.clamp(0.0, 1.0);
    let origin = entity.origin();
    let wandered = entity.position() + noise * params.step;
    origin + (wandered - origin) * (1.0 - coherence)
}

/// Damped spring pulling toward the target (or origin).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpringParams {
    pub stiffness: f32,
    pub damping: f32,
}

/// Returns the next position and velocity.
#[must_use]
pub fn spring(entity: &Entity, params: &SpringParams) -> (Vec3, Vec3) {
    let anchor = entity.target().unwrap_or(entity.origin());
    let mut velocity = entity.velocity() + (anchor - entity.position()) * params.stiffness;
    velocity *= 1.0 - params.damping;
    (entity.position() + velocity, velocity)
}

/// Result of one collapse step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollapseStep {
    pub position: Vec3,
    pub progress: f32,
    pub steps: u32,
    pub settled: bool,
}

/// Advances a collapse by one `increment`.
///
/// Progress is derived from the step count so settlement never takes more
/// than `ceil(1 / increment)` ticks, and the settled position is exactly
/// `target`.
#[must_use]
pub fn collapse_to_target(start: Vec3, steps: u32, target: Vec3, increment: f32) -> CollapseStep {
    let steps = steps.saturating_add(1);
    let progress = (steps as f32 * increment).min(1.0);
    if progress >= 1.0 - PROGRESS_EPSILON {
        return CollapseStep {
            position: target,
            progress: 1.0,
            steps,
            settled: true,
        };
    }
    CollapseStep {
        position: start.lerp(target, progress),
        progress,
        steps,
        settled: false,
    }
}

/// Deterministic mapping from a measured value to its partner's value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Correlation {
    /// Partner takes the opposite sign.
    #[default]
    Inverse,
    /// Partner takes the same value.
    Identical,
    /// Partner takes `1 - value`.
    Complement,
}

impl Correlation {
    #[must_use]
    pub fn apply(self, value: f32) -> f32 {
        match self {
            Self::Inverse => -value,
            Self::Identical => value,
            Self::Complement => 1.0 - value,
        }
    }
}

const fn unit() -> f32 {
    1.0
}

const fn yes() -> bool {
    true
}
