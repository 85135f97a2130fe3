//! Vignette descriptors and their validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EntitySeed, Role};
use crate::machine::{ControlEvent, Side};
use crate::rules::{Correlation, PulseParams, RuleSpec};

/// Errors that prevent a vignette from activating.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse vignette descriptor: {0}")]
    Parse(#[from] serde_json::Error),
    /// A binding or control names a rule that is not defined.
    #[error("`{context}` references undefined rule `{rule}`")]
    UnknownRule { context: String, rule: String },
    /// A descriptor assigns a role only the interaction machine may assign.
    #[error("role `{0}` cannot be assigned by a descriptor")]
    InvalidRole(Role),
    #[error("pair {pair:?} is invalid: {reason}")]
    InvalidPair {
        pair: [usize; 2],
        reason: &'static str,
    },
    #[error("rule `{rule}`: {reason}")]
    InvalidRule { rule: String, reason: &'static str },
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("control `{action}` does not apply to {shape} interactions")]
    ControlMismatch { action: String, shape: &'static str },
}

/// How a binding's contribution follows the toggle blend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BindingWeight {
    #[default]
    Full,
    /// Full weight while side A shows, fading out toward side B.
    SideA,
    /// Full weight while side B shows, fading out toward side A.
    SideB,
}

impl BindingWeight {
    /// Weight at `blend` (0 = side A, 1 = side B).
    #[must_use]
    pub fn at(self, blend: f32) -> f32 {
        match self {
            Self::Full => 1.0,
            Self::SideA => 1.0 - blend,
            Self::SideB => blend,
        }
    }
}

/// Applies a named rule to every entity currently in `role`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleBinding {
    pub role: Role,
    pub rule: String,
    #[serde(default)]
    pub weight: BindingWeight,
}

/// Binary toggle parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToggleSpec {
    /// Ticks a full blend from one side to the other takes.
    pub blend_ticks: u32,
    #[serde(default = "default_side_labels")]
    pub labels: [String; 2],
}

/// One-shot collapse parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollapseSpec {
    /// Progress added per tick.
    pub increment: f32,
    /// Roles that collapse, and that count as valid pick targets.
    pub roles: Vec<Role>,
    /// Scale applied to each entity's offset from the cloud centroid.
    #[serde(default)]
    pub spread: f32,
    /// Whether a click on empty ground starts a collapse.
    #[serde(default)]
    pub empty_space: bool,
}

/// Accumulating disturbance parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisturbanceSpec {
    /// Coherence removed per disturbance event.
    pub drop: f32,
    /// Coherence restored per tick.
    pub recovery: f32,
    /// Whether any pick also counts as a disturbance.
    #[serde(default)]
    pub pick_disturbs: bool,
}

/// Measurement-with-cooldown parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasurementSpec {
    /// Roles that can be measured by a pick.
    pub roles: Vec<Role>,
    /// Ticks until a measurement reverts; `None` makes it permanent.
    #[serde(default)]
    pub cooldown_ticks: Option<u32>,
    #[serde(default)]
    pub correlation: Correlation,
}

/// Pick-triggered pulse parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RippleSpec {
    pub pulse: PulseParams,
    #[serde(default = "default_max_pulses")]
    pub max_pulses: usize,
}

/// Shape of the vignette's interaction state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum InteractionSpec {
    #[default]
    Passive,
    Toggle(ToggleSpec),
    Collapse(CollapseSpec),
    Disturbance(DisturbanceSpec),
    Measurement(MeasurementSpec),
    Ripple(RippleSpec),
}

impl InteractionSpec {
    #[must_use]
    pub const fn shape_name(&self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::Toggle(_) => "toggle",
            Self::Collapse(_) => "collapse",
            Self::Disturbance(_) => "disturbance",
            Self::Measurement(_) => "measurement",
            Self::Ripple(_) => "ripple",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Passive => {}
            Self::Toggle(spec) => {
                if spec.blend_ticks == 0 {
                    return Err(ConfigError::InvalidConfig("toggle blend_ticks must be non-zero"));
                }
            }
            Self::Collapse(spec) => {
                if !(spec.increment > 0.0 && spec.increment <= 1.0) {
                    return Err(ConfigError::InvalidConfig(
                        "collapse increment must be in (0, 1]",
                    ));
                }
                if !spec.spread.is_finite() {
                    return Err(ConfigError::InvalidConfig("collapse spread must be finite"));
                }
                validate_roles(&spec.roles, "collapse roles must not be empty")?;
            }
            Self::Disturbance(spec) => {
                if !(0.0..=1.0).contains(&spec.drop) || !(0.0..=1.0).contains(&spec.recovery) {
                    return Err(ConfigError::InvalidConfig(
                        "disturbance drop and recovery must be in [0, 1]",
                    ));
                }
            }
            Self::Measurement(spec) => {
                validate_roles(&spec.roles, "measurement roles must not be empty")?;
                if spec.cooldown_ticks == Some(0) {
                    return Err(ConfigError::InvalidConfig(
                        "measurement cooldown_ticks must be non-zero when set",
                    ));
                }
            }
            Self::Ripple(spec) => {
                let pulse = &spec.pulse;
                if !(pulse.speed > 0.0 && pulse.falloff > 0.0 && pulse.width > 0.0) {
                    return Err(ConfigError::InvalidConfig(
                        "ripple speed, falloff, and width must be positive",
                    ));
                }
                if !(pulse.amplitude.is_finite() && pulse.wavenumber.is_finite()) {
                    return Err(ConfigError::InvalidConfig(
                        "ripple amplitude and wavenumber must be finite",
                    ));
                }
                if spec.max_pulses == 0 {
                    return Err(ConfigError::InvalidConfig("ripple max_pulses must be non-zero"));
                }
            }
        }
        Ok(())
    }
}

/// Host control action mapped onto one interaction event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ControlBinding {
    /// Flip the toggle target.
    Toggle,
    /// Pick a toggle side from a boolean payload (`true` selects side B).
    Select,
    /// Return the machine and its affected entities to their initial state.
    Reset,
    /// Lower coherence by the payload amount, or the configured drop.
    Disturb,
    /// Scale a named rule's contribution by the scalar payload.
    Gain { rule: String },
}

/// Payload carried by a host control action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum Payload {
    #[default]
    None,
    Flag(bool),
    Scalar(f32),
}

impl ControlBinding {
    /// Translate a host action into a machine event. Missing or mistyped
    /// payloads yield `None`.
    #[must_use]
    pub fn to_event(&self, payload: Payload) -> Option<ControlEvent> {
        match (self, payload) {
            (Self::Toggle, _) => Some(ControlEvent::Toggle),
            (Self::Select, Payload::Flag(flag)) => Some(ControlEvent::Select(if flag {
                Side::B
            } else {
                Side::A
            })),
            (Self::Select, _) => None,
            (Self::Reset, _) => Some(ControlEvent::Reset),
            (Self::Disturb, Payload::Scalar(amount)) => Some(ControlEvent::Disturb {
                amount: Some(amount),
            }),
            (Self::Disturb, _) => Some(ControlEvent::Disturb { amount: None }),
            (Self::Gain { rule }, Payload::Scalar(value)) => Some(ControlEvent::SetGain {
                rule: rule.clone(),
                value,
            }),
            (Self::Gain { .. }, _) => None,
        }
    }

    fn applies_to(&self, interaction: &InteractionSpec) -> bool {
        match self {
            Self::Toggle | Self::Select => matches!(interaction, InteractionSpec::Toggle(_)),
            Self::Disturb => matches!(interaction, InteractionSpec::Disturbance(_)),
            Self::Reset | Self::Gain { .. } => true,
        }
    }
}

/// Picking parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PickingSpec {
    /// Sphere radius each entity presents to the pick ray.
    pub tolerance: f32,
    /// Height of the ground plane that catches misses.
    pub ground_height: f32,
}

impl Default for PickingSpec {
    fn default() -> Self {
        Self {
            tolerance: 0.5,
            ground_height: 0.0,
        }
    }
}

/// Static configuration for one vignette.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VignetteDescriptor {
    pub name: String,
    /// Optional RNG seed for reproducible vignettes.
    #[serde(default)]
    pub seed: Option<u64>,
    pub entities: Vec<EntitySeed>,
    /// Index pairs into `entities`.
    #[serde(default)]
    pub pairs: Vec<[usize; 2]>,
    #[serde(default)]
    pub rules: BTreeMap<String, RuleSpec>,
    #[serde(default)]
    pub bindings: Vec<RuleBinding>,
    #[serde(default)]
    pub interaction: InteractionSpec,
    #[serde(default)]
    pub controls: BTreeMap<String, ControlBinding>,
    #[serde(default)]
    pub picking: PickingSpec,
}

/// Rule bound to a role, resolved from its name.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundRule {
    pub name: String,
    pub spec: RuleSpec,
    pub weight: BindingWeight,
}

/// Role-indexed rule table produced by validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledRules {
    by_role: BTreeMap<Role, Vec<BoundRule>>,
}

impl CompiledRules {
    /// Rules bound to `role`, in binding order.
    #[must_use]
    pub fn for_role(&self, role: Role) -> &[BoundRule] {
        self.by_role.get(&role).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_role.is_empty()
    }
}

impl VignetteDescriptor {
    /// Parse a descriptor from JSON without validating it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the descriptor, returning the resolved rule table.
    pub fn validate(&self) -> Result<CompiledRules, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("vignette name must not be empty"));
        }
        for seed in &self.entities {
            if seed.role.is_transient() {
                return Err(ConfigError::InvalidRole(seed.role));
            }
            if !seed.position.is_finite() || !seed.velocity.is_finite() {
                return Err(ConfigError::InvalidConfig(
                    "entity position and velocity must be finite",
                ));
            }
            if !seed.observable.is_finite() {
                return Err(ConfigError::InvalidConfig("entity observable must be finite"));
            }
        }
        self.validate_pairs()?;

        for (name, spec) in &self.rules {
            spec.validate().map_err(|reason| ConfigError::InvalidRule {
                rule: name.clone(),
                reason,
            })?;
        }

        let mut compiled = CompiledRules::default();
        for binding in &self.bindings {
            if binding.role.is_transient() {
                return Err(ConfigError::InvalidRole(binding.role));
            }
            let spec = self
                .rules
                .get(&binding.rule)
                .ok_or_else(|| ConfigError::UnknownRule {
                    context: format!("binding for role {}", binding.role),
                    rule: binding.rule.clone(),
                })?;
            if binding.weight != BindingWeight::Full
                && !matches!(self.interaction, InteractionSpec::Toggle(_))
            {
                return Err(ConfigError::InvalidConfig(
                    "side-weighted bindings require a toggle interaction",
                ));
            }
            compiled
                .by_role
                .entry(binding.role)
                .or_default()
                .push(BoundRule {
                    name: binding.rule.clone(),
                    spec: spec.clone(),
                    weight: binding.weight,
                });
        }

        self.interaction.validate()?;

        for (action, control) in &self.controls {
            if !control.applies_to(&self.interaction) {
                return Err(ConfigError::ControlMismatch {
                    action: action.clone(),
                    shape: self.interaction.shape_name(),
                });
            }
            if let ControlBinding::Gain { rule } = control {
                if !self.rules.contains_key(rule) {
                    return Err(ConfigError::UnknownRule {
                        context: format!("control {action}"),
                        rule: rule.clone(),
                    });
                }
            }
        }

        if !(self.picking.tolerance.is_finite() && self.picking.tolerance > 0.0) {
            return Err(ConfigError::InvalidConfig("picking tolerance must be positive"));
        }
        if !self.picking.ground_height.is_finite() {
            return Err(ConfigError::InvalidConfig("ground height must be finite"));
        }

        Ok(compiled)
    }

    fn validate_pairs(&self) -> Result<(), ConfigError> {
        let mut paired = vec![false; self.entities.len()];
        for &pair in &self.pairs {
            let [a, b] = pair;
            if a == b {
                return Err(ConfigError::InvalidPair {
                    pair,
                    reason: "an entity cannot pair with itself",
                });
            }
            if a >= self.entities.len() || b >= self.entities.len() {
                return Err(ConfigError::InvalidPair {
                    pair,
                    reason: "index out of range",
                });
            }
            if paired[a] || paired[b] {
                return Err(ConfigError::InvalidPair {
                    pair,
                    reason: "entity already paired",
                });
            }
            paired[a] = true;
            paired[b] = true;
        }
        Ok(())
    }

    /// RNG seed for this vignette, if pinned.
    #[must_use]
    pub const fn seed(&self) -> Option<u64> {
        self.seed
    }
}

fn validate_roles(roles: &[Role], empty: &'static str) -> Result<(), ConfigError> {
    if roles.is_empty() {
        return Err(ConfigError::InvalidConfig(empty));
    }
    if let Some(role) = roles.iter().find(|role| role.is_transient()) {
        return Err(ConfigError::InvalidRole(*role));
    }
    Ok(())
}

fn default_side_labels() -> [String; 2] {
    ["side-a".to_owned(), "side-b".to_owned()]
}

const fn default_max_pulses() -> usize {
    4
}
