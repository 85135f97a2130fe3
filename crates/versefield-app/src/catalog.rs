//! Built-in vignettes.

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use rand::{Rng, SeedableRng, rngs::SmallRng};
use versefield_core::{
    BindingWeight, CollapseSpec, ControlBinding, Correlation, DiffusionParams, DisturbanceSpec,
    EntitySeed, InteractionSpec, MeasurementSpec, OrbitParams, Oscillator, PickingSpec,
    PulseParams, RippleSpec, Role, RuleBinding, RuleSpec, ToggleSpec, Vec2, Vec3,
    VignetteDescriptor, WaveFieldParams, WaveShape, WaveTerm,
};

/// Catalog listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub summary: &'static str,
    build: fn() -> VignetteDescriptor,
}

impl CatalogEntry {
    pub fn descriptor(&self) -> VignetteDescriptor {
        (self.build)()
    }
}

const ENTRIES: &[CatalogEntry] = &[
    CatalogEntry {
        name: "orbiting-cloud",
        summary: "Particles circling a nucleus; `speed` scales the orbit",
        build: orbiting_cloud,
    },
    CatalogEntry {
        name: "ripple-pond",
        summary: "A lattice on a standing wave; clicks drop ripples",
        build: ripple_pond,
    },
    CatalogEntry {
        name: "observer-collapse",
        summary: "A shimmering cloud that collapses where it is observed",
        build: observer_collapse,
    },
    CatalogEntry {
        name: "decoherence",
        summary: "A coherent ring that scatters when disturbed and slowly recovers",
        build: decoherence,
    },
    CatalogEntry {
        name: "entangled-pair",
        summary: "Paired spins; measuring one fixes its partner",
        build: entangled_pair,
    },
    CatalogEntry {
        name: "wave-particle",
        summary: "One row of entities blending between a wave and a particle view",
        build: wave_particle,
    },
];

pub fn entries() -> &'static [CatalogEntry] {
    ENTRIES
}

/// Descriptor for a built-in vignette.
pub fn builtin(name: &str) -> Option<VignetteDescriptor> {
    ENTRIES
        .iter()
        .find(|entry| entry.name == name)
        .map(CatalogEntry::descriptor)
}

fn empty(name: &str, seed: u64) -> VignetteDescriptor {
    VignetteDescriptor {
        name: name.to_owned(),
        seed: Some(seed),
        entities: Vec::new(),
        pairs: Vec::new(),
        rules: BTreeMap::new(),
        bindings: Vec::new(),
        interaction: InteractionSpec::Passive,
        controls: BTreeMap::new(),
        picking: PickingSpec::default(),
    }
}

fn bind(descriptor: &mut VignetteDescriptor, role: Role, rule: &str, weight: BindingWeight) {
    descriptor.bindings.push(RuleBinding {
        role,
        rule: rule.to_owned(),
        weight,
    });
}

fn orbiting_cloud() -> VignetteDescriptor {
    let mut descriptor = empty("orbiting-cloud", 0x0B17);
    let count = 24;
    descriptor.entities = (0..count)
        .map(|i| {
            let phase = i as f32 / count as f32 * TAU;
            EntitySeed::new(Vec3::new(5.0, 0.0, 0.0), Role::Free).with_oscillator(Oscillator {
                phase,
                frequency: 1.0 + (i % 3) as f32 * 0.25,
                amplitude: 1.0,
            })
        })
        .collect();
    descriptor
        .entities
        .push(EntitySeed::new(Vec3::ZERO, Role::Marker));
    descriptor.rules.insert(
        "orbit".to_owned(),
        RuleSpec::Orbit(OrbitParams {
            center: Vec3::ZERO,
            radius: 5.0,
            angular_speed: 0.05,
            squash: 0.8,
        }),
    );
    bind(&mut descriptor, Role::Free, "orbit", BindingWeight::Full);
    descriptor.controls.insert(
        "speed".to_owned(),
        ControlBinding::Gain {
            rule: "orbit".to_owned(),
        },
    );
    descriptor
}

fn ripple_pond() -> VignetteDescriptor {
    let mut descriptor = empty("ripple-pond", 0x90D);
    let half = 6;
    for x in -half..=half {
        for z in -half..=half {
            descriptor
                .entities
                .push(EntitySeed::new(Vec3::new(x as f32, 0.0, z as f32), Role::Tracked));
        }
    }
    descriptor.rules.insert(
        "surface".to_owned(),
        RuleSpec::WaveField(WaveFieldParams {
            terms: vec![WaveTerm {
                amplitude: 0.15,
                wavenumber: 0.6,
                frequency: 0.05,
                phase: 0.0,
                shape: WaveShape::Standing {
                    direction: Vec2::new(1.0, 1.0),
                },
            }],
            respond_to_pulses: true,
        }),
    );
    bind(&mut descriptor, Role::Tracked, "surface", BindingWeight::Full);
    descriptor.interaction = InteractionSpec::Ripple(RippleSpec {
        pulse: PulseParams {
            amplitude: 1.2,
            speed: 0.15,
            wavenumber: 1.8,
            width: 2.5,
            falloff: 9.0,
        },
        max_pulses: 4,
    });
    descriptor
        .controls
        .insert("calm".to_owned(), ControlBinding::Reset);
    descriptor.controls.insert(
        "swell".to_owned(),
        ControlBinding::Gain {
            rule: "surface".to_owned(),
        },
    );
    descriptor
}

fn observer_collapse() -> VignetteDescriptor {
    let mut descriptor = empty("observer-collapse", 0xC0_11A5E);
    let mut rng = SmallRng::seed_from_u64(0xC0_11A5E);
    descriptor.entities = (0..40)
        .map(|_| {
            let angle = rng.gen_range(0.0..TAU);
            let radius = 4.0 * rng.gen_range(0.0_f32..1.0).sqrt();
            EntitySeed::new(
                Vec3::new(radius * angle.cos(), rng.gen_range(-0.5..0.5), radius * angle.sin()),
                Role::Free,
            )
            .with_oscillator(Oscillator {
                phase: rng.gen_range(0.0..TAU),
                frequency: 1.0,
                amplitude: 1.0,
            })
        })
        .collect();
    descriptor.rules.insert(
        "shimmer".to_owned(),
        RuleSpec::WaveField(WaveFieldParams {
            terms: vec![WaveTerm {
                amplitude: 0.3,
                wavenumber: 0.9,
                frequency: 0.08,
                phase: 0.0,
                shape: WaveShape::Traveling {
                    direction: Vec2::new(1.0, 0.3),
                },
            }],
            respond_to_pulses: false,
        }),
    );
    bind(&mut descriptor, Role::Free, "shimmer", BindingWeight::Full);
    descriptor.interaction = InteractionSpec::Collapse(CollapseSpec {
        increment: 0.04,
        roles: vec![Role::Free],
        spread: 0.15,
        empty_space: true,
    });
    descriptor
        .controls
        .insert("reset".to_owned(), ControlBinding::Reset);
    descriptor
}

fn decoherence() -> VignetteDescriptor {
    let mut descriptor = empty("decoherence", 0xDEC0);
    let count = 30;
    descriptor.entities = (0..count)
        .map(|i| {
            let angle = i as f32 / count as f32 * TAU;
            EntitySeed::new(
                Vec3::new(4.0 * angle.cos(), 0.0, 4.0 * angle.sin()),
                Role::Tracked,
            )
        })
        .collect();
    descriptor.rules.insert(
        "scatter".to_owned(),
        RuleSpec::Diffusion(DiffusionParams { step: 0.3 }),
    );
    bind(&mut descriptor, Role::Tracked, "scatter", BindingWeight::Full);
    descriptor.interaction = InteractionSpec::Disturbance(DisturbanceSpec {
        drop: 0.2,
        recovery: 0.001,
        pick_disturbs: true,
    });
    descriptor
        .controls
        .insert("disturb".to_owned(), ControlBinding::Disturb);
    descriptor
        .controls
        .insert("reset".to_owned(), ControlBinding::Reset);
    descriptor
}

fn entangled_pair() -> VignetteDescriptor {
    let mut descriptor = empty("entangled-pair", 0xE47A);
    for (i, x) in [-3.0_f32, 0.0, 3.0].into_iter().enumerate() {
        descriptor.entities.push(
            EntitySeed::new(Vec3::new(x, 0.0, -2.0), Role::PairedA).with_observable(1.0),
        );
        descriptor.entities.push(
            EntitySeed::new(Vec3::new(x, 0.0, 2.0), Role::PairedB).with_observable(-1.0),
        );
        descriptor.pairs.push([2 * i, 2 * i + 1]);
    }
    descriptor.interaction = InteractionSpec::Measurement(MeasurementSpec {
        roles: vec![Role::PairedA, Role::PairedB],
        cooldown_ticks: Some(90),
        correlation: Correlation::Inverse,
    });
    descriptor.picking.tolerance = 0.8;
    descriptor
        .controls
        .insert("reset".to_owned(), ControlBinding::Reset);
    descriptor
}

fn wave_particle() -> VignetteDescriptor {
    let mut descriptor = empty("wave-particle", 0x3A7E);
    descriptor.entities = (-8..=8)
        .map(|x| EntitySeed::new(Vec3::new(x as f32 * 0.5, 0.0, 0.0), Role::Free))
        .collect();
    descriptor.rules.insert(
        "wave".to_owned(),
        RuleSpec::WaveField(WaveFieldParams {
            terms: vec![WaveTerm {
                amplitude: 1.0,
                wavenumber: 0.8,
                frequency: 0.1,
                phase: 0.0,
                shape: WaveShape::Traveling { direction: Vec2::X },
            }],
            respond_to_pulses: false,
        }),
    );
    descriptor.rules.insert(
        "particle".to_owned(),
        RuleSpec::WaveField(WaveFieldParams {
            terms: vec![WaveTerm {
                amplitude: 0.6,
                wavenumber: 3.0,
                frequency: 0.2,
                phase: 0.0,
                shape: WaveShape::Radial { center: Vec2::ZERO },
            }],
            respond_to_pulses: false,
        }),
    );
    bind(&mut descriptor, Role::Free, "wave", BindingWeight::SideA);
    bind(&mut descriptor, Role::Free, "particle", BindingWeight::SideB);
    descriptor.interaction = InteractionSpec::Toggle(ToggleSpec {
        blend_ticks: 30,
        labels: ["wave".to_owned(), "particle".to_owned()],
    });
    descriptor
        .controls
        .insert("switch".to_owned(), ControlBinding::Toggle);
    descriptor
        .controls
        .insert("particle-view".to_owned(), ControlBinding::Select);
    descriptor
        .controls
        .insert("reset".to_owned(), ControlBinding::Reset);
    descriptor
}
