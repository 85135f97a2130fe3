use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::collections::BTreeMap;
use std::time::Duration;
use versefield_core::{
    DiffusionParams, DisturbanceSpec, EntitySeed, InteractionSpec, OrbitParams, Oscillator,
    PickingSpec, Role, RuleBinding, RuleSpec, SceneManager, Vec2, Vec3, VignetteDescriptor,
    WaveFieldParams, WaveShape, WaveTerm,
};

fn descriptor(entities: usize) -> VignetteDescriptor {
    let side = (entities as f32).sqrt().ceil() as usize;
    let seeds = (0..entities)
        .map(|i| {
            let (x, z) = ((i % side) as f32, (i / side) as f32);
            let role = if i % 2 == 0 { Role::Free } else { Role::Tracked };
            EntitySeed::new(Vec3::new(x, 0.0, z), role).with_oscillator(Oscillator {
                phase: i as f32 * 0.01,
                ..Oscillator::default()
            })
        })
        .collect();
    let rules = BTreeMap::from([
        (
            "orbit".to_owned(),
            RuleSpec::Orbit(OrbitParams {
                center: Vec3::ZERO,
                radius: 8.0,
                angular_speed: 0.02,
                squash: 0.7,
            }),
        ),
        (
            "field".to_owned(),
            RuleSpec::WaveField(WaveFieldParams {
                terms: vec![WaveTerm {
                    amplitude: 0.5,
                    wavenumber: 0.8,
                    frequency: 0.1,
                    phase: 0.0,
                    shape: WaveShape::Radial { center: Vec2::ZERO },
                }],
                respond_to_pulses: true,
            }),
        ),
        (
            "jitter".to_owned(),
            RuleSpec::Diffusion(DiffusionParams { step: 0.1 }),
        ),
    ]);
    let bindings = vec![
        RuleBinding {
            role: Role::Free,
            rule: "orbit".to_owned(),
            weight: Default::default(),
        },
        RuleBinding {
            role: Role::Tracked,
            rule: "field".to_owned(),
            weight: Default::default(),
        },
        RuleBinding {
            role: Role::Tracked,
            rule: "jitter".to_owned(),
            weight: Default::default(),
        },
    ];
    VignetteDescriptor {
        name: "bench".to_owned(),
        seed: Some(0xBEEF),
        entities: seeds,
        pairs: Vec::new(),
        rules,
        bindings,
        interaction: InteractionSpec::Disturbance(DisturbanceSpec {
            drop: 0.2,
            recovery: 0.001,
            pick_disturbs: false,
        }),
        controls: BTreeMap::new(),
        picking: PickingSpec::default(),
    }
}

fn bench_scene_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_step");
    let samples: usize = std::env::var("VF_BENCH_SAMPLES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(30);
    group.sample_size(samples);
    group.measurement_time(Duration::from_secs(5));
    let steps: usize = std::env::var("VF_BENCH_STEPS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(64);
    for entities in [500_usize, 2_000, 10_000] {
        group.bench_function(format!("steps{steps}_entities{entities}"), |b| {
            b.iter_batched(
                || {
                    let mut manager = SceneManager::new();
                    let handle = manager
                        .activate(descriptor(entities))
                        .expect("bench vignette is valid");
                    (manager, handle)
                },
                |(mut manager, handle)| {
                    for _ in 0..steps {
                        manager.tick(handle);
                    }
                    manager
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scene_steps);
criterion_main!(benches);
