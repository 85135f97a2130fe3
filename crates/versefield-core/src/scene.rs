use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::debug;

use crate::config::{CompiledRules, VignetteDescriptor};
use crate::entity::EntityStore;
use crate::machine::{Event, InteractionMachine, Mutation, TimerOp, Transition};
use crate::rules::RuleContext;
use crate::schedule::Scheduler;
use crate::snapshot::{EntitySnapshot, FrameSnapshot};
use crate::step::{self, TickReport};
use crate::{SceneGeneration, SimClock};

/// Runtime state of the active vignette. The entity store and scheduler are
/// owned by the manager and lent in per call.
#[derive(Debug)]
pub(crate) struct Scene {
    generation: SceneGeneration,
    descriptor: VignetteDescriptor,
    rules: CompiledRules,
    clock: SimClock,
    machine: InteractionMachine,
    pending: Vec<Mutation>,
    rng: SmallRng,
    last_pointer: Option<u64>,
    last_report: TickReport,
}

impl Scene {
    pub(crate) fn new(
        generation: SceneGeneration,
        descriptor: VignetteDescriptor,
        rules: CompiledRules,
    ) -> Self {
        let rng = match descriptor.seed() {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        };
        let machine = InteractionMachine::new(&descriptor.interaction);
        Self {
            generation,
            descriptor,
            rules,
            clock: SimClock::new(),
            machine,
            pending: Vec::new(),
            rng,
            last_pointer: None,
            last_report: TickReport::default(),
        }
    }

    pub(crate) fn generation(&self) -> SceneGeneration {
        self.generation
    }

    pub(crate) fn descriptor(&self) -> &VignetteDescriptor {
        &self.descriptor
    }

    pub(crate) fn machine(&self) -> &InteractionMachine {
        &self.machine
    }

    pub(crate) fn clock(&self) -> SimClock {
        self.clock
    }

    pub(crate) fn last_report(&self) -> TickReport {
        self.last_report
    }

    pub(crate) fn pending_mutations(&self) -> usize {
        self.pending.len()
    }

    /// Records a pointer sequence number; returns `false` for repeats.
    pub(crate) fn accept_pointer(&mut self, sequence: u64) -> bool {
        if self.last_pointer.is_some_and(|last| sequence <= last) {
            return false;
        }
        self.last_pointer = Some(sequence);
        true
    }

    /// Hand an event to the machine and queue its effects.
    pub(crate) fn dispatch(
        &mut self,
        event: &Event,
        store: &EntityStore,
        scheduler: &mut Scheduler,
    ) -> Transition {
        let transition = self
            .machine
            .handle(event, store, &mut self.rng, self.clock.time());
        self.absorb(&transition, scheduler);
        transition
    }

    fn absorb(&mut self, transition: &Transition, scheduler: &mut Scheduler) {
        self.pending.extend(transition.mutations.iter().copied());
        for op in &transition.timers {
            match *op {
                TimerOp::Start { key, after_ticks } => {
                    scheduler.schedule(self.clock.now().after(after_ticks), self.generation, key);
                }
                TimerOp::Cancel(key) => {
                    scheduler.cancel(self.generation, key);
                }
            }
        }
    }

    /// Advance one tick.
    pub(crate) fn step(&mut self, store: &mut EntityStore, scheduler: &mut Scheduler) -> TickReport {
        let tick = self.clock.advance();
        let time = self.clock.time();

        let fired = scheduler.drain_due(tick, self.generation);
        for key in &fired {
            let transition =
                self.machine
                    .handle(&Event::Timer(*key), store, &mut self.rng, time);
            self.absorb(&transition, scheduler);
        }

        let measured = step::apply_mutations(store, self.pending.drain(..));
        let ctx = RuleContext {
            time,
            pulses: self.machine.pulses(),
            coherence: self.machine.coherence(),
        };
        let (collapsing, settled) =
            step::run_rules(store, &self.rules, &self.machine, &ctx, &mut self.rng);
        let correlated = step::correlate(store, &measured, self.machine.correlation());

        let report = TickReport {
            tick,
            collapsing,
            settled,
            measured: measured.len(),
            correlated,
            fired_timers: fired.len(),
        };
        self.machine.advance(&report, time);
        if report.settled > 0 || report.measured > 0 || report.fired_timers > 0 {
            debug!(
                vignette = %self.descriptor.name,
                tick = tick.0,
                settled = report.settled,
                measured = report.measured,
                correlated = report.correlated,
                timers = report.fired_timers,
                "tick effects"
            );
        }
        self.last_report = report;
        report
    }

    pub(crate) fn snapshot(&self, store: &EntityStore) -> FrameSnapshot {
        FrameSnapshot {
            generation: self.generation.0,
            vignette: self.descriptor.name.clone(),
            tick: self.clock.now().0,
            state: self.machine.state(),
            blend: self.machine.blend(),
            coherence: self.machine.coherence(),
            pulses: self.machine.pulses().len(),
            entities: store
                .iter()
                .map(|(id, entity)| EntitySnapshot::new(id, entity))
                .collect(),
        }
    }
}
