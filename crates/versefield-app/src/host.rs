//! Headless host driving a [`SceneManager`] and presenting frames.

use serde::Serialize;
use tracing::{debug, info, warn};
use versefield_core::{
    CameraDescriptor, ConfigError, Dispatch, PointerInput, SceneHandle, SceneManager, StateLabel,
    VignetteDescriptor,
};
use versefield_render::Renderer;

use crate::script::{ScriptAction, ScriptedInput};

/// Totals for one vignette run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub vignette: String,
    pub ticks: u64,
    pub final_state: Option<StateLabel>,
    pub coherence: f32,
    /// Inputs the machine reacted to.
    pub handled: usize,
    /// Inputs dropped as ignored or duplicate.
    pub ignored: usize,
    pub settled: usize,
    pub measured: usize,
    pub correlated: usize,
    pub fired_timers: usize,
}

pub struct Host<R: Renderer> {
    manager: SceneManager,
    renderer: R,
    camera: CameraDescriptor,
    next_sequence: u64,
}

impl<R: Renderer> Host<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            manager: SceneManager::new(),
            renderer,
            camera: CameraDescriptor::default(),
            next_sequence: 0,
        }
    }

    #[must_use]
    pub fn with_camera(mut self, camera: CameraDescriptor) -> Self {
        self.camera = camera;
        self
    }

    pub fn manager(&self) -> &SceneManager {
        &self.manager
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Activate `descriptor` and step it `ticks` times. Inputs scheduled for
    /// tick `t` are dispatched while the clock reads `t`, before the step.
    /// The vignette stays active afterwards.
    pub fn play(
        &mut self,
        descriptor: VignetteDescriptor,
        ticks: u64,
        script: &[ScriptedInput],
    ) -> Result<RunSummary, ConfigError> {
        let name = descriptor.name.clone();
        let handle = self.manager.activate(descriptor)?;
        let mut summary = RunSummary {
            vignette: name,
            ..RunSummary::default()
        };

        let mut pending: Vec<&ScriptedInput> = script.iter().collect();
        pending.sort_by_key(|input| input.tick);
        let mut pending = pending.into_iter().peekable();

        for _ in 0..ticks {
            let now = self.manager.clock().map_or(0, |clock| clock.now().0);
            while let Some(input) = pending.next_if(|input| input.tick <= now) {
                let outcome = self.apply(handle, input);
                debug!(input = %input, ?outcome, "scripted input");
                match outcome {
                    Dispatch::Handled { .. } => summary.handled += 1,
                    Dispatch::Ignored | Dispatch::Duplicate => summary.ignored += 1,
                    Dispatch::Stale => warn!(input = %input, "scripted input hit a stale handle"),
                }
            }

            let Some(report) = self.manager.tick(handle) else {
                break;
            };
            summary.ticks += 1;
            summary.settled += report.settled;
            summary.measured += report.measured;
            summary.correlated += report.correlated;
            summary.fired_timers += report.fired_timers;

            if let Some(frame) = self.manager.snapshot() {
                self.renderer.present(&frame);
            }
        }

        let leftover = pending.count();
        if leftover > 0 {
            debug!(leftover, "scripted inputs past the last tick were not applied");
        }
        summary.final_state = self.manager.state();
        summary.coherence = self.manager.coherence().unwrap_or(1.0);
        info!(
            vignette = %summary.vignette,
            ticks = summary.ticks,
            handled = summary.handled,
            ignored = summary.ignored,
            settled = summary.settled,
            measured = summary.measured,
            renderer = self.renderer.name(),
            "run complete"
        );
        Ok(summary)
    }

    /// Play one vignette, then flush the renderer.
    pub fn run(
        &mut self,
        descriptor: VignetteDescriptor,
        ticks: u64,
        script: &[ScriptedInput],
    ) -> Result<RunSummary, ConfigError> {
        let summary = self.play(descriptor, ticks, script);
        self.renderer.finish();
        summary
    }

    /// Play each vignette in turn; each activation tears down the previous
    /// one.
    pub fn tour(
        &mut self,
        descriptors: impl IntoIterator<Item = VignetteDescriptor>,
        ticks: u64,
    ) -> Result<Vec<RunSummary>, ConfigError> {
        let mut summaries = Vec::new();
        for descriptor in descriptors {
            match self.play(descriptor, ticks, &[]) {
                Ok(summary) => summaries.push(summary),
                Err(err) => {
                    self.renderer.finish();
                    return Err(err);
                }
            }
        }
        self.renderer.finish();
        Ok(summaries)
    }

    fn apply(&mut self, handle: SceneHandle, input: &ScriptedInput) -> Dispatch {
        match &input.action {
            ScriptAction::Click(ndc) => {
                self.next_sequence += 1;
                let pointer = PointerInput {
                    ndc: *ndc,
                    sequence: self.next_sequence,
                };
                self.manager.pointer(handle, pointer, &self.camera)
            }
            ScriptAction::Control { name, payload } => {
                self.manager.control(handle, name, *payload)
            }
        }
    }
}
