use tracing::{debug, info};
use versefield_core::{FrameSnapshot, Role};

use crate::Renderer;

/// Emits a structured tracing event per frame (or every `every` frames).
#[derive(Debug, Clone)]
pub struct TraceRenderer {
    every: u64,
    frames: u64,
}

impl Default for TraceRenderer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TraceRenderer {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for TraceRenderer {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn present(&mut self, frame: &FrameSnapshot) {
        self.frames += 1;
        if frame.tick % self.every != 0 {
            return;
        }
        let count = |role| frame.with_role(role).count();
        info!(
            vignette = %frame.vignette,
            tick = frame.tick,
            state = %frame.state,
            entities = frame.entities.len(),
            collapsing = count(Role::Collapsing),
            settled = count(Role::Settled),
            measured = count(Role::Measured),
            blend = frame.blend,
            coherence = frame.coherence,
            pulses = frame.pulses,
            "frame"
        );
        if let Some((lo, hi)) = frame.bounds() {
            debug!(?lo, ?hi, "frame bounds");
        }
    }

    fn finish(&mut self) {
        info!(frames = self.frames, "trace renderer finished");
    }
}
