use std::io::Write;

use tracing::warn;
use versefield_core::FrameSnapshot;

use crate::Renderer;

/// Writes one JSON object per frame, newline separated.
pub struct JsonLinesRenderer<W: Write> {
    out: W,
    failed: bool,
}

impl<W: Write> JsonLinesRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_frame(&mut self, frame: &FrameSnapshot) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.out, frame)?;
        self.out.write_all(b"\n")
    }
}

impl<W: Write> Renderer for JsonLinesRenderer<W> {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn present(&mut self, frame: &FrameSnapshot) {
        if self.failed {
            return;
        }
        if let Err(err) = self.write_frame(frame) {
            warn!(%err, tick = frame.tick, "jsonl renderer stopped writing");
            self.failed = true;
        }
    }

    fn finish(&mut self) {
        if let Err(err) = self.out.flush() {
            warn!(%err, "failed to flush jsonl output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use versefield_core::{EntitySnapshot, Role, StateLabel};

    fn frame(tick: u64) -> FrameSnapshot {
        FrameSnapshot {
            generation: 2,
            vignette: "pond".to_owned(),
            tick,
            state: StateLabel::Calm,
            blend: 0.0,
            coherence: 1.0,
            pulses: 0,
            entities: vec![EntitySnapshot {
                id: 1,
                position: [0.0, 1.5, 0.0],
                role: Role::Tracked,
                progress: 0.0,
                observable: 0.0,
            }],
        }
    }

    #[test]
    fn writes_one_parseable_line_per_frame() {
        let mut renderer = JsonLinesRenderer::new(Vec::new());
        renderer.present(&frame(1));
        renderer.present(&frame(2));
        renderer.finish();
        let text = String::from_utf8(renderer.into_inner()).expect("utf8");
        let frames: Vec<FrameSnapshot> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("frame"))
            .collect();
        assert_eq!(frames, vec![frame(1), frame(2)]);
    }
}
