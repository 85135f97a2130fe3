//! Renderer adapters for Versefield.
//!
//! Renderers only ever see [`FrameSnapshot`] values; they have no path back
//! into the entity store and return nothing to the core.

pub mod ascii;
pub mod camera;
pub mod jsonl;
pub mod trace;

use versefield_core::FrameSnapshot;

pub use ascii::AsciiRenderer;
pub use camera::{ViewLayout, Viewport, ViewportConfig};
pub use jsonl::JsonLinesRenderer;
pub use trace::TraceRenderer;

/// Consumer of per-tick frames.
pub trait Renderer {
    /// Stable identifier describing the renderer implementation (e.g., "ascii", "jsonl").
    fn name(&self) -> &'static str;

    /// Draw one frame.
    fn present(&mut self, frame: &FrameSnapshot);

    /// Flush buffered output at the end of a session.
    fn finish(&mut self) {}
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn present(&mut self, frame: &FrameSnapshot) {
        (**self).present(frame);
    }

    fn finish(&mut self) {
        (**self).finish();
    }
}

/// Renderer that drops every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn name(&self) -> &'static str {
        "null"
    }

    fn present(&mut self, _frame: &FrameSnapshot) {}
}
