use std::io::Write;

use tracing::warn;
use versefield_core::{EntitySnapshot, FrameSnapshot, Role};

use crate::Renderer;
use crate::camera::Viewport;

/// Top-down character grid of the xz plane, written every `every` ticks.
pub struct AsciiRenderer<W: Write> {
    out: W,
    viewport: Viewport,
    columns: usize,
    rows: usize,
    every: u64,
}

impl<W: Write> AsciiRenderer<W> {
    pub fn new(out: W, columns: usize, rows: usize) -> Self {
        Self {
            out,
            viewport: Viewport::default(),
            columns: columns.max(1),
            rows: rows.max(1),
            every: 1,
        }
    }

    /// Only draw frames whose tick is a multiple of `every`.
    pub fn every(mut self, every: u64) -> Self {
        self.every = every.max(1);
        self
    }

    /// Magnify the fitted view; see [`Viewport::set_zoom`].
    pub fn zoom(mut self, zoom: f32) -> Self {
        self.viewport.set_zoom(zoom);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Rasterize `frame` into grid lines.
    pub fn rasterize(&mut self, frame: &FrameSnapshot) -> Vec<String> {
        let mut grid = vec![vec!['.'; self.columns]; self.rows];
        if let Some((lo, hi)) = frame.bounds() {
            self.viewport.layout(
                (self.columns as f32, self.rows as f32),
                (lo[0], lo[2]),
                (hi[0] - lo[0], hi[2] - lo[2]),
            );
            for entity in &frame.entities {
                let [x, _, z] = entity.position;
                if let Some((col, row)) = self.viewport.world_to_cell((x, z)) {
                    grid[row][col] = glyph(entity);
                }
            }
        }
        grid.into_iter().map(|row| row.into_iter().collect()).collect()
    }

    fn draw(&mut self, frame: &FrameSnapshot) -> std::io::Result<()> {
        let lines = self.rasterize(frame);
        writeln!(
            self.out,
            "[{}] tick {} state {} blend {:.2} coherence {:.3} pulses {}",
            frame.vignette, frame.tick, frame.state, frame.blend, frame.coherence, frame.pulses
        )?;
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }
}

fn glyph(entity: &EntitySnapshot) -> char {
    match entity.role {
        Role::Free => 'o',
        Role::Tracked => '~',
        Role::PairedA => 'A',
        Role::PairedB => 'B',
        Role::Marker => '+',
        Role::Collapsing => '*',
        Role::Settled => '#',
        Role::Measured if entity.observable >= 0.0 => 'U',
        Role::Measured => 'D',
    }
}

impl<W: Write> Renderer for AsciiRenderer<W> {
    fn name(&self) -> &'static str {
        "ascii"
    }

    fn present(&mut self, frame: &FrameSnapshot) {
        if frame.tick % self.every != 0 {
            return;
        }
        if let Err(err) = self.draw(frame) {
            warn!(%err, tick = frame.tick, "ascii renderer failed to draw");
        }
    }

    fn finish(&mut self) {
        if let Err(err) = self.out.flush() {
            warn!(%err, "failed to flush ascii output");
        }
    }
}
