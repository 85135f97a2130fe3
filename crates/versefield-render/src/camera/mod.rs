/// Zoom limits for a [`Viewport`].
#[derive(Clone, Copy, Debug)]
pub struct ViewportConfig {
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Fraction of the world extent added on every side when fitting.
    pub margin: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.25,
            max_zoom: 8.0,
            margin: 0.1,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct ViewportState {
    zoom: f32,
    last_canvas_size: (f32, f32),
    last_world_min: (f32, f32),
    last_world_size: (f32, f32),
    last_scale: f32,
}

/// Top-down mapping from the world's xz plane onto a pixel or cell grid.
#[derive(Clone, Debug)]
pub struct Viewport {
    config: ViewportConfig,
    state: ViewportState,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewLayout {
    pub scale: f32,
    pub pad: (f32, f32),
    pub render_size: (f32, f32),
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(ViewportConfig::default())
    }
}

impl Viewport {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            state: ViewportState {
                zoom: 1.0,
                ..ViewportState::default()
            },
        }
    }

    #[inline]
    pub fn zoom(&self) -> f32 {
        self.state.zoom
    }

    /// Magnify around the center of the fitted world; clamped to the
    /// configured limits. Non-finite or non-positive factors are ignored.
    /// Takes effect at the next [`Viewport::layout`].
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        if zoom.is_finite() && zoom > 0.0 {
            self.state.zoom = zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        }
        self.state.zoom
    }

    /// Fit `world_min..world_min + world_size` into `canvas_size`, keeping
    /// the aspect ratio, and record the metrics for later conversions.
    pub fn layout(
        &mut self,
        canvas_size: (f32, f32),
        world_min: (f32, f32),
        world_size: (f32, f32),
    ) -> ViewLayout {
        let width_px = canvas_size.0.max(1.0);
        let height_px = canvas_size.1.max(1.0);
        let margin_x = world_size.0.max(1.0) * self.config.margin;
        let margin_y = world_size.1.max(1.0) * self.config.margin;
        let world_w = world_size.0.max(1.0) + 2.0 * margin_x;
        let world_h = world_size.1.max(1.0) + 2.0 * margin_y;
        let base_scale = (width_px / world_w).min(height_px / world_h).max(0.0001);
        let scale = base_scale * self.state.zoom;

        self.state.last_canvas_size = (width_px, height_px);
        self.state.last_world_min = (world_min.0 - margin_x, world_min.1 - margin_y);
        self.state.last_world_size = (world_w, world_h);
        self.state.last_scale = scale;

        let render_size = (world_w * scale, world_h * scale);
        ViewLayout {
            scale,
            pad: (
                (width_px - render_size.0) * 0.5,
                (height_px - render_size.1) * 0.5,
            ),
            render_size,
        }
    }

    fn pad(&self) -> (f32, f32) {
        let scale = self.state.last_scale;
        (
            (self.state.last_canvas_size.0 - self.state.last_world_size.0 * scale) * 0.5,
            (self.state.last_canvas_size.1 - self.state.last_world_size.1 * scale) * 0.5,
        )
    }

    /// Screen position of the world point `(x, z)`. Screen y grows downward
    /// with world z.
    pub fn world_to_screen(&self, point: (f32, f32)) -> Option<(f32, f32)> {
        let scale = self.state.last_scale;
        if scale <= f32::EPSILON || !point.0.is_finite() || !point.1.is_finite() {
            return None;
        }
        let (pad_x, pad_y) = self.pad();
        let x = pad_x + (point.0 - self.state.last_world_min.0) * scale;
        let y = pad_y + (point.1 - self.state.last_world_min.1) * scale;
        Some((x, y))
    }

    /// Grid cell containing the world point, if it lands on the canvas.
    pub fn world_to_cell(&self, point: (f32, f32)) -> Option<(usize, usize)> {
        let (x, y) = self.world_to_screen(point)?;
        let (width, height) = self.state.last_canvas_size;
        if x < 0.0 || y < 0.0 || x >= width || y >= height {
            return None;
        }
        Some((x as usize, y as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANVAS: (f32, f32) = (80.0, 40.0);

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() <= eps
    }

    fn configured() -> Viewport {
        let mut viewport = Viewport::default();
        viewport.layout(CANVAS, (-10.0, -5.0), (20.0, 10.0));
        viewport
    }

    #[test]
    fn world_center_maps_to_canvas_center() {
        let viewport = configured();
        let center = viewport.world_to_screen((0.0, 0.0)).expect("center");
        assert!(approx_eq(center.0, CANVAS.0 * 0.5, 1e-3), "{center:?}");
        assert!(approx_eq(center.1, CANVAS.1 * 0.5, 1e-3), "{center:?}");
        assert_eq!(viewport.world_to_cell((0.1, 0.1)), Some((40, 20)));
        assert_eq!(viewport.world_to_cell((500.0, 0.0)), None);
    }

    #[test]
    fn zoom_magnifies_around_the_center() {
        let mut viewport = Viewport::default();
        assert_eq!(viewport.set_zoom(2.0), 2.0);
        viewport.layout(CANVAS, (-10.0, -5.0), (20.0, 10.0));
        let center = viewport.world_to_screen((0.0, 0.0)).expect("center");
        assert!(approx_eq(center.0, CANVAS.0 * 0.5, 1e-3), "{center:?}");
        let edge = viewport.world_to_screen((5.0, 0.0)).expect("edge");
        let unzoomed = configured().world_to_screen((5.0, 0.0)).expect("edge");
        assert!(approx_eq(edge.0 - center.0, 2.0 * (unzoomed.0 - center.0), 1e-3));
        assert_eq!(viewport.world_to_cell((10.0, 0.0)), None);
    }

    #[test]
    fn zoom_is_clamped_and_rejects_bad_factors() {
        let mut viewport = Viewport::default();
        assert_eq!(viewport.set_zoom(1000.0), 8.0);
        assert_eq!(viewport.set_zoom(f32::NAN), 8.0);
        assert_eq!(viewport.set_zoom(-1.0), 8.0);
        assert_eq!(viewport.set_zoom(0.01), 0.25);
    }

    #[test]
    fn degenerate_layout_rejects_conversions() {
        let viewport = Viewport::default();
        assert!(viewport.world_to_screen((0.0, 0.0)).is_none());
        assert!(viewport.world_to_cell((0.0, 0.0)).is_none());
    }
}
