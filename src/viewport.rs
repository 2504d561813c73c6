use crate::math::{vec2, Vec2f};

/// Smallest scale factor the viewport can reach, however it is zoomed.
pub const MIN_SCALE: f32 = 0.1;

/// Scale added by a single "zoom in" step.
const ZOOM_IN_STEP: f32 = 1.0;
/// Scale removed by a single "zoom out" step.
const ZOOM_OUT_STEP: f32 = 0.1;

/// Affine map between canvas space and screen space (translation plus uniform scale).
///
/// `screen.x = canvas.x * scale - translate.x` and `screen.y = canvas.y * scale + translate.y`.
/// The Y translation has the opposite sign of X: dragging the content down increases it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub translate: Vec2f,
    pub scale: f32,
}

/// Axis-aligned display region, in screen units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub origin: Vec2f,
    pub size: Vec2f,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Viewport {
    pub const IDENTITY: Self = Viewport {
        translate: Vec2f::ZERO,
        scale: 1.0,
    };

    pub fn screen_to_canvas(&self, screen: Vec2f) -> Vec2f {
        vec2(
            (screen.x + self.translate.x) / self.scale,
            (screen.y - self.translate.y) / self.scale,
        )
    }

    #[cfg(test)]
    pub fn canvas_to_screen(&self, canvas: Vec2f) -> Vec2f {
        vec2(
            canvas.x * self.scale - self.translate.x,
            canvas.y * self.scale + self.translate.y,
        )
    }

    /// Moves the content by `delta` screen units, so that it follows a dragging finger.
    pub fn pan_by(&mut self, delta: Vec2f) {
        self.translate.x -= delta.x;
        self.translate.y += delta.y;
    }

    /// Applies a pinch step where the finger distance went from `previous` to `current`.
    ///
    /// Returns `false` (and leaves the scale alone) if `previous` is zero.
    pub fn pinch(&mut self, previous: f32, current: f32) -> bool {
        if previous == 0.0 {
            return false;
        }
        self.set_scale(self.scale * (current / previous));
        true
    }

    pub fn zoom_in(&mut self) {
        self.set_scale(self.scale + ZOOM_IN_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_scale(self.scale - ZOOM_OUT_STEP);
    }

    /// Clamps to [`MIN_SCALE`]. There is no upper bound.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.max(MIN_SCALE);
    }

    pub fn reset_translation(&mut self) {
        self.translate = Vec2f::ZERO;
    }

    pub fn reset(&mut self) {
        *self = Self::IDENTITY;
    }

    /// The region of the display a view of `size` covers: its origin is
    /// `(translate.x, -translate.y)`.
    pub fn view_box(&self, size: Vec2f) -> Rect {
        Rect {
            origin: vec2(self.translate.x, -self.translate.y),
            size,
        }
    }
}
