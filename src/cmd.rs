use crate::{color::Color, math::Vec2f};

/// Discrete actions triggered from outside the canvas (toolbar buttons, key bindings).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cmd {
    SetColor { color: Color },
    ToggleHandMode,
    ZoomIn,
    ZoomOut,
    /// Back to the identity viewport.
    ResetView,
    /// Deletes every stroke and resets the translation (but not the scale).
    Clear,
    Undo,
}

/// An aggregated touch event, covering every finger on the surface.
///
/// All positions are in screen space. `timestamp` is in milliseconds since session start.
#[derive(Debug, Clone, PartialEq)]
pub enum TouchEvent {
    /// A finger went down. `touches` includes it.
    Start { touches: Vec<Vec2f>, timestamp: u64 },
    Move {
        touches: Vec<Vec2f>,
        changed: Vec<Vec2f>,
        timestamp: u64,
    },
    /// A finger was lifted. `remaining` are the fingers still down.
    End { remaining: Vec<Vec2f>, timestamp: u64 },
}
