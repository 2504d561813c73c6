use crate::stroke::Point;

/// How a single touch-move event is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpretation {
    /// Append a point to the stroke being drawn.
    Draw,
    /// Move the viewport along with the finger.
    Pan,
    /// Scale the viewport by the change in distance between two fingers.
    Pinch,
    /// Multi-finger contact that is neither a pinch nor a pan. Nothing happens.
    Ignore,
}

/// Decides how a move event should be interpreted.
///
/// `touches` is the number of fingers currently down, `changed` the number reported as changed
/// by this event. This is evaluated for every move, so the interpretation can change in the
/// middle of a gesture.
pub fn classify(touches: usize, changed: usize, hand_mode: bool) -> Interpretation {
    if changed == 2 {
        Interpretation::Pinch
    } else if changed > 2 {
        // Noisy multi-touch input degrades to panning, whatever the hand mode says.
        Interpretation::Pan
    } else if touches > 1 {
        if hand_mode {
            Interpretation::Pan
        } else {
            Interpretation::Ignore
        }
    } else if hand_mode {
        Interpretation::Pan
    } else {
        Interpretation::Draw
    }
}

/// State of the touch sequence currently in progress.
///
/// `anchor` is the baseline the next pan delta is computed against. It is reset on touch-down and
/// release, and updated by every pan and draw step (but not by pinching).
#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Idle {
        anchor: Point,
    },
    Drawing {
        /// The last point drawn, in *canvas* space.
        anchor: Point,
        /// Points of the stroke in progress, in canvas space. Never empty.
        points: Vec<Point>,
    },
    Panning {
        anchor: Point,
    },
    Pinching {
        anchor: Point,
        /// Finger positions of the previous pinch step. `None` on the first step.
        previous: Option<[Point; 2]>,
    },
}

impl Default for Gesture {
    fn default() -> Self {
        Gesture::Idle {
            anchor: Point::ORIGIN,
        }
    }
}

impl Gesture {
    pub fn anchor(&self) -> Point {
        match self {
            Gesture::Idle { anchor }
            | Gesture::Drawing { anchor, .. }
            | Gesture::Panning { anchor }
            | Gesture::Pinching { anchor, .. } => *anchor,
        }
    }

    /// Points of the stroke being drawn, empty unless drawing.
    pub fn active_points(&self) -> &[Point] {
        match self {
            Gesture::Drawing { points, .. } => points,
            _ => &[],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Gesture::Idle { .. } => "idle",
            Gesture::Drawing { .. } => "drawing",
            Gesture::Panning { .. } => "panning",
            Gesture::Pinching { .. } => "pinching",
        }
    }
}
