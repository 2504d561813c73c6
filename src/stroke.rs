use std::{fmt::Write, sync::Arc};

use crate::{color::Color, math::Vec2f};

/// A sampled touch position.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Point {
    pub pos: Vec2f,
    /// Milliseconds since the session started. Non-decreasing within a gesture.
    pub timestamp: u64,
}

impl Point {
    /// Baseline used when no gesture is in progress.
    pub const ORIGIN: Self = Point {
        pos: Vec2f::ZERO,
        timestamp: 0,
    };

    pub fn new(pos: Vec2f, timestamp: u64) -> Self {
        Self { pos, timestamp }
    }
}

/// A finished (or in-progress) freehand line, with points in canvas space.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub points: Arc<[Point]>,
    pub color: Color,
}

impl Stroke {
    pub fn new(points: impl Into<Arc<[Point]>>, color: Color) -> Self {
        Self {
            points: points.into(),
            color,
        }
    }

    /// SVG-style path data for this stroke.
    ///
    /// An empty stroke yields an empty string. Otherwise the path moves to the first point and
    /// draws a line through every point in order (including the first one again).
    pub fn path_data(&self) -> String {
        let Some(first) = self.points.first() else {
            return String::new();
        };
        let mut path = format!("M {},{}", first.pos.x, first.pos.y);
        for p in self.points.iter() {
            // (writing into a `String` can't fail)
            let _ = write!(path, " L {},{}", p.pos.x, p.pos.y);
        }
        path
    }

    /// Line segments making up the same polyline as [`Stroke::path_data`].
    ///
    /// The first segment is the zero-length one from the initial "move to", so a single-point
    /// stroke still produces something to draw.
    pub fn segments(&self) -> impl Iterator<Item = (Vec2f, Vec2f)> + '_ {
        let mut prev = self.points.first().map(|p| p.pos);
        self.points.iter().filter_map(move |p| {
            let start = prev?;
            prev = Some(p.pos);
            Some((start, p.pos))
        })
    }
}

/// Ordered list of committed strokes.
///
/// Cloning is cheap and clones never observe later changes: [`StrokeHistory::with`] and
/// [`StrokeHistory::without_last`] derive new histories instead of modifying this one.
#[derive(Debug, Clone, Default)]
pub struct StrokeHistory {
    strokes: Arc<Vec<Arc<Stroke>>>,
}

impl StrokeHistory {
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stroke> + '_ {
        self.strokes.iter().map(|s| &**s)
    }

    pub fn last(&self) -> Option<&Stroke> {
        self.strokes.last().map(|s| &**s)
    }

    /// Returns a history with `stroke` appended.
    pub fn with(&self, stroke: Stroke) -> Self {
        let mut strokes = Vec::with_capacity(self.strokes.len() + 1);
        strokes.extend(self.strokes.iter().cloned());
        strokes.push(Arc::new(stroke));
        Self {
            strokes: Arc::new(strokes),
        }
    }

    /// Returns a history containing every stroke except the last one.
    ///
    /// An empty history stays empty.
    pub fn without_last(&self) -> Self {
        let keep = self.strokes.len().saturating_sub(1);
        Self {
            strokes: Arc::new(self.strokes[..keep].to_vec()),
        }
    }

    /// Whether `self` and `other` are the same shared list (not just equal contents).
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.strokes, &other.strokes)
    }
}
