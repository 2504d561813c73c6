use std::mem::{self, discriminant};

use crate::{
    cmd::{Cmd, TouchEvent},
    color::Color,
    gesture::{classify, Gesture, Interpretation},
    math::Vec2f,
    stroke::{Point, Stroke, StrokeHistory},
    viewport::{Rect, Viewport},
};

/// Everything the renderer needs for one frame.
///
/// Later changes to the session are never visible through a snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub viewport: Viewport,
    pub view_box: Rect,
    pub strokes: StrokeHistory,
    /// The stroke being drawn right now, in the currently selected color. May be empty.
    pub active: Stroke,
    pub hand_mode: bool,
}

/// A drawing surface: committed strokes, the stroke in progress, and the viewport.
///
/// Touch events are fed in through [`DrawingSession::handle_touch`] (or the individual
/// `gesture_*` methods), toolbar actions through [`DrawingSession::apply`].
pub struct DrawingSession {
    history: StrokeHistory,
    gesture: Gesture,
    viewport: Viewport,
    color: Color,
    hand_mode: bool,
    view_size: Vec2f,
}

impl DrawingSession {
    pub fn new(view_size: Vec2f, color: Color) -> Self {
        Self {
            history: StrokeHistory::default(),
            gesture: Gesture::default(),
            viewport: Viewport::IDENTITY,
            color,
            hand_mode: false,
            view_size,
        }
    }

    pub fn set_view_size(&mut self, size: Vec2f) {
        self.view_size = size;
    }

    #[cfg(test)]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[cfg(test)]
    pub fn strokes(&self) -> &StrokeHistory {
        &self.history
    }

    pub fn active_points(&self) -> &[Point] {
        self.gesture.active_points()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            viewport: self.viewport,
            view_box: self.viewport.view_box(self.view_size),
            strokes: self.history.clone(),
            active: Stroke::new(self.active_points(), self.color),
            hand_mode: self.hand_mode,
        }
    }

    pub fn handle_touch(&mut self, event: TouchEvent) {
        match event {
            TouchEvent::Start { touches, timestamp } => self.gesture_start(&touches, timestamp),
            TouchEvent::Move {
                touches,
                changed,
                timestamp,
            } => self.gesture_move(&touches, &changed, timestamp),
            TouchEvent::End {
                remaining,
                timestamp,
            } => self.gesture_end(&remaining, timestamp),
        }
    }

    /// A finger went down.
    ///
    /// Only a touch-down with at most one finger on the surface starts a new gesture. Additional
    /// fingers keep the current baseline.
    pub fn gesture_start(&mut self, touches: &[Vec2f], timestamp: u64) {
        if touches.len() > 1 {
            return;
        }

        let pos = touches.first().copied().unwrap_or(Vec2f::ZERO);
        self.set_gesture(Gesture::Idle {
            anchor: Point::new(pos, timestamp),
        });
    }

    pub fn gesture_move(&mut self, touches: &[Vec2f], changed: &[Vec2f], timestamp: u64) {
        let interpretation = classify(touches.len(), changed.len(), self.hand_mode);
        let location = changed.first().or(touches.first()).copied();
        match (interpretation, changed, location) {
            (Interpretation::Pinch, &[a, b], _) => self.pinch([a, b], timestamp),
            (Interpretation::Pan, _, Some(pos)) => self.pan(pos, timestamp),
            (Interpretation::Draw, _, Some(pos)) => self.draw(pos, timestamp),
            (Interpretation::Ignore, ..) => {
                // Extra fingers on the surface end the stroke without committing it.
                if let Gesture::Drawing { anchor, .. } = self.gesture {
                    self.set_gesture(Gesture::Idle { anchor });
                }
            }
            _ => {}
        }
    }

    /// A finger was lifted.
    ///
    /// While more than one finger remains on the surface this is not the end of the gesture and
    /// is ignored. Otherwise the stroke in progress (if any) is committed.
    pub fn gesture_end(&mut self, remaining: &[Vec2f], _timestamp: u64) {
        if remaining.len() > 1 {
            return;
        }

        let ended = mem::take(&mut self.gesture);
        log::trace!("gesture ended while {}", ended.name());
        if let Gesture::Drawing { points, .. } = ended {
            self.commit(points);
        }
    }

    pub fn apply(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::SetColor { color } => self.color = color,
            Cmd::ToggleHandMode => {
                self.hand_mode = !self.hand_mode;
                log::info!("hand mode {}", if self.hand_mode { "on" } else { "off" });
            }
            Cmd::ZoomIn => self.viewport.zoom_in(),
            Cmd::ZoomOut => self.viewport.zoom_out(),
            Cmd::ResetView => {
                log::debug!("resetting view");
                self.viewport.reset();
            }
            Cmd::Clear => {
                log::info!("clearing canvas ({} strokes)", self.history.len());
                self.history = StrokeHistory::default();
                self.viewport.reset_translation();
            }
            Cmd::Undo => {
                if self.history.is_empty() {
                    log::debug!("nothing to undo");
                } else {
                    self.history = self.history.without_last();
                }
            }
        }
    }

    fn pinch(&mut self, fingers: [Vec2f; 2], timestamp: u64) {
        let current = fingers.map(|pos| Point::new(pos, timestamp));
        let (anchor, previous) = match self.gesture {
            Gesture::Pinching { anchor, previous } => (anchor, previous),
            ref other => (other.anchor(), None),
        };

        if let Some([p0, p1]) = previous {
            let before = p0.pos.dist(p1.pos);
            let after = fingers[0].dist(fingers[1]);
            if !self.viewport.pinch(before, after) {
                log::debug!("skipping pinch step from coincident fingers");
            }
        }

        self.set_gesture(Gesture::Pinching {
            anchor,
            previous: Some(current),
        });
    }

    fn pan(&mut self, pos: Vec2f, timestamp: u64) {
        let delta = pos - self.gesture.anchor().pos;
        self.viewport.pan_by(delta);
        self.set_gesture(Gesture::Panning {
            anchor: Point::new(pos, timestamp),
        });
    }

    fn draw(&mut self, pos: Vec2f, timestamp: u64) {
        let point = Point::new(self.viewport.screen_to_canvas(pos), timestamp);
        // NB: the anchor becomes a canvas-space point, while panning expects screen space. A
        // switch to panning mid-gesture computes its first delta across the two.
        if let Gesture::Drawing { anchor, points } = &mut self.gesture {
            *anchor = point;
            points.push(point);
        } else {
            self.set_gesture(Gesture::Drawing {
                anchor: point,
                points: vec![point],
            });
        }
    }

    fn set_gesture(&mut self, next: Gesture) {
        if discriminant(&self.gesture) != discriminant(&next) {
            log::debug!("gesture: {} -> {}", self.gesture.name(), next.name());
            let dropped = self.gesture.active_points().len();
            if dropped != 0 {
                log::debug!("discarding {dropped} uncommitted stroke points");
            }
        }
        self.gesture = next;
    }

    fn commit(&mut self, points: Vec<Point>) {
        if points.is_empty() {
            return;
        }
        log::debug!(
            "committing stroke #{} ({} points)",
            self.history.len() + 1,
            points.len()
        );
        self.history = self.history.with(Stroke::new(points, self.color));
        if let Some(stroke) = self.history.last() {
            log::trace!("stroke path: {}", stroke.path_data());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{math::vec2, viewport::MIN_SCALE};

    fn session() -> DrawingSession {
        DrawingSession::new(vec2(800.0, 600.0), Color::BLACK)
    }

    /// Draws a whole single-finger stroke through `points` (screen space).
    fn stroke(s: &mut DrawingSession, points: &[Vec2f]) {
        s.gesture_start(&points[..1], 0);
        for (t, &p) in points.iter().enumerate() {
            s.gesture_move(&[p], &[p], t as u64);
        }
        s.gesture_end(&[], points.len() as u64);
    }

    fn two_fingers(s: &mut DrawingSession, a: Vec2f, b: Vec2f, t: u64) {
        s.gesture_move(&[a, b], &[a, b], t);
    }

    #[test]
    fn draw_points_are_inverse_transformed() {
        let mut s = session();
        s.apply(Cmd::ZoomIn);
        s.apply(Cmd::ToggleHandMode);
        s.gesture_start(&[vec2(100.0, 100.0)], 0);
        s.gesture_move(&[vec2(90.0, 110.0)], &[vec2(90.0, 110.0)], 1);
        s.gesture_end(&[], 2);
        s.apply(Cmd::ToggleHandMode);
        let vp = s.viewport();
        assert_eq!(vp.translate, vec2(10.0, 10.0));
        assert_eq!(vp.scale, 2.0);

        let screen = [vec2(0.0, 0.0), vec2(10.0, 30.0), vec2(-4.0, 7.5)];
        s.gesture_start(&screen[..1], 10);
        for (i, &p) in screen.iter().enumerate() {
            s.gesture_move(&[p], &[p], 10 + i as u64);
            assert_eq!(s.active_points().len(), i + 1);
        }
        let expected = screen
            .iter()
            .enumerate()
            .map(|(i, &p)| Point::new(vp.screen_to_canvas(p), 10 + i as u64))
            .collect::<Vec<_>>();
        assert_eq!(s.active_points(), expected);
        assert_eq!(expected[1].pos, vec2(10.0, 10.0));

        s.gesture_end(&[], 20);
        assert!(s.active_points().is_empty());
        assert_eq!(s.strokes().len(), 1);
        assert_eq!(&*s.strokes().last().unwrap().points, expected);
    }

    #[test]
    fn committed_strokes_are_immutable() {
        let mut s = session();
        s.apply(Cmd::SetColor {
            color: Color::rgb(0xff, 0, 0),
        });
        stroke(&mut s, &[vec2(1.0, 1.0), vec2(2.0, 2.0)]);
        let before = s.snapshot();
        let first = before.strokes.last().unwrap().clone();
        assert_eq!(first.color, Color::rgb(0xff, 0, 0));

        s.apply(Cmd::SetColor {
            color: Color::BLACK,
        });
        s.gesture_start(&[vec2(5.0, 5.0)], 10);
        s.gesture_move(&[vec2(5.0, 5.0)], &[vec2(5.0, 5.0)], 11);
        s.gesture_move(&[vec2(6.0, 6.0)], &[vec2(6.0, 6.0)], 12);
        s.gesture_end(&[], 13);
        s.apply(Cmd::Undo);
        s.apply(Cmd::Clear);

        assert_eq!(before.strokes.len(), 1);
        assert_eq!(before.strokes.last(), Some(&first));
        assert_eq!(first.points.len(), 2);
        assert!(before.active.points.is_empty());
    }

    #[test]
    fn undo_until_empty_is_idempotent() {
        let mut s = session();
        for i in 0..3 {
            stroke(&mut s, &[vec2(i as f32, 0.0)]);
        }
        assert_eq!(s.strokes().len(), 3);
        s.apply(Cmd::Undo);
        assert_eq!(s.strokes().len(), 2);
        assert_eq!(s.strokes().last().unwrap().points[0].pos, vec2(1.0, 0.0));
        for _ in 0..5 {
            s.apply(Cmd::Undo);
        }
        assert!(s.strokes().is_empty());
    }

    #[test]
    fn clear_then_undo() {
        let mut s = session();
        s.apply(Cmd::ZoomIn);
        s.apply(Cmd::ToggleHandMode);
        s.gesture_start(&[vec2(0.0, 0.0)], 0);
        s.gesture_move(&[vec2(7.0, 7.0)], &[vec2(7.0, 7.0)], 1);
        s.gesture_end(&[], 2);
        s.apply(Cmd::ToggleHandMode);
        stroke(&mut s, &[vec2(1.0, 1.0)]);

        s.apply(Cmd::Clear);
        assert!(s.strokes().is_empty());
        assert_eq!(s.viewport().translate, Vec2f::ZERO);
        assert_eq!(s.viewport().scale, 2.0, "clearing keeps the zoom level");

        s.apply(Cmd::Undo);
        assert!(s.strokes().is_empty());
    }

    #[test]
    fn pinch_doubling_distance_doubles_scale() {
        let mut s = session();
        s.apply(Cmd::ZoomIn);
        s.gesture_start(&[vec2(0.0, 0.0)], 0);
        two_fingers(&mut s, vec2(0.0, 0.0), vec2(50.0, 0.0), 1);
        assert_eq!(s.viewport().scale, 2.0, "first pinch frame only seeds");
        two_fingers(&mut s, vec2(0.0, 0.0), vec2(100.0, 0.0), 2);
        assert_eq!(s.viewport().scale, 4.0);
    }

    #[test]
    fn pinch_scenario_clamps_to_floor() {
        let mut s = session();
        s.gesture_start(&[vec2(0.0, 0.0)], 0);
        two_fingers(&mut s, vec2(0.0, 0.0), vec2(100.0, 0.0), 1);
        two_fingers(&mut s, vec2(0.0, 0.0), vec2(150.0, 0.0), 2);
        assert_eq!(s.viewport().scale, 1.5);
        two_fingers(&mut s, vec2(0.0, 0.0), vec2(5.0, 0.0), 3);
        assert_eq!(s.viewport().scale, MIN_SCALE);
    }

    #[test]
    fn coincident_pinch_is_skipped() {
        let mut s = session();
        two_fingers(&mut s, vec2(3.0, 3.0), vec2(3.0, 3.0), 1);
        two_fingers(&mut s, vec2(0.0, 0.0), vec2(30.0, 40.0), 2);
        assert_eq!(s.viewport().scale, 1.0);
        assert!(s.viewport().scale.is_finite());
        // the pair was still refreshed
        two_fingers(&mut s, vec2(0.0, 0.0), vec2(60.0, 80.0), 3);
        assert_eq!(s.viewport().scale, 2.0);
    }

    #[test]
    fn reset_view_restores_identity() {
        let mut s = session();
        s.apply(Cmd::ZoomIn);
        s.apply(Cmd::ZoomOut);
        s.apply(Cmd::ToggleHandMode);
        s.gesture_start(&[vec2(0.0, 0.0)], 0);
        s.gesture_move(&[vec2(-20.0, 9.0)], &[vec2(-20.0, 9.0)], 1);
        assert_ne!(s.viewport(), Viewport::IDENTITY);
        s.apply(Cmd::ResetView);
        assert_eq!(s.viewport(), Viewport::IDENTITY);
        s.apply(Cmd::ResetView);
        assert_eq!(s.viewport(), Viewport::IDENTITY);
    }

    #[test]
    fn pan_then_draw_scenario() {
        let mut s = session();
        stroke(&mut s, &[vec2(10.0, 10.0)]);
        assert_eq!(s.strokes().last().unwrap().points[0].pos, vec2(10.0, 10.0));

        // finger moves right 5, up 3
        s.apply(Cmd::ToggleHandMode);
        s.gesture_start(&[vec2(50.0, 50.0)], 10);
        s.gesture_move(&[vec2(55.0, 47.0)], &[vec2(55.0, 47.0)], 11);
        s.gesture_end(&[], 12);
        s.apply(Cmd::ToggleHandMode);
        assert_eq!(s.viewport().translate, vec2(-5.0, -3.0));
        assert_eq!(s.strokes().len(), 1, "panning commits nothing");

        stroke(&mut s, &[vec2(10.0, 10.0)]);
        assert_eq!(s.strokes().last().unwrap().points[0].pos, vec2(5.0, 13.0));
    }

    #[test]
    fn second_finger_during_draw_discards_stroke() {
        let mut s = session();
        s.gesture_start(&[vec2(0.0, 0.0)], 0);
        s.gesture_move(&[vec2(1.0, 1.0)], &[vec2(1.0, 1.0)], 1);
        s.gesture_move(&[vec2(2.0, 2.0)], &[vec2(2.0, 2.0)], 2);
        assert_eq!(s.active_points().len(), 2);

        // second finger down: ignored, no reset
        s.gesture_start(&[vec2(2.0, 2.0), vec2(40.0, 40.0)], 3);
        assert_eq!(s.active_points().len(), 2);

        two_fingers(&mut s, vec2(2.0, 2.0), vec2(40.0, 40.0), 4);
        assert!(s.active_points().is_empty());

        // lifting one of the two fingers ends the gesture; nothing to commit
        s.gesture_end(&[vec2(2.0, 2.0)], 5);
        assert!(s.strokes().is_empty());
        assert_eq!(s.snapshot().active.points.len(), 0);
    }

    #[test]
    fn resting_finger_stops_drawing() {
        let mut s = session();
        s.gesture_start(&[vec2(0.0, 0.0)], 0);
        s.gesture_move(&[vec2(1.0, 1.0)], &[vec2(1.0, 1.0)], 1);
        s.gesture_move(&[vec2(1.0, 1.0), vec2(9.0, 9.0)], &[vec2(3.0, 3.0)], 2);
        assert!(s.active_points().is_empty());
        assert_eq!(s.viewport(), Viewport::IDENTITY);
    }

    #[test]
    fn partial_release_is_ignored() {
        let mut s = session();
        s.gesture_start(&[vec2(0.0, 0.0)], 0);
        s.gesture_move(&[vec2(1.0, 1.0)], &[vec2(1.0, 1.0)], 1);
        s.gesture_end(&[vec2(1.0, 1.0), vec2(5.0, 5.0)], 2);
        assert_eq!(s.active_points().len(), 1);
        assert!(s.strokes().is_empty());
    }

    #[test]
    fn release_without_points_commits_nothing() {
        let mut s = session();
        s.gesture_start(&[vec2(4.0, 4.0)], 0);
        s.gesture_end(&[], 1);
        assert!(s.strokes().is_empty());
    }

    #[test]
    fn many_changed_touches_pan_without_hand_mode() {
        let mut s = session();
        s.gesture_start(&[vec2(10.0, 10.0)], 0);
        let fingers = [vec2(12.0, 14.0), vec2(50.0, 50.0), vec2(90.0, 10.0)];
        s.gesture_move(&fingers, &fingers, 1);
        assert_eq!(s.viewport().translate, vec2(-2.0, 4.0));
        assert!(s.active_points().is_empty());
    }

    #[test]
    fn pinch_pair_does_not_survive_drawing() {
        let mut s = session();
        two_fingers(&mut s, vec2(0.0, 0.0), vec2(10.0, 0.0), 1);
        s.gesture_move(&[vec2(5.0, 5.0)], &[vec2(5.0, 5.0)], 2);
        // a new pinch seeds again rather than comparing against the old pair
        two_fingers(&mut s, vec2(0.0, 0.0), vec2(100.0, 0.0), 3);
        assert_eq!(s.viewport().scale, 1.0);
    }

    #[test]
    fn pinch_keeps_pan_baseline() {
        let mut s = session();
        s.apply(Cmd::ToggleHandMode);
        s.gesture_start(&[vec2(10.0, 10.0)], 0);
        two_fingers(&mut s, vec2(0.0, 0.0), vec2(10.0, 0.0), 1);
        s.gesture_move(&[vec2(13.0, 10.0)], &[vec2(13.0, 10.0)], 2);
        assert_eq!(s.viewport().translate, vec2(-3.0, 0.0));
    }

    #[test]
    fn draw_then_pan_uses_canvas_space_baseline() {
        let mut s = session();
        s.apply(Cmd::ZoomIn);
        s.gesture_start(&[vec2(10.0, 10.0)], 0);
        s.gesture_move(&[vec2(10.0, 10.0)], &[vec2(10.0, 10.0)], 1);
        assert_eq!(s.active_points()[0].pos, vec2(5.0, 5.0));

        s.apply(Cmd::ToggleHandMode);
        s.gesture_move(&[vec2(12.0, 10.0)], &[vec2(12.0, 10.0)], 2);
        assert_eq!(s.viewport().translate, vec2(-7.0, 5.0));
        assert!(s.active_points().is_empty());
    }

    #[test]
    fn pinch_then_pan_uses_grant_baseline() {
        let mut s = session();
        s.gesture_start(&[vec2(0.0, 0.0)], 0);
        two_fingers(&mut s, vec2(10.0, 0.0), vec2(20.0, 0.0), 1);
        two_fingers(&mut s, vec2(15.0, 0.0), vec2(20.0, 0.0), 2);
        assert_eq!(s.viewport().scale, 0.5);

        // a third finger degrades to a pan measured from the touch-down point
        let fingers = [vec2(15.0, 0.0), vec2(20.0, 0.0), vec2(30.0, 0.0)];
        s.gesture_move(&fingers, &fingers, 3);
        assert_eq!(s.viewport().translate, vec2(-15.0, 0.0));
    }

    #[test]
    fn snapshot_reports_view_box() {
        let mut s = session();
        s.set_view_size(vec2(1024.0, 768.0));
        s.apply(Cmd::ToggleHandMode);
        s.gesture_start(&[vec2(0.0, 0.0)], 0);
        s.gesture_move(&[vec2(-4.0, 6.0)], &[vec2(-4.0, 6.0)], 1);

        let snap = s.snapshot();
        assert!(snap.hand_mode);
        assert_eq!(snap.view_box.origin, vec2(4.0, -6.0));
        assert_eq!(snap.view_box.size, vec2(1024.0, 768.0));
    }

    #[test]
    fn active_stroke_uses_current_color() {
        let mut s = session();
        let red = Color::rgb(0xff, 0, 0);
        s.gesture_start(&[vec2(0.0, 0.0)], 0);
        s.gesture_move(&[vec2(1.0, 1.0)], &[vec2(1.0, 1.0)], 1);
        s.apply(Cmd::SetColor { color: red });
        assert_eq!(s.snapshot().active.color, red);
        s.gesture_end(&[], 2);
        assert_eq!(s.strokes().last().unwrap().color, red);
    }

    #[test]
    fn handle_touch_dispatches() {
        let mut s = session();
        let p = vec2(3.0, 4.0);
        s.handle_touch(TouchEvent::Start {
            touches: vec![p],
            timestamp: 0,
        });
        s.handle_touch(TouchEvent::Move {
            touches: vec![p],
            changed: vec![p],
            timestamp: 1,
        });
        s.handle_touch(TouchEvent::End {
            remaining: vec![],
            timestamp: 2,
        });
        assert_eq!(s.strokes().len(), 1);
        assert_eq!(s.strokes().last().unwrap().points[0], Point::new(p, 1));
    }
}
