use std::collections::BTreeMap;

use winit::event::TouchPhase;

use crate::{cmd::TouchEvent, math::Vec2f};

/// Finger ID used for a mouse drag with the left button held.
pub const MOUSE_ID: u64 = u64::MAX;

/// Aggregates per-finger platform touch events into [`TouchEvent`]s.
///
/// Platforms deliver one finger per event. The tracker remembers where every finger is and
/// reports the whole set, ordered by finger ID, with each event.
#[derive(Debug, Default)]
pub struct TouchTracker {
    active: BTreeMap<u64, Vec2f>,
}

impl TouchTracker {
    pub fn is_active(&self, id: u64) -> bool {
        self.active.contains_key(&id)
    }

    /// Records one finger's event and returns the aggregated events it produces.
    ///
    /// Lifting a finger so that exactly one stays down also re-grants that finger, so its next
    /// move is measured from where it is rather than from a stale baseline.
    pub fn handle(
        &mut self,
        id: u64,
        phase: TouchPhase,
        position: Vec2f,
        timestamp: u64,
    ) -> Vec<TouchEvent> {
        match phase {
            TouchPhase::Started => {
                if self.active.insert(id, position).is_some() {
                    log::warn!("touch {id} started twice");
                }
                vec![TouchEvent::Start {
                    touches: self.positions(),
                    timestamp,
                }]
            }
            TouchPhase::Moved => {
                let Some(pos) = self.active.get_mut(&id) else {
                    return Vec::new();
                };
                if *pos == position {
                    return Vec::new();
                }
                *pos = position;
                // Every finger counts as changed: with two fingers down, moving either of them is
                // a pinch step.
                let touches = self.positions();
                vec![TouchEvent::Move {
                    changed: touches.clone(),
                    touches,
                    timestamp,
                }]
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                if self.active.remove(&id).is_none() {
                    return Vec::new();
                }
                let remaining = self.positions();
                let mut events = vec![TouchEvent::End {
                    remaining: remaining.clone(),
                    timestamp,
                }];
                if remaining.len() == 1 {
                    events.push(TouchEvent::Start {
                        touches: remaining,
                        timestamp,
                    });
                }
                events
            }
        }
    }

    /// Lifts every finger at once, for when the window stops receiving input.
    pub fn release_all(&mut self, timestamp: u64) -> Option<TouchEvent> {
        if self.active.is_empty() {
            return None;
        }
        log::debug!("releasing {} abandoned touches", self.active.len());
        self.active.clear();
        Some(TouchEvent::End {
            remaining: Vec::new(),
            timestamp,
        })
    }

    fn positions(&self) -> Vec<Vec2f> {
        self.active.values().copied().collect()
    }
}
