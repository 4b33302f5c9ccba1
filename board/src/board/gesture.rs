//! Gesture classifier
//!
//! Turns one pointer interaction into a drag, a tap, a delete or an
//! expand. Mouse and pen start dragging once they leave a small radius.
//! Touch only drags after a long press, so a flick over a note scrolls
//! the page instead of moving the note.

use crate::config::{FINE_DRAG_THRESHOLD_PX, LONG_PRESS, TOUCH_CANCEL_THRESHOLD_PX};
use std::time::Instant;

/// Precision of the input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    /// Mouse or pen
    Fine,
    /// Touch
    Coarse,
}

/// Part of the note the pointer went down on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    Body,
    DeleteControl,
    AuthorCaption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    /// Pointer is down, not yet classified
    Pending,
    Dragging,
    Tapped,
    /// Touch moved away before the long press; ignored until release
    Cancelled,
}

/// What the classifier decided. Offsets are cumulative from the
/// pointer-down point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    DragStarted { dx: f64, dy: f64, haptic: bool },
    Moved { dx: f64, dy: f64 },
    Released { dx: f64, dy: f64 },
    Tap,
    Delete,
    Expand,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct GestureClassifier {
    state: GestureState,
    kind: PointerKind,
    start: (f64, f64),
    last: (f64, f64),
    pressed_at: Option<Instant>,
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureClassifier {
    pub fn new() -> Self {
        Self {
            state: GestureState::Idle,
            kind: PointerKind::Fine,
            start: (0.0, 0.0),
            last: (0.0, 0.0),
            pressed_at: None,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        self.state == GestureState::Dragging
    }

    pub fn down(
        &mut self,
        kind: PointerKind,
        target: PointerTarget,
        x: f64,
        y: f64,
        now: Instant,
    ) -> Option<Gesture> {
        match target {
            PointerTarget::DeleteControl => {
                self.reset();
                Some(Gesture::Delete)
            }
            PointerTarget::AuthorCaption => {
                self.reset();
                Some(Gesture::Expand)
            }
            PointerTarget::Body => {
                self.state = GestureState::Pending;
                self.kind = kind;
                self.start = (x, y);
                self.last = (x, y);
                self.pressed_at = Some(now);
                None
            }
        }
    }

    pub fn move_to(&mut self, x: f64, y: f64, now: Instant) -> Option<Gesture> {
        self.last = (x, y);
        let (dx, dy) = self.offset();

        match (self.state, self.kind) {
            (GestureState::Dragging, _) => Some(Gesture::Moved { dx, dy }),
            (GestureState::Pending, PointerKind::Fine) => {
                if dx.hypot(dy) > FINE_DRAG_THRESHOLD_PX {
                    self.state = GestureState::Dragging;
                    Some(Gesture::DragStarted {
                        dx,
                        dy,
                        haptic: false,
                    })
                } else {
                    None
                }
            }
            (GestureState::Pending, PointerKind::Coarse) => {
                if self.hold_elapsed(now) {
                    self.state = GestureState::Dragging;
                    Some(Gesture::DragStarted { dx, dy, haptic: true })
                } else if dx.hypot(dy) > TOUCH_CANCEL_THRESHOLD_PX {
                    self.state = GestureState::Cancelled;
                    self.pressed_at = None;
                    Some(Gesture::Cancelled)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Advance time without pointer movement; a held touch becomes a drag
    pub fn tick(&mut self, now: Instant) -> Option<Gesture> {
        if self.state == GestureState::Pending
            && self.kind == PointerKind::Coarse
            && self.hold_elapsed(now)
        {
            self.state = GestureState::Dragging;
            let (dx, dy) = self.offset();
            return Some(Gesture::DragStarted { dx, dy, haptic: true });
        }
        None
    }

    pub fn up(&mut self, now: Instant) -> Option<Gesture> {
        let (dx, dy) = self.offset();

        let gesture = match self.state {
            GestureState::Dragging => Some(Gesture::Released { dx, dy }),
            GestureState::Pending if self.kind == PointerKind::Coarse && self.hold_elapsed(now) => {
                // Held long enough but nobody ticked: a drag that went nowhere.
                Some(Gesture::Released { dx, dy })
            }
            GestureState::Pending => {
                self.state = GestureState::Tapped;
                self.pressed_at = None;
                return Some(Gesture::Tap);
            }
            _ => None,
        };

        self.reset();
        gesture
    }

    fn offset(&self) -> (f64, f64) {
        (self.last.0 - self.start.0, self.last.1 - self.start.1)
    }

    fn hold_elapsed(&self, now: Instant) -> bool {
        self.pressed_at
            .is_some_and(|at| now.saturating_duration_since(at) >= LONG_PRESS)
    }

    fn reset(&mut self) {
        self.state = GestureState::Idle;
        self.pressed_at = None;
    }
}
