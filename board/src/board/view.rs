//! Note view
//!
//! Per-note presentation state: where the note sits on screen, how it
//! is tilted, and the gesture in progress on it. A view never touches
//! the board's note list; it reports what the user did as a
//! [`ViewAction`] and the board applies it.

use super::gesture::{Gesture, GestureClassifier, PointerKind, PointerTarget};
use crate::config::MAX_ROTATION_DEG;
use crate::model::Note;
use sha2::{Digest, Sha256};
use std::time::Instant;

/// Pointer input delivered to a note view
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down {
        kind: PointerKind,
        target: PointerTarget,
        x: f64,
        y: f64,
    },
    Move {
        x: f64,
        y: f64,
    },
    Up,
    /// Time passed with the pointer held still
    Tick,
}

/// Outcome of a pointer event for the board to apply
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewAction {
    None,
    /// Drag mode entered; `haptic` asks the shell for a vibration pulse
    DragStarted { haptic: bool },
    /// Local position changed; nothing to persist yet
    Moved,
    /// Drag finished at this position
    Persist { x: f64, y: f64 },
    Expand,
    Delete,
}

#[derive(Debug, Clone)]
pub struct NoteView {
    note_id: String,
    has_author: bool,
    origin: (f64, f64),
    position: (f64, f64),
    rotation: f64,
    gesture: GestureClassifier,
}

impl NoteView {
    pub fn new(note: &Note) -> Self {
        Self {
            note_id: note.id.clone(),
            has_author: note.has_author(),
            origin: note.position(),
            position: note.position(),
            rotation: rotation_for(&note.id),
            gesture: GestureClassifier::new(),
        }
    }

    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    /// On-screen position, including any drag in progress
    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    /// Tilt in degrees
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn is_dragging(&self) -> bool {
        self.gesture.is_dragging()
    }

    /// Take the canonical note after a reconciliation. A drag in
    /// progress keeps its local position.
    pub fn sync(&mut self, note: &Note) {
        self.has_author = note.has_author();
        if !self.is_dragging() {
            self.origin = note.position();
            self.position = note.position();
        }
    }

    pub fn handle(&mut self, event: PointerEvent, now: Instant) -> ViewAction {
        let gesture = match event {
            PointerEvent::Down { kind, target, x, y } => {
                // No caption is drawn without an author; the press lands on the body.
                let target = match target {
                    PointerTarget::AuthorCaption if !self.has_author => PointerTarget::Body,
                    other => other,
                };
                if target == PointerTarget::Body {
                    self.origin = self.position;
                }
                self.gesture.down(kind, target, x, y, now)
            }
            PointerEvent::Move { x, y } => self.gesture.move_to(x, y, now),
            PointerEvent::Up => self.gesture.up(now),
            PointerEvent::Tick => self.gesture.tick(now),
        };

        match gesture {
            None | Some(Gesture::Cancelled) => ViewAction::None,
            Some(Gesture::DragStarted { dx, dy, haptic }) => {
                self.move_by(dx, dy);
                ViewAction::DragStarted { haptic }
            }
            Some(Gesture::Moved { dx, dy }) => {
                self.move_by(dx, dy);
                ViewAction::Moved
            }
            Some(Gesture::Released { dx, dy }) => {
                self.move_by(dx, dy);
                let (x, y) = self.position;
                ViewAction::Persist { x, y }
            }
            Some(Gesture::Tap) | Some(Gesture::Expand) => ViewAction::Expand,
            Some(Gesture::Delete) => ViewAction::Delete,
        }
    }

    fn move_by(&mut self, dx: f64, dy: f64) {
        self.position = (self.origin.0 + dx, self.origin.1 + dy);
    }
}

/// Stable tilt for a note, in `[-MAX_ROTATION_DEG, MAX_ROTATION_DEG]`
pub fn rotation_for(note_id: &str) -> f64 {
    let digest = Sha256::digest(note_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let unit = u64::from_be_bytes(bytes) as f64 / u64::MAX as f64;
    unit * 2.0 * MAX_ROTATION_DEG - MAX_ROTATION_DEG
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoteColor;
    use chrono::Utc;
    use std::time::Duration;

    fn note(author: &str) -> Note {
        Note {
            id: "note-1".to_string(),
            content: "Te queremos".to_string(),
            author_name: author.to_string(),
            color: NoteColor::Cream,
            position_x: 100.0,
            position_y: 200.0,
            created_at: Utc::now(),
        }
    }

    fn down(kind: PointerKind, target: PointerTarget, x: f64, y: f64) -> PointerEvent {
        PointerEvent::Down { kind, target, x, y }
    }

    #[test]
    fn test_rotation_is_stable_and_bounded() {
        for id in ["a", "b", "note-1", "0f8fad5b-d9cb-469f-a165-70867728950e"] {
            let r = rotation_for(id);
            assert!((-MAX_ROTATION_DEG..=MAX_ROTATION_DEG).contains(&r));
            assert_eq!(r, rotation_for(id));
        }
        assert_ne!(rotation_for("a"), rotation_for("b"));

        let view = NoteView::new(&note(""));
        assert_eq!(view.rotation(), rotation_for("note-1"));
    }

    #[test]
    fn test_drag_moves_and_persists_final_position() {
        let t0 = Instant::now();
        let mut view = NoteView::new(&note(""));

        view.handle(down(PointerKind::Fine, PointerTarget::Body, 110.0, 210.0), t0);
        assert_eq!(
            view.handle(PointerEvent::Move { x: 150.0, y: 260.0 }, t0),
            ViewAction::DragStarted { haptic: false }
        );
        assert_eq!(view.position(), (140.0, 250.0));

        assert_eq!(
            view.handle(PointerEvent::Move { x: 10.0, y: 0.0 }, t0),
            ViewAction::Moved
        );
        assert_eq!(view.position(), (0.0, -10.0));

        assert_eq!(
            view.handle(PointerEvent::Up, t0),
            ViewAction::Persist { x: 0.0, y: -10.0 }
        );
        assert!(!view.is_dragging());
    }

    #[test]
    fn test_second_drag_starts_from_dropped_position() {
        let t0 = Instant::now();
        let mut view = NoteView::new(&note(""));

        view.handle(down(PointerKind::Fine, PointerTarget::Body, 0.0, 0.0), t0);
        view.handle(PointerEvent::Move { x: 50.0, y: 0.0 }, t0);
        view.handle(PointerEvent::Up, t0);
        assert_eq!(view.position(), (150.0, 200.0));

        view.handle(down(PointerKind::Fine, PointerTarget::Body, 0.0, 0.0), t0);
        view.handle(PointerEvent::Move { x: 0.0, y: 50.0 }, t0);
        assert_eq!(
            view.handle(PointerEvent::Up, t0),
            ViewAction::Persist { x: 150.0, y: 250.0 }
        );
    }

    #[test]
    fn test_sync_does_not_interrupt_drag() {
        let t0 = Instant::now();
        let mut view = NoteView::new(&note(""));

        view.handle(down(PointerKind::Fine, PointerTarget::Body, 0.0, 0.0), t0);
        view.handle(PointerEvent::Move { x: 20.0, y: 20.0 }, t0);

        let mut moved_elsewhere = note("");
        moved_elsewhere.position_x = 999.0;
        view.sync(&moved_elsewhere);
        assert_eq!(view.position(), (120.0, 220.0));

        view.handle(PointerEvent::Up, t0);
        view.sync(&moved_elsewhere);
        assert_eq!(view.position(), (999.0, 200.0));
    }

    #[test]
    fn test_touch_hold_requests_haptic() {
        let t0 = Instant::now();
        let mut view = NoteView::new(&note(""));

        view.handle(down(PointerKind::Coarse, PointerTarget::Body, 5.0, 5.0), t0);
        assert_eq!(
            view.handle(PointerEvent::Tick, t0 + Duration::from_millis(520)),
            ViewAction::DragStarted { haptic: true }
        );
    }

    #[test]
    fn test_caption_only_when_author_present() {
        let t0 = Instant::now();

        let mut with_author = NoteView::new(&note("Lucía"));
        assert_eq!(
            with_author.handle(down(PointerKind::Fine, PointerTarget::AuthorCaption, 0.0, 0.0), t0),
            ViewAction::Expand
        );

        let mut anonymous = NoteView::new(&note(""));
        assert_eq!(
            anonymous.handle(down(PointerKind::Fine, PointerTarget::AuthorCaption, 0.0, 0.0), t0),
            ViewAction::None
        );
        assert_eq!(anonymous.handle(PointerEvent::Up, t0), ViewAction::Expand);
    }

    #[test]
    fn test_delete_control() {
        let t0 = Instant::now();
        let mut view = NoteView::new(&note(""));

        assert_eq!(
            view.handle(down(PointerKind::Fine, PointerTarget::DeleteControl, 0.0, 0.0), t0),
            ViewAction::Delete
        );
        assert_eq!(view.position(), (100.0, 200.0));
    }
}
