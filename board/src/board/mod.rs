//! Board module
//!
//! The interactive part of the page:
//! - Controller owning the note list and its reconciliation
//! - Per-note views with drag and tap handling
//! - The composer form for new notes

pub mod composer;
pub mod controller;
pub mod gesture;
pub mod view;

pub use composer::Composer;
pub use controller::{initial_position, Board, BoardEvent, SyncState};
pub use gesture::{GestureClassifier, GestureState, PointerKind, PointerTarget};
pub use view::{rotation_for, NoteView, PointerEvent, ViewAction};
