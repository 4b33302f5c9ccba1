//! Composer form
//!
//! Collects a new note's text, author and color and hands them to the
//! board. A failed submission keeps everything typed so far.

use super::controller::Board;
use crate::model::{Note, NoteColor};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composer {
    pub open: bool,
    pub content: String,
    pub author_name: String,
    pub color: NoteColor,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    /// Close without clearing
    pub fn cancel(&mut self) {
        self.open = false;
    }

    /// Submit to the board. On success the form is cleared and closed;
    /// on any failure it is left untouched for a retry.
    pub async fn submit(&mut self, board: &mut Board) -> Option<Note> {
        match board
            .create(&self.content, &self.author_name, self.color)
            .await
        {
            Ok(note) => {
                self.content.clear();
                self.author_name.clear();
                self.open = false;
                Some(note)
            }
            Err(e) => {
                tracing::debug!("Note not submitted: {}", e);
                None
            }
        }
    }
}
