//! Note models
//!
//! Rust structs representing the board's single persisted entity
//! and the requests and notifications exchanged with a store.

use crate::error::{BoardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the six paper colors a note can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NoteColor {
    #[default]
    Cream,
    Rose,
    Lavender,
    Mint,
    Amber,
    Pink,
}

impl NoteColor {
    /// The full palette, in the order the composer offers it
    pub const PALETTE: [NoteColor; 6] = [
        NoteColor::Cream,
        NoteColor::Rose,
        NoteColor::Lavender,
        NoteColor::Mint,
        NoteColor::Amber,
        NoteColor::Pink,
    ];

    pub fn hex(self) -> &'static str {
        match self {
            NoteColor::Cream => "#fef3c7",
            NoteColor::Rose => "#fecaca",
            NoteColor::Lavender => "#ddd6fe",
            NoteColor::Mint => "#bbf7d0",
            NoteColor::Amber => "#fde68a",
            NoteColor::Pink => "#fbcfe8",
        }
    }
}

impl fmt::Display for NoteColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

impl FromStr for NoteColor {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        NoteColor::PALETTE
            .into_iter()
            .find(|color| color.hex().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BoardError::Validation(format!("Color not in palette: {}", s)))
    }
}

impl TryFrom<String> for NoteColor {
    type Error = BoardError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<NoteColor> for String {
    fn from(color: NoteColor) -> Self {
        color.hex().to_string()
    }
}

/// A sticky note on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub author_name: String,
    pub color: NoteColor,
    pub position_x: f64,
    pub position_y: f64,
    pub created_at: DateTime<Utc>,
}

impl Note {
    pub fn position(&self) -> (f64, f64) {
        (self.position_x, self.position_y)
    }

    /// Whether the author caption is shown
    pub fn has_author(&self) -> bool {
        !self.author_name.is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Create note request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub content: String,
    pub author_name: String,
    pub color: NoteColor,
    pub position_x: f64,
    pub position_y: f64,
}

/// Position update request; absent fields are left untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_y: Option<f64>,
}

impl PositionUpdate {
    pub fn to(x: f64, y: f64) -> Self {
        Self {
            position_x: Some(x),
            position_y: Some(y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position_x.is_none() && self.position_y.is_none()
    }
}

/// Kind of mutation a store reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Change notification emitted by a store after a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Affected note, when the store knows it
    pub note_id: Option<String>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, note_id: impl Into<String>) -> Self {
        Self {
            kind,
            note_id: Some(note_id.into()),
        }
    }
}

/// Sort notes into board order: oldest first, ties broken by id
pub fn sort_for_board(notes: &mut [Note]) {
    notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
