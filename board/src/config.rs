//! Application configuration
//!
//! Central location for the board's behavior constants, plus the
//! environment-driven selection of the note store and viewport.

use crate::error::{BoardError, Result};
use std::path::PathBuf;
use std::time::Duration;

// ===== Note Placement =====

/// Horizontal room reserved so a freshly placed note stays on screen
pub const PLACEMENT_WIDTH_MARGIN: f64 = 200.0;
/// Vertical room reserved below a freshly placed note
pub const PLACEMENT_HEIGHT_MARGIN: f64 = 250.0;
/// Offset keeping new notes clear of the fixed page header
pub const PLACEMENT_TOP_OFFSET: f64 = 100.0;

// ===== Gesture Thresholds =====

/// Movement in pixels that turns a mouse/pen press into a drag
pub const FINE_DRAG_THRESHOLD_PX: f64 = 3.0;

/// Movement in pixels that cancels a pending touch hold.
/// The touch is then treated as a scroll, neither tap nor drag.
pub const TOUCH_CANCEL_THRESHOLD_PX: f64 = 10.0;

/// Hold duration that turns a touch press into a drag
pub const LONG_PRESS: Duration = Duration::from_millis(500);

/// Rotation applied to a note is within +/- this many degrees
pub const MAX_ROTATION_DEG: f64 = 3.0;

// ===== Store =====

/// Table holding the notes in the hosted database
pub const NOTES_TABLE: &str = "sticky_notes";

/// How often the REST store polls for remote changes
pub const REST_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Capacity of a store's change notification channel
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Default viewport used when none is configured
pub const DEFAULT_VIEWPORT: Viewport = Viewport {
    width: 1280.0,
    height: 800.0,
};

/// Visible area the board places new notes into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Parse a `WIDTHxHEIGHT` string such as `1280x800`
    pub fn parse(s: &str) -> Result<Self> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| BoardError::Config(format!("Invalid viewport '{}'", s)))?;

        let width: f64 = w
            .trim()
            .parse()
            .map_err(|_| BoardError::Config(format!("Invalid viewport width '{}'", w)))?;
        let height: f64 = h
            .trim()
            .parse()
            .map_err(|_| BoardError::Config(format!("Invalid viewport height '{}'", h)))?;

        let valid = |v: f64| v.is_finite() && v >= 0.0;
        if !valid(width) || !valid(height) {
            return Err(BoardError::Config(format!(
                "Viewport dimensions must be finite and non-negative: {}",
                s
            )));
        }

        Ok(Self { width, height })
    }
}

impl Default for Viewport {
    fn default() -> Self {
        DEFAULT_VIEWPORT
    }
}

/// Which store backs the board
#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    /// Hosted realtime database reached over its REST interface
    Rest { base_url: String, api_key: String },
    /// Local SQLite database file
    Sqlite { path: PathBuf },
}

impl StoreConfig {
    /// Read the store selection from the environment.
    ///
    /// `NOTEBOARD_REST_URL` selects the REST store and then requires
    /// `NOTEBOARD_API_KEY`. Otherwise `NOTEBOARD_DB_PATH` (or
    /// `./noteboard.db`) selects a SQLite file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base_url) = non_empty("NOTEBOARD_REST_URL") {
            let api_key = non_empty("NOTEBOARD_API_KEY").ok_or_else(|| {
                BoardError::Config("NOTEBOARD_API_KEY is required with NOTEBOARD_REST_URL".into())
            })?;
            return Ok(StoreConfig::Rest {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
            });
        }

        let path = non_empty("NOTEBOARD_DB_PATH").unwrap_or_else(|| "noteboard.db".to_string());
        Ok(StoreConfig::Sqlite {
            path: PathBuf::from(path),
        })
    }
}

/// Read the viewport from `NOTEBOARD_VIEWPORT`, falling back to the default
pub fn viewport_from_env() -> Result<Viewport> {
    match std::env::var("NOTEBOARD_VIEWPORT") {
        Ok(value) if !value.trim().is_empty() => Viewport::parse(&value),
        _ => Ok(Viewport::default()),
    }
}
