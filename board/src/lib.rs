//! Noteboard library
//!
//! A sticky-notes board kept in sync with a realtime store. The store
//! is injected as a [`store::NoteStore`]; the board reconciles against
//! it and turns pointer input into note moves, deletes and expands.

pub mod board;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
