//! Store module
//!
//! The board consumes its notes through the [`NoteStore`] capability:
//! - CRUD on note records
//! - A change notification stream, released on drop
//!
//! Adapters live in the submodules: an in-process store, a SQLite
//! store and a REST store for the hosted realtime database.

pub mod memory;
pub mod rest;
pub mod sqlite;

pub use memory::MemoryStore;
pub use rest::RestStore;
pub use sqlite::SqliteStore;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::model::{ChangeEvent, NewNote, Note, PositionUpdate};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;

/// CRUD + subscribe access to the notes collection
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// All notes, oldest first
    async fn select_all(&self) -> Result<Vec<Note>>;

    /// Insert a note; the store assigns id and created_at
    async fn insert(&self, note: NewNote) -> Result<Note>;

    /// Update position fields only
    async fn update_position(&self, id: &str, update: PositionUpdate) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Start receiving change notifications. Dropping the returned
    /// subscription unsubscribes.
    async fn subscribe(&self) -> Result<Subscription>;
}

/// What a subscriber observed on its change stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Change(ChangeEvent),
    /// Notifications were dropped because the subscriber fell behind
    Missed(u64),
}

/// A live change notification stream
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    feeder: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { rx, feeder: None }
    }

    /// Subscription backed by a task that feeds the channel; the task
    /// is aborted when the subscription goes away.
    pub(crate) fn with_feeder(rx: broadcast::Receiver<ChangeEvent>, feeder: JoinHandle<()>) -> Self {
        Self {
            rx,
            feeder: Some(feeder),
        }
    }

    /// Wait for the next notification. `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        match self.rx.recv().await {
            Ok(event) => Some(Notification::Change(event)),
            Err(RecvError::Lagged(n)) => Some(Notification::Missed(n)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Discard notifications already queued, returning how many there were
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        loop {
            match self.rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => drained += 1,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return drained,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        tracing::debug!("Change subscription released");
    }
}

/// Open the store selected by configuration
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn NoteStore>> {
    match config {
        StoreConfig::Rest { base_url, api_key } => {
            tracing::info!("Using REST note store at {}", base_url);
            Ok(Arc::new(RestStore::new(base_url, api_key)?))
        }
        StoreConfig::Sqlite { path } => {
            tracing::info!("Using SQLite note store at {:?}", path);
            Ok(Arc::new(SqliteStore::open(path).await?))
        }
    }
}
