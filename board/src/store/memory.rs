//! In-process note store
//!
//! Keeps notes in memory and broadcasts a change event per mutation.
//! Counts calls and can be told to fail, which is what the board's
//! tests lean on.

use super::{NoteStore, Subscription};
use crate::config::CHANGE_CHANNEL_CAPACITY;
use crate::error::{BoardError, Result};
use crate::model::{sort_for_board, ChangeEvent, ChangeKind, NewNote, Note, PositionUpdate};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Number of calls made against each store operation
#[derive(Debug, Default)]
struct CallCounts {
    select: AtomicUsize,
    insert: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
}

/// Store holding notes in process memory
#[derive(Clone)]
pub struct MemoryStore {
    notes: Arc<RwLock<Vec<Note>>>,
    changes: broadcast::Sender<ChangeEvent>,
    calls: Arc<CallCounts>,
    offline: Arc<AtomicBool>,
    reject_writes: Arc<AtomicBool>,
    position_updates: Arc<RwLock<Vec<(String, PositionUpdate)>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            notes: Arc::new(RwLock::new(Vec::new())),
            changes,
            calls: Arc::new(CallCounts::default()),
            offline: Arc::new(AtomicBool::new(false)),
            reject_writes: Arc::new(AtomicBool::new(false)),
            position_updates: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Put a note in place without notifying subscribers.
    /// Records keep their insertion order, not board order.
    pub async fn seed(&self, note: Note) {
        self.notes.write().await.push(note);
    }

    /// Make every subsequent call fail with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make inserts, updates and deletes fail while reads keep working
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn select_calls(&self) -> usize {
        self.calls.select.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.calls.insert.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.calls.update.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst)
    }

    /// Every position update received, in order
    pub async fn position_updates(&self) -> Vec<(String, PositionUpdate)> {
        self.position_updates.read().await.clone()
    }

    /// Raw records currently held, in storage order
    pub async fn records(&self) -> Vec<Note> {
        self.notes.read().await.clone()
    }

    /// Number of live change subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BoardError::Transport("store unreachable".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_online()?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(BoardError::Transport("write rejected".to_string()));
        }
        Ok(())
    }

    fn notify(&self, event: ChangeEvent) {
        // No subscribers is not an error.
        let _ = self.changes.send(event);
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn select_all(&self) -> Result<Vec<Note>> {
        self.calls.select.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let mut notes = self.notes.read().await.clone();
        sort_for_board(&mut notes);
        Ok(notes)
    }

    async fn insert(&self, req: NewNote) -> Result<Note> {
        self.calls.insert.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let note = Note {
            id: Uuid::new_v4().to_string(),
            content: req.content,
            author_name: req.author_name,
            color: req.color,
            position_x: req.position_x,
            position_y: req.position_y,
            created_at: Utc::now(),
        };

        self.notes.write().await.push(note.clone());
        tracing::debug!("Inserted note: {}", note.id);
        self.notify(ChangeEvent::new(ChangeKind::Insert, &note.id));

        Ok(note)
    }

    async fn update_position(&self, id: &str, update: PositionUpdate) -> Result<()> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        {
            let mut notes = self.notes.write().await;
            let note = notes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| BoardError::NoteNotFound(id.to_string()))?;

            if let Some(x) = update.position_x {
                note.position_x = x;
            }
            if let Some(y) = update.position_y {
                note.position_y = y;
            }
        }

        self.position_updates
            .write()
            .await
            .push((id.to_string(), update));
        self.notify(ChangeEvent::new(ChangeKind::Update, id));

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let mut notes = self.notes.write().await;
        let before = notes.len();
        notes.retain(|n| n.id != id);
        if notes.len() == before {
            return Err(BoardError::NoteNotFound(id.to_string()));
        }
        drop(notes);

        tracing::debug!("Deleted note: {}", id);
        self.notify(ChangeEvent::new(ChangeKind::Delete, id));

        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        self.check_online()?;
        Ok(Subscription::new(self.changes.subscribe()))
    }
}
