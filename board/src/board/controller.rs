//! Board state controller
//!
//! Owns the canonical list of notes and keeps it converging on the
//! store. Every change notification triggers a full refetch; local
//! deletes and moves are applied immediately and written to the store
//! in the background. Store failures are logged, never surfaced.

use super::view::{NoteView, PointerEvent, ViewAction};
use crate::config::{Viewport, PLACEMENT_HEIGHT_MARGIN, PLACEMENT_TOP_OFFSET, PLACEMENT_WIDTH_MARGIN};
use crate::error::{BoardError, Result};
use crate::model::{sort_for_board, NewNote, Note, NoteColor, PositionUpdate};
use crate::store::{NoteStore, Notification, Subscription};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Whether the local list reflects the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// A mutation is outstanding or a notification has not been reconciled
    Stale,
    Synced,
}

/// Something the board handled in its event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// A change notification was reconciled; `loaded` is false if the refetch failed
    Reconciled { loaded: bool },
    DeleteSettled { id: String, ok: bool },
    MoveSettled { id: String, ok: bool },
}

/// Completion of a background store write
#[derive(Debug)]
enum Settled {
    Delete { id: String, result: Result<()> },
    Move { id: String, result: Result<()> },
}

enum Wake {
    Settled(Settled),
    Notified(Option<Notification>),
}

/// The sticky-notes board
pub struct Board {
    store: Arc<dyn NoteStore>,
    viewport: Viewport,
    notes: Vec<Note>,
    views: HashMap<String, NoteView>,
    sync: SyncState,
    expanded: Option<String>,
    pending_deletes: HashSet<String>,
    subscription: Option<Subscription>,
    settled_tx: mpsc::UnboundedSender<Settled>,
    settled_rx: mpsc::UnboundedReceiver<Settled>,
    in_flight: usize,
}

impl Board {
    pub fn new(store: Arc<dyn NoteStore>, viewport: Viewport) -> Self {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        Self {
            store,
            viewport,
            notes: Vec::new(),
            views: HashMap::new(),
            sync: SyncState::Stale,
            expanded: None,
            pending_deletes: HashSet::new(),
            subscription: None,
            settled_tx,
            settled_rx,
            in_flight: 0,
        }
    }

    /// Notes in board order, oldest first
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn view(&self, id: &str) -> Option<&NoteView> {
        self.views.get(id)
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Store writes issued but not yet settled
    pub fn pending_writes(&self) -> usize {
        self.in_flight
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe to change notifications and load the board.
    /// Without a subscription the board still loads but will not follow
    /// remote changes.
    pub async fn mount(&mut self) {
        tracing::info!("Mounting board");

        match self.store.subscribe().await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => tracing::warn!("Failed to subscribe to note changes: {}", e),
        }

        self.load_all().await;
    }

    /// Release the change subscription
    pub fn unmount(&mut self) {
        if self.subscription.take().is_some() {
            tracing::info!("Board unmounted");
        }
    }

    /// Replace the local list with a fresh fetch. On failure the list is
    /// left as it was; returns whether the fetch succeeded.
    pub async fn load_all(&mut self) -> bool {
        match self.store.select_all().await {
            Ok(notes) => {
                self.replace_notes(notes);
                self.sync = SyncState::Synced;
                tracing::debug!("Board reconciled: {} notes", self.notes.len());
                true
            }
            Err(e) => {
                tracing::warn!("Failed to load notes: {}", e);
                false
            }
        }
    }

    /// React to a change notification with a full reconciliation.
    /// Notifications already queued are folded into the same refetch.
    pub async fn on_remote_change(&mut self, notification: Notification) -> bool {
        self.sync = SyncState::Stale;

        let folded = self.subscription.as_mut().map_or(0, |s| s.drain());
        match &notification {
            Notification::Change(event) => tracing::debug!(
                "Remote change {:?} on {:?}, {} more folded",
                event.kind,
                event.note_id,
                folded
            ),
            Notification::Missed(n) => tracing::debug!("Missed {} remote changes", n),
        }

        self.load_all().await
    }

    /// Add a note at a random spot in the viewport. Blank content is
    /// rejected before the store is contacted.
    pub async fn create(&mut self, content: &str, author_name: &str, color: NoteColor) -> Result<Note> {
        if content.trim().is_empty() {
            return Err(BoardError::Validation("Note content is empty".to_string()));
        }

        let (position_x, position_y) = initial_position(self.viewport, &mut rand::thread_rng());
        let req = NewNote {
            content: content.to_string(),
            author_name: author_name.to_string(),
            color,
            position_x,
            position_y,
        };

        let previous = self.sync;
        self.sync = SyncState::Stale;

        let note = match self.store.insert(req).await {
            Ok(note) => note,
            Err(e) => {
                tracing::error!("Failed to add note: {}", e);
                self.sync = previous;
                return Err(e);
            }
        };

        tracing::info!("Note added: {}", note.id);
        self.load_all().await;

        Ok(note)
    }

    /// Remove a note locally right away and delete it from the store in
    /// the background. Returns whether the note was on the board.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| n.id != id);
        if self.notes.len() == before {
            tracing::debug!("Ignoring delete of unknown note: {}", id);
            return false;
        }

        self.views.remove(id);
        if self.expanded.as_deref() == Some(id) {
            self.expanded = None;
        }

        self.pending_deletes.insert(id.to_string());
        self.sync = SyncState::Stale;

        let store = Arc::clone(&self.store);
        let id = id.to_string();
        self.spawn_write(async move {
            let result = store.delete(&id).await;
            Settled::Delete { id, result }
        });

        true
    }

    /// Record a note's new position and persist it in the background.
    /// Returns whether the note was on the board.
    pub fn update_position(&mut self, id: &str, x: f64, y: f64) -> bool {
        let Some(note) = self.notes.iter_mut().find(|n| n.id == id) else {
            tracing::debug!("Ignoring move of unknown note: {}", id);
            return false;
        };
        note.position_x = x;
        note.position_y = y;
        self.sync = SyncState::Stale;

        let store = Arc::clone(&self.store);
        let id = id.to_string();
        self.spawn_write(async move {
            let result = store.update_position(&id, PositionUpdate::to(x, y)).await;
            Settled::Move { id, result }
        });

        true
    }

    /// Open the full-size view of a note
    pub fn expand(&mut self, id: &str) -> bool {
        if self.note(id).is_none() {
            return false;
        }
        self.expanded = Some(id.to_string());
        true
    }

    pub fn close_expanded(&mut self) {
        self.expanded = None;
    }

    pub fn expanded_note(&self) -> Option<&Note> {
        self.expanded.as_deref().and_then(|id| self.note(id))
    }

    /// Deliver pointer input to a note and apply what it asks for
    pub fn pointer(&mut self, id: &str, event: PointerEvent, now: Instant) -> ViewAction {
        let Some(view) = self.views.get_mut(id) else {
            return ViewAction::None;
        };

        let action = view.handle(event, now);
        match action {
            ViewAction::Expand => {
                self.expand(id);
            }
            ViewAction::Delete => {
                self.delete(id);
            }
            ViewAction::Persist { x, y } => {
                self.update_position(id, x, y);
            }
            ViewAction::DragStarted { haptic } => {
                tracing::debug!("Dragging note {} (haptic: {})", id, haptic);
            }
            ViewAction::Moved | ViewAction::None => {}
        }

        action
    }

    /// Wait for and handle the next change notification or settled write.
    /// Returns `None` once there is nothing left to wait for.
    pub async fn next_event(&mut self) -> Option<BoardEvent> {
        loop {
            if self.subscription.is_none() && self.in_flight == 0 {
                return None;
            }

            let wake = tokio::select! {
                Some(settled) = self.settled_rx.recv() => Wake::Settled(settled),
                notification = next_notification(&mut self.subscription) => Wake::Notified(notification),
            };

            match wake {
                Wake::Settled(settled) => return Some(self.settle(settled).await),
                Wake::Notified(Some(notification)) => {
                    let loaded = self.on_remote_change(notification).await;
                    return Some(BoardEvent::Reconciled { loaded });
                }
                Wake::Notified(None) => {
                    tracing::warn!("Change stream closed");
                    self.subscription = None;
                }
            }
        }
    }

    /// Wait until every background write has settled
    pub async fn flush(&mut self) {
        while self.in_flight > 0 {
            match self.settled_rx.recv().await {
                Some(settled) => {
                    self.settle(settled).await;
                }
                None => break,
            }
        }
    }

    /// Drive the board until `shutdown` resolves or nothing is left to
    /// wait for, handing each event to `observe`. Unmounts on exit.
    pub async fn run<S, F>(&mut self, shutdown: S, mut observe: F)
    where
        S: Future<Output = ()>,
        F: FnMut(&Board, &BoardEvent),
    {
        tokio::pin!(shutdown);

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => None,
                event = self.next_event() => event,
            };

            let Some(event) = event else { break };
            observe(self, &event);
        }

        self.unmount();
    }

    fn spawn_write<F>(&mut self, write: F)
    where
        F: Future<Output = Settled> + Send + 'static,
    {
        let tx = self.settled_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            // The board may already be gone.
            let _ = tx.send(write.await);
        });
    }

    async fn settle(&mut self, settled: Settled) -> BoardEvent {
        self.in_flight = self.in_flight.saturating_sub(1);

        match settled {
            Settled::Delete { id, result } => {
                self.pending_deletes.remove(&id);
                match result {
                    Ok(()) | Err(BoardError::NoteNotFound(_)) => {
                        tracing::debug!("Delete settled: {}", id);
                        BoardEvent::DeleteSettled { id, ok: true }
                    }
                    Err(e) => {
                        tracing::error!("Failed to delete note {}: {}", id, e);
                        self.load_all().await;
                        BoardEvent::DeleteSettled { id, ok: false }
                    }
                }
            }
            Settled::Move { id, result } => match result {
                Ok(()) => {
                    tracing::debug!("Move settled: {}", id);
                    BoardEvent::MoveSettled { id, ok: true }
                }
                Err(e) => {
                    tracing::error!("Failed to save position of note {}: {}", id, e);
                    self.load_all().await;
                    BoardEvent::MoveSettled { id, ok: false }
                }
            },
        }
    }

    fn replace_notes(&mut self, mut notes: Vec<Note>) {
        notes.retain(|n| !self.pending_deletes.contains(&n.id));
        sort_for_board(&mut notes);

        self.views.retain(|id, _| notes.iter().any(|n| &n.id == id));
        for note in &notes {
            self.views
                .entry(note.id.clone())
                .and_modify(|view| view.sync(note))
                .or_insert_with(|| NoteView::new(note));
        }

        self.notes = notes;

        if self
            .expanded
            .as_deref()
            .is_some_and(|id| self.note(id).is_none())
        {
            self.expanded = None;
        }
    }
}

async fn next_notification(subscription: &mut Option<Subscription>) -> Option<Notification> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Random starting spot for a new note, below the page header and far
/// enough from the right and bottom edges to stay visible
pub fn initial_position<R: Rng + ?Sized>(viewport: Viewport, rng: &mut R) -> (f64, f64) {
    let width_room = (viewport.width - PLACEMENT_WIDTH_MARGIN).max(0.0);
    let height_room = (viewport.height - PLACEMENT_HEIGHT_MARGIN).max(0.0);

    let x = rng.gen::<f64>() * width_room;
    let y = rng.gen::<f64>() * height_room + PLACEMENT_TOP_OFFSET;

    (x.floor(), y.floor())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::gesture::{PointerKind, PointerTarget};
    use crate::model::{ChangeEvent, ChangeKind};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn seeded_note(id: &str, secs: i64, x: f64, y: f64) -> Note {
        Note {
            id: id.to_string(),
            content: format!("note {}", id),
            author_name: String::new(),
            color: NoteColor::Cream,
            position_x: x,
            position_y: y,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs),
        }
    }

    fn board_with(store: &MemoryStore) -> Board {
        Board::new(Arc::new(store.clone()), Viewport::new(1000.0, 700.0))
    }

    fn ids(board: &Board) -> Vec<&str> {
        board.notes().iter().map(|n| n.id.as_str()).collect()
    }

    fn down(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Down {
            kind: PointerKind::Fine,
            target: PointerTarget::Body,
            x,
            y,
        }
    }

    #[test]
    fn test_initial_position_bounds() {
        let viewport = Viewport::new(1000.0, 700.0);
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let (x, y) = initial_position(viewport, &mut rng);
            assert!((0.0..800.0).contains(&x), "x = {}", x);
            assert!((100.0..550.0).contains(&y), "y = {}", y);
            assert_eq!(x, x.floor());
        }
    }

    #[test]
    fn test_initial_position_tiny_viewport() {
        let (x, y) = initial_position(Viewport::new(150.0, 200.0), &mut rand::thread_rng());
        assert_eq!((x, y), (0.0, 100.0));
    }

    #[tokio::test]
    async fn test_load_all_orders_by_creation() {
        let store = MemoryStore::new();
        store.seed(seeded_note("b", 20, 0.0, 0.0)).await;
        store.seed(seeded_note("a", 10, 0.0, 0.0)).await;

        let mut board = board_with(&store);
        assert_eq!(board.sync_state(), SyncState::Stale);

        assert!(board.load_all().await);
        assert_eq!(ids(&board), vec!["a", "b"]);
        assert_eq!(board.sync_state(), SyncState::Synced);
    }

    #[tokio::test]
    async fn test_load_all_is_idempotent() {
        let store = MemoryStore::new();
        store.seed(seeded_note("a", 1, 5.0, 6.0)).await;
        store.seed(seeded_note("b", 2, 7.0, 8.0)).await;

        let mut board = board_with(&store);
        board.load_all().await;
        let first = board.notes().to_vec();
        board.load_all().await;

        assert_eq!(board.notes(), first.as_slice());
    }

    #[tokio::test]
    async fn test_load_failure_keeps_list() {
        let store = MemoryStore::new();
        store.seed(seeded_note("a", 1, 0.0, 0.0)).await;

        let mut board = board_with(&store);
        board.load_all().await;

        store.set_offline(true);
        assert!(!board.load_all().await);
        assert_eq!(ids(&board), vec!["a"]);
    }

    #[tokio::test]
    async fn test_create_blank_is_noop() {
        let store = MemoryStore::new();
        let mut board = board_with(&store);

        for content in ["", "   ", "\n\t"] {
            let result = board.create(content, "x", NoteColor::Rose).await;
            assert!(matches!(result, Err(BoardError::Validation(_))));
        }

        assert!(board.notes().is_empty());
        assert_eq!(store.insert_calls(), 0);
        assert_eq!(store.select_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let store = MemoryStore::new();
        let mut board = board_with(&store);

        let created = board.create("Hello", "", NoteColor::Cream).await.unwrap();
        board.load_all().await;

        assert_eq!(board.notes().len(), 1);
        let note = &board.notes()[0];
        assert_eq!(note.id, created.id);
        assert_eq!(note.content, "Hello");
        assert_eq!(note.author_name, "");
        assert_eq!(note.color.hex(), "#fef3c7");
        assert!((0.0..800.0).contains(&note.position_x));
        assert!((100.0..550.0).contains(&note.position_y));
    }

    #[tokio::test]
    async fn test_create_failure_leaves_board() {
        let store = MemoryStore::new();
        store.seed(seeded_note("a", 1, 0.0, 0.0)).await;
        let mut board = board_with(&store);
        board.load_all().await;

        store.set_reject_writes(true);
        let result = board.create("Hola", "Ana", NoteColor::Mint).await;

        assert!(result.unwrap_err().is_transport());
        assert_eq!(ids(&board), vec!["a"]);
        assert_eq!(board.sync_state(), SyncState::Synced);
    }

    #[tokio::test]
    async fn test_delete_is_immediate() {
        let store = MemoryStore::new();
        store.seed(seeded_note("a", 1, 0.0, 0.0)).await;
        let mut board = board_with(&store);
        board.load_all().await;

        assert!(board.delete("a"));
        assert!(board.notes().is_empty());
        assert!(board.view("a").is_none());
        assert_eq!(board.sync_state(), SyncState::Stale);
        // The store has not been asked yet.
        assert_eq!(store.delete_calls(), 0);
        assert_eq!(board.pending_writes(), 1);

        board.flush().await;
        assert_eq!(store.delete_calls(), 1);
        assert!(store.records().await.is_empty());
        assert_eq!(board.pending_writes(), 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_note_is_ignored() {
        let store = MemoryStore::new();
        store.seed(seeded_note("a", 1, 0.0, 0.0)).await;
        let mut board = board_with(&store);
        board.load_all().await;

        assert!(!board.delete("ghost"));
        assert_eq!(ids(&board), vec!["a"]);
        assert_eq!(board.pending_writes(), 0);
        assert_eq!(board.sync_state(), SyncState::Synced);

        board.flush().await;
        assert_eq!(store.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_pending_delete_not_resurrected() {
        let store = MemoryStore::new();
        store.seed(seeded_note("a", 1, 0.0, 0.0)).await;
        store.seed(seeded_note("b", 2, 0.0, 0.0)).await;
        let mut board = board_with(&store);
        board.load_all().await;

        board.delete("a");
        // Refetch races ahead of the delete.
        board.load_all().await;
        assert_eq!(ids(&board), vec!["b"]);

        board.flush().await;
        board.load_all().await;
        assert_eq!(ids(&board), vec!["b"]);
    }

    #[tokio::test]
    async fn test_failed_delete_comes_back() {
        let store = MemoryStore::new();
        store.seed(seeded_note("a", 1, 0.0, 0.0)).await;
        let mut board = board_with(&store);
        board.load_all().await;

        store.set_reject_writes(true);
        board.delete("a");
        assert!(board.notes().is_empty());

        board.flush().await;
        assert_eq!(ids(&board), vec!["a"]);
    }

    #[tokio::test]
    async fn test_drag_persists_once() {
        let store = MemoryStore::new();
        store.seed(seeded_note("a", 1, 10.0, 120.0)).await;
        let mut board = board_with(&store);
        board.load_all().await;

        let now = Instant::now();
        board.pointer("a", down(0.0, 0.0), now);
        board.pointer("a", PointerEvent::Move { x: 30.0, y: 40.0 }, now);
        board.pointer("a", PointerEvent::Move { x: 90.0, y: 60.0 }, now);
        assert_eq!(board.view("a").unwrap().position(), (100.0, 180.0));
        assert_eq!(board.pending_writes(), 0);

        let action = board.pointer("a", PointerEvent::Up, now);
        assert_eq!(action, ViewAction::Persist { x: 100.0, y: 180.0 });
        assert_eq!(board.note("a").unwrap().position(), (100.0, 180.0));

        board.flush().await;
        assert_eq!(
            store.position_updates().await,
            vec![("a".to_string(), PositionUpdate::to(100.0, 180.0))]
        );

        board.load_all().await;
        assert_eq!(board.note("a").unwrap().position(), (100.0, 180.0));
        assert_eq!(board.view("a").unwrap().position(), (100.0, 180.0));
    }

    #[tokio::test]
    async fn test_tap_expands_without_moving() {
        let store = MemoryStore::new();
        store.seed(seeded_note("a", 1, 10.0, 120.0)).await;
        let mut board = board_with(&store);
        board.load_all().await;

        let now = Instant::now();
        board.pointer("a", down(50.0, 50.0), now);
        board.pointer("a", PointerEvent::Move { x: 51.0, y: 51.0 }, now);
        let action = board.pointer("a", PointerEvent::Up, now);

        assert_eq!(action, ViewAction::Expand);
        assert_eq!(board.expanded_note().map(|n| n.id.as_str()), Some("a"));
        board.flush().await;
        assert_eq!(store.update_calls(), 0);

        board.close_expanded();
        assert!(board.expanded_note().is_none());
    }

    #[tokio::test]
    async fn test_delete_control_closes_expanded() {
        let store = MemoryStore::new();
        store.seed(seeded_note("a", 1, 0.0, 0.0)).await;
        let mut board = board_with(&store);
        board.load_all().await;
        board.expand("a");

        let action = board.pointer(
            "a",
            PointerEvent::Down {
                kind: PointerKind::Fine,
                target: PointerTarget::DeleteControl,
                x: 0.0,
                y: 0.0,
            },
            Instant::now(),
        );

        assert_eq!(action, ViewAction::Delete);
        assert!(board.notes().is_empty());
        assert!(board.expanded_note().is_none());
        board.flush().await;
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_change_reconciles() {
        let store = MemoryStore::new();
        let mut board = board_with(&store);
        board.mount().await;
        assert!(board.is_mounted());
        let loads = store.select_calls();

        // Another client adds two notes in a burst.
        for content in ["uno", "dos"] {
            store
                .insert(NewNote {
                    content: content.to_string(),
                    author_name: String::new(),
                    color: NoteColor::Amber,
                    position_x: 0.0,
                    position_y: 100.0,
                })
                .await
                .unwrap();
        }

        let event = board.next_event().await;
        assert_eq!(event, Some(BoardEvent::Reconciled { loaded: true }));
        assert_eq!(store.select_calls(), loads + 1);
        assert_eq!(board.notes().len(), 2);
        assert_eq!(board.sync_state(), SyncState::Synced);
    }

    #[tokio::test]
    async fn test_on_remote_change_refetches() {
        let store = MemoryStore::new();
        let mut board = board_with(&store);
        board.load_all().await;
        store.seed(seeded_note("late", 1, 0.0, 0.0)).await;

        let loaded = board
            .on_remote_change(Notification::Change(ChangeEvent::new(ChangeKind::Insert, "late")))
            .await;

        assert!(loaded);
        assert_eq!(ids(&board), vec!["late"]);
    }

    #[tokio::test]
    async fn test_unmount_releases_subscription() {
        let store = MemoryStore::new();
        let mut board = board_with(&store);

        board.mount().await;
        assert_eq!(store.subscriber_count(), 1);

        board.unmount();
        assert_eq!(store.subscriber_count(), 0);
        assert_eq!(board.next_event().await, None);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = MemoryStore::new();
        let mut board = board_with(&store);
        board.mount().await;

        let mut seen = 0;
        board.run(async {}, |_, _| seen += 1).await;

        assert_eq!(seen, 0);
        assert!(!board.is_mounted());
        assert_eq!(store.subscriber_count(), 0);
    }
}
