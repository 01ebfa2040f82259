//! Board session controller.
//!
//! A [`BoardSession`] exists only once the board snapshot has been fetched:
//! joining replays the stroke log in order onto a blank surface, loads the
//! notes, then opens the relay channel. From then on local actions and relay
//! events both mutate the session, all from one event loop. Leaving closes
//! the channel; the session ignores further mutations.

use crate::color::Rgb;
use crate::config::ClientConfig;
use crate::debounce::Debouncer;
use crate::history::{History, PendingRestore};
use crate::note::{Note, NoteGesture, NoteId, NotePatch, NoteSet};
use crate::protocol::BoardEvent;
use crate::store::{BoardSnapshot, BoardStore, StoreError};
use crate::stroke::{MAX_LINE_WIDTH, MIN_LINE_WIDTH, Stroke, StrokeBuilder, Tool};
use crate::surface::{Surface, SurfaceError, SurfaceResult};
use crate::sync::{ConnectionState, NativeTransport, SyncChannel, Transport, connection_url};
use kurbo::Point;
use std::collections::VecDeque;
use std::time::Instant;
use thiserror::Error;

/// Errors that keep a session from going live.
#[derive(Debug, Error)]
pub enum JoinError {
    /// The credential was rejected; the caller should log the user out.
    #[error("Not authorized")]
    Unauthorized,
    #[error("Failed to load board: {0}")]
    Store(StoreError),
    #[error("Failed to capture canvas: {0}")]
    Surface(#[from] SurfaceError),
}

impl From<StoreError> for JoinError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthorized => JoinError::Unauthorized,
            other => JoinError::Store(other),
        }
    }
}

/// Session lifecycle once joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Live,
    Closed,
}

/// Current drawing settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brush {
    pub tool: Tool,
    pub color: Rgb,
    line_width: f64,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            tool: Tool::Pen,
            color: Rgb::BLACK,
            line_width: 4.0,
        }
    }
}

impl Brush {
    pub fn line_width(&self) -> f64 {
        self.line_width
    }

    /// Set the width, held within the brush's range.
    pub fn set_line_width(&mut self, width: f64) {
        self.line_width = width.clamp(MIN_LINE_WIDTH, MAX_LINE_WIDTH);
    }
}

/// Session over the native WebSocket transport.
pub type NativeBoardSession = BoardSession<NativeTransport>;

/// One client's view of one board.
pub struct BoardSession<T: Transport> {
    slug: String,
    title: String,
    author: String,
    phase: SessionPhase,
    surface: Surface,
    history: History,
    /// Restores waiting for their snapshot to decode, oldest first.
    restores: VecDeque<PendingRestore>,
    notes: NoteSet,
    brush: Brush,
    active_stroke: Option<StrokeBuilder>,
    gesture: Option<NoteGesture>,
    text_edits: Debouncer<NoteId, String>,
    channel: SyncChannel<T>,
}

impl<T: Transport> BoardSession<T> {
    /// Fetch the board from `store`, rebuild it, and connect to the relay.
    ///
    /// Nothing is drawn until the snapshot has arrived. A failure to fetch
    /// the project list only leaves the title empty.
    pub async fn join<S: BoardStore + ?Sized>(
        store: &S,
        slug: &str,
        token: &str,
        config: &ClientConfig,
        transport: T,
    ) -> Result<Self, JoinError> {
        log::info!("Joining board {}", slug);
        let snapshot = store.board_state(slug).await?;

        let title = match store.projects().await {
            Ok(projects) => projects
                .into_iter()
                .find(|p| p.slug == slug)
                .map(|p| p.name)
                .unwrap_or_default(),
            Err(e) => {
                log::warn!("Could not resolve board title: {}", e);
                String::new()
            }
        };

        let mut session = Self::from_snapshot(slug, title, snapshot, config, transport)?;
        session.connect(&config.ws_base, token);
        Ok(session)
    }

    /// Rebuild a board from its snapshot without connecting.
    pub fn from_snapshot(
        slug: &str,
        title: String,
        snapshot: BoardSnapshot,
        config: &ClientConfig,
        transport: T,
    ) -> Result<Self, JoinError> {
        let mut surface = Surface::new(config.canvas_width, config.canvas_height, config.background);
        for stroke in &snapshot.events {
            surface.replay(stroke);
        }
        let history = History::new(surface.snapshot()?);

        log::info!(
            "Board {} loaded: {} strokes, {} notes",
            slug,
            snapshot.events.len(),
            snapshot.notes.len()
        );

        Ok(Self {
            slug: slug.to_string(),
            title,
            author: config.author(),
            phase: SessionPhase::Live,
            surface,
            history,
            restores: VecDeque::new(),
            notes: NoteSet::from_notes(snapshot.notes),
            brush: Brush::default(),
            active_stroke: None,
            gesture: None,
            text_edits: Debouncer::new(config.text_debounce()),
            channel: SyncChannel::new(transport),
        })
    }

    /// Open the relay channel. Failures leave the session live but offline.
    pub fn connect(&mut self, ws_base: &str, token: &str) {
        let opened = connection_url(ws_base, &self.slug, token).and_then(|url| self.channel.open(url));
        if let Err(e) = opened {
            log::warn!("Board {} is offline: {}", self.slug, e);
        }
    }

    /// Close the channel and stop accepting changes. Pending text edits are dropped.
    pub fn leave(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        log::info!("Leaving board {}", self.slug);
        self.text_edits.cancel_all();
        self.restores.clear();
        self.active_stroke = None;
        self.gesture = None;
        self.channel.close();
        self.phase = SessionPhase::Closed;
    }

    fn ensure_live(&self, action: &str) -> bool {
        if self.phase != SessionPhase::Live {
            log::debug!("Ignoring {} on closed board {}", action, self.slug);
            return false;
        }
        true
    }

    // --- Event loop ---

    /// Run everything that is due: relay traffic, text edit timers, then
    /// snapshot restores.
    pub fn pump(&mut self, now: Instant) {
        self.process_incoming();
        self.flush_text_edits(now);
        self.complete_restores();
    }

    /// Apply everything the relay has delivered. Returns the number of events applied.
    pub fn process_incoming(&mut self) -> usize {
        if !self.ensure_live("incoming events") {
            return 0;
        }
        let events = self.channel.poll();
        let count = events.len();
        for event in events {
            self.apply_remote(event);
        }
        count
    }

    /// Apply one event from a peer. Never re-broadcast.
    pub fn apply_remote(&mut self, event: BoardEvent) {
        if !self.ensure_live("remote event") {
            return;
        }
        log::debug!("Remote {}", event.kind());
        match event {
            BoardEvent::Draw(stroke) => self.surface.replay(&stroke),
            BoardEvent::NoteCreated(note) => {
                self.notes.upsert(note);
            }
            BoardEvent::NoteUpdated(note) => {
                // New text from a peer replaces a local draft; moves and
                // resizes leave it pending.
                let text_changed = self.notes.get(note.id).is_none_or(|local| local.text != note.text);
                if text_changed {
                    self.text_edits.cancel(&note.id);
                }
                self.notes.upsert(note);
            }
            BoardEvent::NoteDeleted(id) => self.forget_note(id),
        }
    }

    // --- Drawing ---

    /// Pointer down on the canvas.
    pub fn begin_stroke(&mut self, point: Point) {
        if !self.ensure_live("stroke") {
            return;
        }
        self.active_stroke = Some(StrokeBuilder::begin(
            self.brush.tool,
            self.brush.color,
            self.brush.line_width,
            point,
        ));
    }

    /// Pointer move while drawing; paints the new segment immediately.
    pub fn extend_stroke(&mut self, point: Point) {
        let background = self.surface.background();
        let Some(builder) = self.active_stroke.as_mut() else {
            return;
        };
        if let Some(segment) = builder.push(point) {
            let color = builder.paint_color(background);
            let width = builder.line_width();
            self.surface.paint_segment(segment, color, width);
        }
    }

    /// Pointer release: records a snapshot, and sends the stroke if it has
    /// a visible segment. Returns the finished stroke.
    pub fn end_stroke(&mut self) -> SurfaceResult<Option<Stroke>> {
        let Some(builder) = self.active_stroke.take() else {
            return Ok(None);
        };
        let stroke = builder.finish(self.author.clone());

        self.history.record(self.surface.snapshot()?);
        if stroke.is_broadcastable() {
            self.channel.send(&BoardEvent::Draw(stroke.clone()));
        }
        Ok(Some(stroke))
    }

    /// Revert this client's last local change. Returns whether a restore was queued.
    pub fn undo(&mut self) -> bool {
        if !self.ensure_live("undo") {
            return false;
        }
        match self.history.undo() {
            Some(restore) => {
                self.restores.push_back(restore);
                true
            }
            None => false,
        }
    }

    /// Re-apply the last undone change. Returns whether a restore was queued.
    pub fn redo(&mut self) -> bool {
        if !self.ensure_live("redo") {
            return false;
        }
        match self.history.redo() {
            Some(restore) => {
                self.restores.push_back(restore);
                true
            }
            None => false,
        }
    }

    /// Decode queued restores and apply them in request order.
    ///
    /// Restores made stale by a newer snapshot are discarded; a snapshot
    /// that fails to decode leaves the surface as it was.
    pub fn complete_restores(&mut self) -> usize {
        let mut applied = 0;
        while let Some(restore) = self.restores.pop_front() {
            if !self.history.is_current(&restore) {
                log::debug!("Discarding stale restore");
                continue;
            }
            match restore.decode() {
                Ok(image) => {
                    self.surface.load(image);
                    applied += 1;
                }
                Err(e) => log::warn!("Snapshot restore failed: {}", e),
            }
        }
        applied
    }

    pub fn has_pending_restores(&self) -> bool {
        !self.restores.is_empty()
    }

    /// Wipe the surface and notes locally and restart history from the blank surface.
    pub fn clear(&mut self) -> SurfaceResult<()> {
        if !self.ensure_live("clear") {
            return Ok(());
        }
        self.active_stroke = None;
        self.gesture = None;
        self.restores.clear();
        self.text_edits.cancel_all();
        self.notes.clear();
        self.surface.clear();
        self.history.reset(self.surface.snapshot()?);
        Ok(())
    }

    // --- Notes ---

    /// Create a default note and announce it. Returns its id.
    pub fn add_note(&mut self) -> Option<NoteId> {
        if !self.ensure_live("add note") {
            return None;
        }
        let note = Note::create();
        let id = note.id;
        self.notes.upsert(note.clone());
        self.channel.send(&BoardEvent::NoteCreated(note));
        Some(id)
    }

    /// Merge `patch` onto the local copy and send the whole resulting note.
    pub fn update_note(&mut self, id: NoteId, patch: &NotePatch) -> Option<&Note> {
        if !self.ensure_live("update note") {
            return None;
        }
        let updated = self.notes.get(id)?.merged(patch);
        self.notes.upsert(updated.clone());
        self.channel.send(&BoardEvent::NoteUpdated(updated));
        self.notes.get(id)
    }

    /// Remove a note and announce the removal.
    pub fn delete_note(&mut self, id: NoteId) -> bool {
        if !self.ensure_live("delete note") || !self.notes.contains(id) {
            return false;
        }
        self.forget_note(id);
        self.channel.send(&BoardEvent::NoteDeleted(id));
        true
    }

    fn forget_note(&mut self, id: NoteId) {
        self.notes.remove(id);
        self.text_edits.cancel(&id);
        if self.gesture.is_some_and(|g| g.note_id() == id) {
            self.gesture = None;
        }
    }

    /// Start dragging a note grabbed at `pointer`.
    pub fn begin_drag(&mut self, id: NoteId, pointer: Point) -> bool {
        self.begin_gesture(id, |note| NoteGesture::drag(note, pointer))
    }

    /// Start resizing a note from its corner handle.
    pub fn begin_resize(&mut self, id: NoteId) -> bool {
        self.begin_gesture(id, NoteGesture::resize)
    }

    fn begin_gesture(&mut self, id: NoteId, start: impl FnOnce(&Note) -> NoteGesture) -> bool {
        if !self.ensure_live("note gesture") {
            return false;
        }
        match self.notes.get(id) {
            Some(note) => {
                self.gesture = Some(start(note));
                true
            }
            None => false,
        }
    }

    /// Pointer move during a drag or resize: every move is sent as a full update.
    pub fn gesture_move(&mut self, pointer: Point) -> Option<&Note> {
        let gesture = self.gesture?;
        let patch = gesture.patch_for(self.notes.get(gesture.note_id())?, pointer);
        self.update_note(gesture.note_id(), &patch)
    }

    /// Pointer release ends the gesture.
    pub fn end_gesture(&mut self) {
        self.gesture = None;
    }

    /// Buffer a text edit; it is sent after the quiet period with no further edits.
    pub fn edit_note_text(&mut self, id: NoteId, text: impl Into<String>, now: Instant) -> bool {
        if !self.ensure_live("edit note") || !self.notes.contains(id) {
            return false;
        }
        self.text_edits.schedule(id, text.into(), now);
        true
    }

    /// Text shown in a note's editor: the local draft if any, else the note's text.
    pub fn note_text(&self, id: NoteId) -> Option<&str> {
        self.text_edits
            .pending(&id)
            .map(String::as_str)
            .or_else(|| self.notes.get(id).map(|n| n.text.as_str()))
    }

    /// Send text edits whose quiet period has elapsed. Returns the number sent.
    pub fn flush_text_edits(&mut self, now: Instant) -> usize {
        if !self.ensure_live("text flush") {
            return 0;
        }
        let mut sent = 0;
        for (id, text) in self.text_edits.fire_due(now) {
            let unchanged = self.notes.get(id).is_none_or(|n| n.text == text);
            if unchanged {
                continue;
            }
            if self.update_note(id, &NotePatch::text(text)).is_some() {
                sent += 1;
            }
        }
        sent
    }

    /// When the next text edit falls due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.text_edits.next_deadline()
    }

    // --- Export ---

    /// The surface with notes drawn on top, as PNG bytes.
    pub fn export_png(&self) -> SurfaceResult<Vec<u8>> {
        let notes: Vec<&Note> = self.notes.iter().collect();
        self.surface.export_png(&notes)
    }

    /// Suggested file name for [`Self::export_png`].
    pub fn export_file_name(&self) -> String {
        format!("board-{}.png", self.slug)
    }

    // --- Accessors ---

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase == SessionPhase::Live
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn notes(&self) -> &NoteSet {
        &self.notes
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn brush_mut(&mut self) -> &mut Brush {
        &mut self.brush
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn channel(&self) -> &SyncChannel<T> {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::MIN_NOTE_SIZE;
    use crate::store::{BoxFuture, MemoryBoardStore, Project, StoreResult, block_on};
    use crate::sync::TransportEvent;
    use crate::sync::mock::{MockTransport, MockWire};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;
    use uuid::Uuid;

    const SLUG: &str = "team-board";

    fn config() -> ClientConfig {
        ClientConfig {
            canvas_width: 96,
            canvas_height: 64,
            display_name: Some("tester".to_string()),
            ..ClientConfig::default()
        }
    }

    fn stroke(color: Rgb, points: &[(f64, f64)]) -> Stroke {
        let points = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
        Stroke::new(Tool::Pen, color, 4.0, points, "peer")
    }

    fn note(x: f64, y: f64, text: &str) -> Note {
        Note {
            id: Uuid::new_v4(),
            x,
            y,
            width: 230.0,
            height: 150.0,
            text: text.to_string(),
            color: Rgb::new(0xff, 0xf4, 0x75),
        }
    }

    fn store_with(snapshot: BoardSnapshot) -> MemoryBoardStore {
        let store = MemoryBoardStore::new();
        let project = Project {
            slug: SLUG.to_string(),
            name: "Team Board".to_string(),
        };
        store.insert_board(project, snapshot).unwrap();
        store
    }

    /// Joined session with an open channel.
    fn live_session(snapshot: BoardSnapshot) -> (BoardSession<MockTransport>, Rc<RefCell<MockWire>>) {
        let store = store_with(snapshot);
        let (transport, wire) = MockTransport::new();
        let mut session = block_on(BoardSession::join(&store, SLUG, "tok", &config(), transport)).unwrap();
        wire.borrow_mut().inbound.push_back(TransportEvent::Connected);
        session.process_incoming();
        (session, wire)
    }

    fn draw(session: &mut BoardSession<MockTransport>, points: &[(f64, f64)]) -> Option<Stroke> {
        let mut points = points.iter().map(|&(x, y)| Point::new(x, y));
        session.begin_stroke(points.next().unwrap());
        for p in points {
            session.extend_stroke(p);
        }
        session.end_stroke().unwrap()
    }

    fn deliver(wire: &Rc<RefCell<MockWire>>, event: BoardEvent) {
        let json = event.encode().unwrap();
        wire.borrow_mut().inbound.push_back(TransportEvent::Message(json));
    }

    #[test]
    fn test_join_replays_snapshot_in_order() {
        let a = stroke(Rgb::new(255, 0, 0), &[(5.0, 5.0), (60.0, 40.0)]);
        let b = stroke(Rgb::new(0, 0, 255), &[(5.0, 40.0), (60.0, 5.0)]);
        let x = note(10.0, 10.0, "X");
        let (session, wire) = live_session(BoardSnapshot {
            events: vec![a.clone(), b.clone()],
            notes: vec![x.clone()],
        });

        let mut expected = Surface::new(96, 64, Rgb::WHITE);
        expected.replay(&a);
        expected.replay(&b);
        assert_eq!(session.surface(), &expected);
        assert_eq!(session.notes(), &NoteSet::from_notes([x]));

        // Order matters where the strokes cross.
        let mut reversed = Surface::new(96, 64, Rgb::WHITE);
        reversed.replay(&b);
        reversed.replay(&a);
        assert_ne!(session.surface(), &reversed);

        assert_eq!(session.title(), "Team Board");
        assert_eq!(
            wire.borrow().url.as_deref(),
            Some("ws://127.0.0.1:8000/ws/board/team-board/?token=tok")
        );
        assert_eq!(session.history().undo_depth(), 1);
    }

    /// Serves one board but rejects the project list.
    struct NoProjectsStore(BoardSnapshot);

    impl BoardStore for NoProjectsStore {
        fn board_state(&self, _slug: &str) -> BoxFuture<'_, StoreResult<BoardSnapshot>> {
            Box::pin(async move { Ok(self.0.clone()) })
        }

        fn projects(&self) -> BoxFuture<'_, StoreResult<Vec<Project>>> {
            Box::pin(async { Err(StoreError::Unauthorized) })
        }
    }

    #[test]
    fn test_title_lookup_failure_not_fatal() {
        let n = note(0.0, 0.0, "kept");
        let store = NoProjectsStore(BoardSnapshot {
            events: vec![],
            notes: vec![n.clone()],
        });
        let (transport, wire) = MockTransport::new();
        let session = block_on(BoardSession::join(&store, SLUG, "tok", &config(), transport)).unwrap();

        assert_eq!(session.title(), "");
        assert_eq!(session.notes().get(n.id), Some(&n));
        assert!(wire.borrow().url.is_some());
    }

    #[test]
    fn test_join_unauthorized() {
        let store = MemoryBoardStore::unauthorized();
        let (transport, wire) = MockTransport::new();
        let result = block_on(BoardSession::join(&store, SLUG, "bad", &config(), transport));
        assert!(matches!(result, Err(JoinError::Unauthorized)));
        assert!(wire.borrow().url.is_none());
    }

    #[test]
    fn test_join_missing_board_fails() {
        let store = MemoryBoardStore::new();
        let (transport, _wire) = MockTransport::new();
        let result = block_on(BoardSession::join(&store, "nope", "tok", &config(), transport));
        assert!(matches!(result, Err(JoinError::Store(StoreError::NotFound(_)))));
    }

    #[test]
    fn test_local_stroke_broadcasts_and_records() {
        let (mut session, wire) = live_session(BoardSnapshot::default());
        let stroke = draw(&mut session, &[(10.0, 10.0), (30.0, 20.0), (50.0, 10.0)]).unwrap();

        assert_eq!(stroke.author, "tester");
        assert_eq!(session.history().undo_depth(), 2);
        assert_eq!(wire.borrow().sent_events(), vec![BoardEvent::Draw(stroke.clone())]);

        // Incremental painting matches a replay of the finished stroke.
        let mut replayed = Surface::new(96, 64, Rgb::WHITE);
        replayed.replay(&stroke);
        assert_eq!(session.surface(), &replayed);
    }

    #[test]
    fn test_single_point_stroke_not_sent() {
        let (mut session, wire) = live_session(BoardSnapshot::default());
        let stroke = draw(&mut session, &[(20.0, 20.0)]).unwrap();

        assert_eq!(stroke.points.len(), 1);
        assert!(wire.borrow().sent.is_empty());
        assert_eq!(session.surface(), &Surface::new(96, 64, Rgb::WHITE));
        assert_eq!(session.history().undo_depth(), 2);
    }

    #[test]
    fn test_stroke_dropped_before_channel_opens() {
        let store = store_with(BoardSnapshot::default());
        let (transport, wire) = MockTransport::new();
        let mut session = block_on(BoardSession::join(&store, SLUG, "tok", &config(), transport)).unwrap();

        draw(&mut session, &[(1.0, 1.0), (9.0, 9.0)]);
        assert!(wire.borrow().sent.is_empty());
        assert_eq!(session.channel().dropped_count(), 1);
        // Local state still changed.
        assert_eq!(session.history().undo_depth(), 2);
    }

    #[test]
    fn test_eraser_uses_background() {
        let (mut session, _wire) = live_session(BoardSnapshot::default());
        draw(&mut session, &[(10.0, 30.0), (80.0, 30.0)]);
        session.brush_mut().tool = Tool::Eraser;
        session.brush_mut().set_line_width(20.0);
        draw(&mut session, &[(10.0, 30.0), (80.0, 30.0)]);
        assert_eq!(session.surface(), &Surface::new(96, 64, Rgb::WHITE));
    }

    #[test]
    fn test_brush_width_clamped() {
        let mut brush = Brush::default();
        brush.set_line_width(100.0);
        assert_eq!(brush.line_width(), MAX_LINE_WIDTH);
        brush.set_line_width(0.0);
        assert_eq!(brush.line_width(), MIN_LINE_WIDTH);
    }

    #[test]
    fn test_undo_redo_apply_after_decode() {
        let (mut session, wire) = live_session(BoardSnapshot::default());
        draw(&mut session, &[(5.0, 5.0), (40.0, 5.0)]);
        let after_first = session.surface().clone();
        draw(&mut session, &[(5.0, 30.0), (40.0, 30.0)]);
        let after_second = session.surface().clone();
        let sent_before = wire.borrow().sent.len();

        assert!(session.undo());
        // Nothing changes until the snapshot has decoded.
        assert_eq!(session.surface(), &after_second);
        assert!(session.has_pending_restores());
        assert_eq!(session.complete_restores(), 1);
        assert_eq!(session.surface(), &after_first);

        assert!(session.redo());
        session.complete_restores();
        assert_eq!(session.surface(), &after_second);

        // Undo is local only.
        assert_eq!(wire.borrow().sent.len(), sent_before);
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let (mut session, _wire) = live_session(BoardSnapshot::default());
        for i in 0..3 {
            let y = 10.0 + 15.0 * i as f64;
            draw(&mut session, &[(5.0, y), (80.0, y)]);
        }

        for n in 1..=3 {
            let before = session.surface().clone();
            for _ in 0..n {
                assert!(session.undo());
            }
            session.complete_restores();
            for _ in 0..n {
                assert!(session.redo());
            }
            session.complete_restores();
            assert_eq!(session.surface(), &before);
        }
    }

    #[test]
    fn test_undo_at_baseline_and_redo_empty_are_noops() {
        let (mut session, _wire) = live_session(BoardSnapshot {
            events: vec![stroke(Rgb::BLACK, &[(0.0, 0.0), (50.0, 50.0)])],
            notes: vec![],
        });
        let loaded = session.surface().clone();
        assert!(!session.undo());
        assert!(!session.redo());
        session.complete_restores();
        assert_eq!(session.surface(), &loaded);
    }

    #[test]
    fn test_stale_restore_discarded() {
        let (mut session, _wire) = live_session(BoardSnapshot::default());
        draw(&mut session, &[(5.0, 5.0), (40.0, 5.0)]);
        session.undo();
        draw(&mut session, &[(5.0, 30.0), (40.0, 30.0)]);
        let drawn = session.surface().clone();

        assert_eq!(session.complete_restores(), 0);
        assert_eq!(session.surface(), &drawn);
    }

    #[test]
    fn test_clear_resets_history_and_notes() {
        let (mut session, _wire) = live_session(BoardSnapshot {
            events: vec![],
            notes: vec![note(0.0, 0.0, "keep?")],
        });
        draw(&mut session, &[(5.0, 5.0), (40.0, 5.0)]);
        draw(&mut session, &[(5.0, 9.0), (40.0, 9.0)]);
        session.undo();

        session.clear().unwrap();
        assert_eq!(session.history().undo_depth(), 1);
        assert_eq!(session.history().redo_depth(), 0);
        assert!(session.notes().is_empty());
        assert_eq!(session.surface(), &Surface::new(96, 64, Rgb::WHITE));

        assert!(!session.undo());
        session.complete_restores();
        assert_eq!(session.surface(), &Surface::new(96, 64, Rgb::WHITE));
    }

    #[test]
    fn test_remote_draw_replayed_without_echo() {
        let (mut session, wire) = live_session(BoardSnapshot::default());
        let remote = stroke(Rgb::new(0, 128, 0), &[(0.0, 0.0), (90.0, 60.0)]);
        deliver(&wire, BoardEvent::Draw(remote.clone()));

        assert_eq!(session.process_incoming(), 1);
        let mut expected = Surface::new(96, 64, Rgb::WHITE);
        expected.replay(&remote);
        assert_eq!(session.surface(), &expected);
        assert!(wire.borrow().sent.is_empty());
        // Remote strokes are not part of local history.
        assert_eq!(session.history().undo_depth(), 1);
    }

    #[test]
    fn test_remote_create_then_delete_is_net_noop() {
        let existing = note(0.0, 0.0, "existing");
        let (mut session, wire) = live_session(BoardSnapshot {
            events: vec![],
            notes: vec![existing.clone()],
        });
        let before = session.notes().clone();

        let added = note(5.0, 5.0, "new");
        deliver(&wire, BoardEvent::NoteCreated(added.clone()));
        deliver(&wire, BoardEvent::NoteDeleted(added.id));
        session.process_incoming();

        assert_eq!(session.notes(), &before);
        assert!(wire.borrow().sent.is_empty());
    }

    #[test]
    fn test_last_update_wins_whole_object() {
        let original = note(50.0, 50.0, "A");
        let (mut session, wire) = live_session(BoardSnapshot {
            events: vec![],
            notes: vec![original.clone()],
        });

        let first = Note { x: 90.0, ..original.clone() };
        let second = Note { x: 90.0, text: "B".into(), ..original.clone() };
        deliver(&wire, BoardEvent::NoteUpdated(first));
        deliver(&wire, BoardEvent::NoteUpdated(second.clone()));
        session.process_incoming();
        assert_eq!(session.notes().get(original.id), Some(&second));

        // A stale full object clobbers unrelated fields too.
        let stale = Note { text: "C".into(), ..original.clone() };
        deliver(&wire, BoardEvent::NoteUpdated(stale.clone()));
        session.process_incoming();
        assert_eq!(session.notes().get(original.id), Some(&stale));
    }

    #[test]
    fn test_remote_update_recreates_deleted_note() {
        let (mut session, wire) = live_session(BoardSnapshot::default());
        let ghost = note(1.0, 1.0, "ghost");
        deliver(&wire, BoardEvent::NoteUpdated(ghost.clone()));
        session.process_incoming();
        assert_eq!(session.notes().get(ghost.id), Some(&ghost));
    }

    #[test]
    fn test_local_note_lifecycle_broadcasts() {
        let (mut session, wire) = live_session(BoardSnapshot::default());
        let id = session.add_note().unwrap();
        let created = session.notes().get(id).cloned().unwrap();

        let moved = session.update_note(id, &NotePatch::position(90.0, 50.0)).cloned().unwrap();
        assert_eq!(moved.text, created.text);
        assert!(session.delete_note(id));
        assert!(!session.delete_note(id));

        assert_eq!(
            wire.borrow().sent_events(),
            vec![
                BoardEvent::NoteCreated(created),
                BoardEvent::NoteUpdated(moved),
                BoardEvent::NoteDeleted(id),
            ]
        );
        assert!(session.notes().is_empty());
    }

    #[test]
    fn test_drag_sends_every_move() {
        let n = note(50.0, 50.0, "drag me");
        let (mut session, wire) = live_session(BoardSnapshot {
            events: vec![],
            notes: vec![n.clone()],
        });

        assert!(session.begin_drag(n.id, Point::new(60.0, 60.0)));
        session.gesture_move(Point::new(70.0, 60.0));
        session.gesture_move(Point::new(80.0, 65.0));
        session.end_gesture();
        assert!(session.gesture_move(Point::new(200.0, 200.0)).is_none());

        let sent = wire.borrow().sent_events();
        assert_eq!(sent.len(), 2);
        let last = session.notes().get(n.id).unwrap();
        assert_eq!((last.x, last.y), (70.0, 55.0));
        assert_eq!(sent[1], BoardEvent::NoteUpdated(last.clone()));
    }

    #[test]
    fn test_resize_clamps_to_minimum() {
        let n = note(50.0, 50.0, "");
        let (mut session, wire) = live_session(BoardSnapshot {
            events: vec![],
            notes: vec![n.clone()],
        });

        session.begin_resize(n.id);
        let resized = session.gesture_move(Point::new(60.0, 70.0)).cloned().unwrap();
        assert_eq!((resized.width, resized.height), (MIN_NOTE_SIZE, MIN_NOTE_SIZE));
        assert_eq!(wire.borrow().sent.len(), 1);

        let direct = session.update_note(n.id, &NotePatch::size(10.0, 500.0)).cloned().unwrap();
        assert_eq!((direct.width, direct.height), (MIN_NOTE_SIZE, 500.0));
    }

    #[test]
    fn test_text_edit_debounced() {
        let n = note(0.0, 0.0, "A");
        let (mut session, wire) = live_session(BoardSnapshot {
            events: vec![],
            notes: vec![n.clone()],
        });
        let t0 = Instant::now();
        let ms = Duration::from_millis;

        session.edit_note_text(n.id, "Ab", t0);
        session.edit_note_text(n.id, "Abc", t0 + ms(300));
        assert_eq!(session.note_text(n.id), Some("Abc"));
        assert_eq!(session.notes().get(n.id).unwrap().text, "A");

        assert_eq!(session.flush_text_edits(t0 + ms(600)), 0);
        assert!(wire.borrow().sent.is_empty());

        assert_eq!(session.flush_text_edits(t0 + ms(800)), 1);
        assert_eq!(session.flush_text_edits(t0 + ms(5000)), 0);
        let sent = wire.borrow().sent_events();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], BoardEvent::NoteUpdated(note) if note.text == "Abc"));
    }

    #[test]
    fn test_text_edit_back_to_original_sends_nothing() {
        let n = note(0.0, 0.0, "same");
        let (mut session, wire) = live_session(BoardSnapshot {
            events: vec![],
            notes: vec![n.clone()],
        });
        let t0 = Instant::now();
        session.edit_note_text(n.id, "same", t0);
        assert_eq!(session.flush_text_edits(t0 + Duration::from_secs(1)), 0);
        assert!(wire.borrow().sent.is_empty());
    }

    #[test]
    fn test_remote_update_cancels_draft() {
        let n = note(0.0, 0.0, "A");
        let (mut session, wire) = live_session(BoardSnapshot {
            events: vec![],
            notes: vec![n.clone()],
        });
        let t0 = Instant::now();
        session.edit_note_text(n.id, "mine", t0);

        let theirs = Note { text: "theirs".into(), ..n.clone() };
        deliver(&wire, BoardEvent::NoteUpdated(theirs));
        session.pump(t0 + Duration::from_secs(1));

        assert_eq!(session.note_text(n.id), Some("theirs"));
        assert!(wire.borrow().sent.is_empty());
    }

    #[test]
    fn test_remote_move_keeps_draft() {
        let n = note(0.0, 0.0, "A");
        let (mut session, wire) = live_session(BoardSnapshot {
            events: vec![],
            notes: vec![n.clone()],
        });
        let t0 = Instant::now();
        session.edit_note_text(n.id, "my edit", t0);

        deliver(&wire, BoardEvent::NoteUpdated(Note { x: 300.0, ..n.clone() }));
        session.pump(t0 + Duration::from_millis(100));
        assert_eq!(session.note_text(n.id), Some("my edit"));
        assert!(wire.borrow().sent.is_empty());

        session.pump(t0 + Duration::from_secs(1));
        let sent = wire.borrow().sent_events();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            BoardEvent::NoteUpdated(note) => {
                assert_eq!(note.text, "my edit");
                assert_eq!(note.x, 300.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_leave_closes_channel_and_freezes_state() {
        let (mut session, wire) = live_session(BoardSnapshot::default());
        session.leave();
        assert_eq!(session.phase(), SessionPhase::Closed);
        assert_eq!(wire.borrow().disconnects, 1);
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);

        assert!(session.add_note().is_none());
        session.begin_stroke(Point::new(1.0, 1.0));
        session.extend_stroke(Point::new(50.0, 50.0));
        assert!(session.end_stroke().unwrap().is_none());
        assert_eq!(session.surface(), &Surface::new(96, 64, Rgb::WHITE));
        deliver(&wire, BoardEvent::NoteCreated(note(0.0, 0.0, "late")));
        assert_eq!(session.process_incoming(), 0);
        assert!(session.notes().is_empty());
        assert!(wire.borrow().sent.is_empty());

        session.leave();
        assert_eq!(wire.borrow().disconnects, 1);
    }

    #[test]
    fn test_drop_releases_channel() {
        let (session, wire) = live_session(BoardSnapshot::default());
        drop(session);
        assert_eq!(wire.borrow().disconnects, 1);
    }

    #[test]
    fn test_export_includes_notes() {
        let n = Note {
            width: 100.0,
            height: 100.0,
            ..note(-20.0, -20.0, "corner")
        };
        let (session, _wire) = live_session(BoardSnapshot {
            events: vec![],
            notes: vec![n.clone()],
        });

        assert_eq!(session.export_file_name(), "board-team-board.png");
        let png = session.export_png().unwrap();
        let image = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (96, 64));
        assert_eq!(image.get_pixel(10, 10).0, [0xff, 0xf4, 0x75, 255]);
        assert_eq!(image.get_pixel(90, 60).0, [255, 255, 255, 255]);
    }
}
