//! Shared server state: known boards, their accumulated snapshots, and the
//! live rooms relaying between connected peers.

use dashmap::DashMap;
use inkroom_core::{BoardEvent, BoardSnapshot, Project};
use std::collections::HashSet;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// A relayed message: sending peer and the raw JSON text.
pub type Relayed = (String, String);

/// A board known to the server.
struct Board {
    name: String,
    snapshot: BoardSnapshot,
}

/// Peers currently connected to one board.
struct Room {
    tx: broadcast::Sender<Relayed>,
    peers: HashSet<String>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashSet::new(),
        }
    }
}

/// Shared application state
pub struct AppState {
    boards: DashMap<String, Board>,
    rooms: DashMap<String, Room>,
    /// Accepted credentials; empty accepts any non-empty token.
    tokens: HashSet<String>,
}

impl AppState {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            boards: DashMap::new(),
            rooms: DashMap::new(),
            tokens: tokens.into_iter().filter(|t| !t.is_empty()).collect(),
        }
    }

    pub fn authorize(&self, token: &str) -> bool {
        !token.is_empty() && (self.tokens.is_empty() || self.tokens.contains(token))
    }

    /// Register a board. Returns false if the slug is taken.
    pub fn create_board(&self, slug: &str, name: &str) -> bool {
        if self.boards.contains_key(slug) {
            return false;
        }
        self.boards.insert(
            slug.to_string(),
            Board {
                name: name.to_string(),
                snapshot: BoardSnapshot::default(),
            },
        );
        true
    }

    pub fn has_board(&self, slug: &str) -> bool {
        self.boards.contains_key(slug)
    }

    /// Boards sorted by slug.
    pub fn projects(&self) -> Vec<Project> {
        let mut projects: Vec<Project> = self
            .boards
            .iter()
            .map(|entry| Project {
                slug: entry.key().clone(),
                name: entry.value().name.clone(),
            })
            .collect();
        projects.sort_by(|a, b| a.slug.cmp(&b.slug));
        projects
    }

    pub fn snapshot(&self, slug: &str) -> Option<BoardSnapshot> {
        self.boards.get(slug).map(|board| board.snapshot.clone())
    }

    /// Add peer to a board's room
    pub fn join_room(&self, slug: &str, peer_id: &str) -> (broadcast::Receiver<Relayed>, usize) {
        let mut room = self.rooms.entry(slug.to_string()).or_insert_with(Room::new);
        room.peers.insert(peer_id.to_string());
        (room.tx.subscribe(), room.peers.len())
    }

    /// Remove peer from a room, dropping the room once empty
    pub fn leave_room(&self, slug: &str, peer_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(slug) {
            room.peers.remove(peer_id);
            if room.peers.is_empty() {
                drop(room);
                self.rooms.remove(slug);
            }
        }
    }

    pub fn peer_count(&self, slug: &str) -> usize {
        self.rooms.get(slug).map_or(0, |room| room.peers.len())
    }

    /// Validate a peer's message, fold it into the board snapshot and fan it
    /// out to the room. Returns the decoded event, or `None` if the text was
    /// not a board event.
    pub fn relay(&self, slug: &str, from: &str, text: &str) -> Option<BoardEvent> {
        let event = match BoardEvent::decode(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Invalid message from {} on {}: {}", from, slug, e);
                return None;
            }
        };

        if let Some(mut board) = self.boards.get_mut(slug) {
            board.snapshot.apply(&event);
        }
        if let Some(room) = self.rooms.get(slug) {
            let _ = room.tx.send((from.to_string(), text.to_string()));
        }
        Some(event)
    }
}
