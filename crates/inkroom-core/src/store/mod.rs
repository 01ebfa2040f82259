//! Backing store access.
//!
//! The backing store is the source of a board's initial snapshot (stroke log
//! plus current notes) and of the project list used to title a board.

mod http;
mod memory;

pub use http::HttpBoardStore;
pub use memory::MemoryBoardStore;

use crate::note::{Note, NoteId};
use crate::protocol::BoardEvent;
use crate::stroke::Stroke;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bearer credential was rejected.
    #[error("Not authorized")]
    Unauthorized,
    #[error("Board not found: {0}")]
    NotFound(String),
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Store error: {0}")]
    Other(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future for async store operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A project entry from the project list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub slug: String,
    pub name: String,
}

/// A board's shared state at join time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Stroke log in the order it must be replayed.
    #[serde(default)]
    pub events: Vec<Stroke>,
    /// Current notes.
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl BoardSnapshot {
    /// Fold a relayed event into the snapshot the way later joiners must see it.
    pub fn apply(&mut self, event: &BoardEvent) {
        match event {
            BoardEvent::Draw(stroke) => {
                if stroke.is_broadcastable() {
                    self.events.push(stroke.clone());
                }
            }
            BoardEvent::NoteCreated(note) | BoardEvent::NoteUpdated(note) => {
                match self.notes.iter_mut().find(|n| n.id == note.id) {
                    Some(existing) => *existing = note.clone(),
                    None => self.notes.push(note.clone()),
                }
            }
            BoardEvent::NoteDeleted(id) => self.remove_note(*id),
        }
    }

    fn remove_note(&mut self, id: NoteId) {
        self.notes.retain(|n| n.id != id);
    }
}

/// Read access to the backing store.
pub trait BoardStore: Send + Sync {
    /// Fetch the snapshot for a board.
    fn board_state(&self, slug: &str) -> BoxFuture<'_, StoreResult<BoardSnapshot>>;

    /// List the projects visible to the caller.
    fn projects(&self) -> BoxFuture<'_, StoreResult<Vec<Project>>>;
}

#[cfg(test)]
pub(crate) fn block_on<F: std::future::Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        match f.as_mut().poll(&mut cx) {
            Poll::Ready(result) => return result,
            Poll::Pending => {}
        }
    }
}
