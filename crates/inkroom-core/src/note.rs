//! Sticky notes and the note collection.
//!
//! Notes are replaced as a unit: every change produces a complete note that
//! overwrites whatever copy a client holds for that id.

use crate::color::Rgb;
use kurbo::{Point, Rect, Vec2};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for notes.
pub type NoteId = Uuid;

/// Smallest width or height a note may take.
pub const MIN_NOTE_SIZE: f64 = 100.0;
/// Size of a freshly created note.
pub const DEFAULT_NOTE_SIZE: (f64, f64) = (230.0, 150.0);
/// Where new notes appear.
pub const DEFAULT_NOTE_POSITION: Point = Point::new(50.0, 50.0);
/// Text of a freshly created note.
pub const DEFAULT_NOTE_TEXT: &str = "New note";

/// Background colors a new note picks from.
pub const NOTE_PALETTE: [Rgb; 7] = [
    Rgb::new(0xff, 0xf4, 0x75),
    Rgb::new(0xf2, 0x8b, 0x82),
    Rgb::new(0xcc, 0xff, 0x90),
    Rgb::new(0xa7, 0xff, 0xeb),
    Rgb::new(0xd7, 0xae, 0xfb),
    Rgb::new(0xfd, 0xcf, 0xe8),
    Rgb::new(0xae, 0xcb, 0xfa),
];

/// A sticky note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
    pub color: Rgb,
}

impl Note {
    /// A default note with a palette color chosen by `rng`.
    pub fn create_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let color = NOTE_PALETTE.choose(rng).copied().unwrap_or(NOTE_PALETTE[0]);
        Self {
            id: Uuid::new_v4(),
            x: DEFAULT_NOTE_POSITION.x,
            y: DEFAULT_NOTE_POSITION.y,
            width: DEFAULT_NOTE_SIZE.0,
            height: DEFAULT_NOTE_SIZE.1,
            text: DEFAULT_NOTE_TEXT.to_string(),
            color,
        }
    }

    /// A default note with a random palette color.
    pub fn create() -> Self {
        Self::create_with(&mut rand::thread_rng())
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// This note with `patch` merged on top. The id never changes and
    /// sizes are held at or above [`MIN_NOTE_SIZE`].
    pub fn merged(&self, patch: &NotePatch) -> Note {
        Note {
            id: self.id,
            x: patch.x.unwrap_or(self.x),
            y: patch.y.unwrap_or(self.y),
            width: patch.width.map_or(self.width, clamp_size),
            height: patch.height.map_or(self.height, clamp_size),
            text: patch.text.clone().unwrap_or_else(|| self.text.clone()),
            color: patch.color.unwrap_or(self.color),
        }
    }
}

fn clamp_size(value: f64) -> f64 {
    value.max(MIN_NOTE_SIZE)
}

/// Fields to change on a note. Unset fields keep the sender's local value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotePatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub text: Option<String>,
    pub color: Option<Rgb>,
}

impl NotePatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// A pointer gesture on a note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteGesture {
    /// Moving the note; keeps the pointer's offset from the note origin.
    Drag { id: NoteId, grab_offset: Vec2 },
    /// Dragging the bottom-right handle.
    Resize { id: NoteId },
}

impl NoteGesture {
    pub fn drag(note: &Note, pointer: Point) -> Self {
        NoteGesture::Drag {
            id: note.id,
            grab_offset: pointer - note.origin(),
        }
    }

    pub fn resize(note: &Note) -> Self {
        NoteGesture::Resize { id: note.id }
    }

    pub fn note_id(&self) -> NoteId {
        match *self {
            NoteGesture::Drag { id, .. } | NoteGesture::Resize { id } => id,
        }
    }

    /// The change a pointer move at `pointer` makes to `note`.
    pub fn patch_for(&self, note: &Note, pointer: Point) -> NotePatch {
        match *self {
            NoteGesture::Drag { grab_offset, .. } => {
                let origin = pointer - grab_offset;
                NotePatch::position(origin.x, origin.y)
            }
            NoteGesture::Resize { .. } => {
                let size = pointer - note.origin();
                NotePatch::size(clamp_size(size.x), clamp_size(size.y))
            }
        }
    }
}

/// The authoritative note collection on one client, in creation order.
#[derive(Debug, Clone, Default)]
pub struct NoteSet {
    notes: HashMap<NoteId, Note>,
    order: Vec<NoteId>,
}

impl NoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a snapshot's notes. Later duplicates replace earlier ones.
    pub fn from_notes(notes: impl IntoIterator<Item = Note>) -> Self {
        let mut set = Self::new();
        for note in notes {
            set.upsert(note);
        }
        set
    }

    /// Insert a note, or replace the existing note with the same id wholesale.
    /// Returns the replaced note, if any.
    pub fn upsert(&mut self, note: Note) -> Option<Note> {
        let id = note.id;
        let previous = self.notes.insert(id, note);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    /// Remove a note by id.
    pub fn remove(&mut self, id: NoteId) -> Option<Note> {
        let removed = self.notes.remove(&id);
        if removed.is_some() {
            self.order.retain(|&note_id| note_id != id);
        }
        removed
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn contains(&self, id: NoteId) -> bool {
        self.notes.contains_key(&id)
    }

    /// Notes in creation order (back to front).
    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.order.iter().filter_map(|id| self.notes.get(id))
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl PartialEq for NoteSet {
    fn eq(&self, other: &Self) -> bool {
        self.notes == other.notes
    }
}
