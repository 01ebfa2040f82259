//! Relay wire format.
//!
//! Every relay message is one JSON object tagged by `type`:
//!
//! ```json
//! { "type": "draw", "tool": "pen", "color": "#000000", "line_width": 4,
//!   "points": [{ "x": 1, "y": 2 }, { "x": 3, "y": 4 }], "username": "User-42" }
//! { "type": "note", "action": "update", "note": { "id": "...", "x": 50, ... } }
//! { "type": "note", "action": "delete", "note": { "id": "..." } }
//! ```
//!
//! Messages are decoded once, at the channel boundary, into [`BoardEvent`].

use crate::color::Rgb;
use crate::note::{NOTE_PALETTE, Note, NoteId};
use crate::stroke::Stroke;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Stroke has no points")]
    EmptyStroke,
    #[error("Invalid line width: {0}")]
    InvalidLineWidth(f64),
    #[error("Note {0} is missing fields for {1}")]
    IncompleteNote(NoteId, &'static str),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// A decoded board event.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// A finished stroke to append to the drawing.
    Draw(Stroke),
    /// A note was added.
    NoteCreated(Note),
    /// A note was replaced as a whole.
    NoteUpdated(Note),
    /// A note was removed.
    NoteDeleted(NoteId),
}

impl BoardEvent {
    /// Serialize for the relay.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(&WireMessage::from(self))?)
    }

    /// Parse and validate a relay message.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        let message: WireMessage = serde_json::from_str(text)?;
        BoardEvent::try_from(message)
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BoardEvent::Draw(_) => "draw",
            BoardEvent::NoteCreated(_) => "note/create",
            BoardEvent::NoteUpdated(_) => "note/update",
            BoardEvent::NoteDeleted(_) => "note/delete",
        }
    }
}

/// Message as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Draw(Stroke),
    Note { action: NoteAction, note: WireNote },
}

/// What a `note` message does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteAction {
    Create,
    Update,
    Delete,
}

impl NoteAction {
    fn as_str(self) -> &'static str {
        match self {
            NoteAction::Create => "create",
            NoteAction::Update => "update",
            NoteAction::Delete => "delete",
        }
    }
}

/// Note payload; deletes carry only the id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireNote {
    pub id: NoteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
}

impl WireNote {
    fn id_only(id: NoteId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    fn into_note(self, action: NoteAction) -> ProtocolResult<Note> {
        let id = self.id;
        let missing = || ProtocolError::IncompleteNote(id, action.as_str());
        Ok(Note {
            id,
            x: self.x.ok_or_else(missing)?,
            y: self.y.ok_or_else(missing)?,
            width: self.width.ok_or_else(missing)?,
            height: self.height.ok_or_else(missing)?,
            text: self.text.ok_or_else(missing)?,
            // A missing color falls back to the first palette color.
            color: self.color.unwrap_or(NOTE_PALETTE[0]),
        })
    }
}

impl From<&Note> for WireNote {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            x: Some(note.x),
            y: Some(note.y),
            width: Some(note.width),
            height: Some(note.height),
            text: Some(note.text.clone()),
            color: Some(note.color),
        }
    }
}

impl From<&BoardEvent> for WireMessage {
    fn from(event: &BoardEvent) -> Self {
        match event {
            BoardEvent::Draw(stroke) => WireMessage::Draw(stroke.clone()),
            BoardEvent::NoteCreated(note) => WireMessage::Note {
                action: NoteAction::Create,
                note: note.into(),
            },
            BoardEvent::NoteUpdated(note) => WireMessage::Note {
                action: NoteAction::Update,
                note: note.into(),
            },
            BoardEvent::NoteDeleted(id) => WireMessage::Note {
                action: NoteAction::Delete,
                note: WireNote::id_only(*id),
            },
        }
    }
}

impl TryFrom<WireMessage> for BoardEvent {
    type Error = ProtocolError;

    fn try_from(message: WireMessage) -> ProtocolResult<Self> {
        match message {
            WireMessage::Draw(stroke) => {
                if stroke.points.is_empty() {
                    return Err(ProtocolError::EmptyStroke);
                }
                if !(stroke.line_width.is_finite() && stroke.line_width > 0.0) {
                    return Err(ProtocolError::InvalidLineWidth(stroke.line_width));
                }
                Ok(BoardEvent::Draw(stroke))
            }
            WireMessage::Note { action, note } => match action {
                NoteAction::Create => Ok(BoardEvent::NoteCreated(note.into_note(action)?)),
                NoteAction::Update => Ok(BoardEvent::NoteUpdated(note.into_note(action)?)),
                NoteAction::Delete => Ok(BoardEvent::NoteDeleted(note.id)),
            },
        }
    }
}
