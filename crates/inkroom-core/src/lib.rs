//! inkroom Core Library
//!
//! Client-side state, rendering and synchronization for the inkroom
//! collaborative board: strokes, sticky notes, local undo/redo, the live
//! relay protocol and the session controller that ties them together.

pub mod color;
pub mod config;
pub mod debounce;
pub mod history;
pub mod note;
pub mod protocol;
pub mod session;
pub mod store;
pub mod stroke;
pub mod surface;
pub mod sync;

pub use kurbo;

pub use color::Rgb;
pub use config::{ClientConfig, ConfigError};
pub use debounce::Debouncer;
pub use history::{History, PendingRestore};
pub use note::{Note, NoteGesture, NoteId, NotePatch, NoteSet};
pub use protocol::{BoardEvent, ProtocolError};
pub use session::{BoardSession, Brush, JoinError, NativeBoardSession, SessionPhase};
pub use store::{BoardSnapshot, BoardStore, HttpBoardStore, MemoryBoardStore, Project, StoreError};
pub use stroke::{Stroke, StrokeBuilder, Tool};
pub use surface::{Snapshot, Surface, SurfaceError};
pub use sync::{ChannelError, ConnectionState, NativeTransport, SyncChannel, Transport, TransportEvent, connection_url};
