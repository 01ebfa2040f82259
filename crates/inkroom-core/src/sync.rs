//! Live relay channel.
//!
//! One [`SyncChannel`] per board session. Outgoing board events are encoded
//! and sent only while the connection is open; anything sent at another
//! time is dropped and logged, never queued or retried. Incoming text is
//! decoded into [`BoardEvent`]s for the session controller.

use crate::protocol::BoardEvent;
use thiserror::Error;
use url::Url;

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid WebSocket URL scheme: {0}")]
    InvalidScheme(String),
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    Send(String),
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events produced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake finished.
    Connected,
    /// Connection closed, by either side.
    Disconnected,
    /// A text message arrived.
    Message(String),
    /// The connection failed.
    Error { message: String },
}

/// A message-oriented connection to the relay.
///
/// Transports are polled from the session's event loop; they never call
/// back into the session.
pub trait Transport {
    /// Start connecting to `url`.
    fn connect(&mut self, url: &str) -> ChannelResult<()>;

    /// Send one text message.
    fn send(&self, text: &str) -> ChannelResult<()>;

    /// Drain pending events (non-blocking).
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// Close the connection. Safe to call more than once.
    fn disconnect(&mut self);

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}

/// Build the relay URL for a board: `<ws_base><slug>/?token=<token>`.
pub fn connection_url(ws_base: &str, slug: &str, token: &str) -> ChannelResult<Url> {
    let base = if ws_base.ends_with('/') {
        Url::parse(ws_base)?
    } else {
        Url::parse(&format!("{}/", ws_base))?
    };
    if base.scheme() != "ws" && base.scheme() != "wss" {
        return Err(ChannelError::InvalidScheme(base.scheme().to_string()));
    }

    let mut url = base.join(&format!("{}/", slug))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

/// The session's live channel to the relay.
pub struct SyncChannel<T: Transport> {
    transport: T,
    url: Option<Url>,
    dropped: usize,
}

impl<T: Transport> SyncChannel<T> {
    /// Wrap an unconnected transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            url: None,
            dropped: 0,
        }
    }

    /// Connect to `url`.
    pub fn open(&mut self, url: Url) -> ChannelResult<()> {
        log::info!("Opening board channel: {}", redact_token(&url));
        self.transport.connect(url.as_str())?;
        self.url = Some(url);
        Ok(())
    }

    /// Close the connection. Later sends are dropped.
    pub fn close(&mut self) {
        if self.url.take().is_some() {
            log::info!("Closing board channel");
        }
        self.transport.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn is_open(&self) -> bool {
        self.transport.state() == ConnectionState::Connected
    }

    /// Number of events dropped because the channel was not open.
    pub fn dropped_count(&self) -> usize {
        self.dropped
    }

    /// Send an event if the connection is open; otherwise drop it.
    /// Returns whether the event was handed to the transport.
    pub fn send(&mut self, event: &BoardEvent) -> bool {
        if !self.is_open() {
            self.dropped += 1;
            log::debug!("Dropping {} event: channel is {:?}", event.kind(), self.state());
            return false;
        }

        let json = match event.encode() {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to encode {} event: {}", event.kind(), e);
                return false;
            }
        };

        match self.transport.send(&json) {
            Ok(()) => true,
            Err(e) => {
                self.dropped += 1;
                log::warn!("Dropping {} event: {}", event.kind(), e);
                false
            }
        }
    }

    /// Drain the transport and decode incoming board events.
    /// Undecodable messages are logged and skipped.
    pub fn poll(&mut self) -> Vec<BoardEvent> {
        let mut events = Vec::new();
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::Message(text) => match BoardEvent::decode(&text) {
                    Ok(event) => events.push(event),
                    Err(e) => log::warn!("Ignoring relay message: {}", e),
                },
                TransportEvent::Connected => log::info!("Board channel open"),
                TransportEvent::Disconnected => log::info!("Board channel closed"),
                TransportEvent::Error { message } => log::warn!("Board channel error: {}", message),
            }
        }
        events
    }
}

impl<T: Transport> Drop for SyncChannel<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// URL for logs, without the bearer token.
fn redact_token(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

// ============================================================================
// Native WebSocket Transport
// ============================================================================

mod native {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket transport backed by a background thread.
    pub struct NativeTransport {
        state: ConnectionState,
        events: Vec<TransportEvent>,
        /// Channel to send commands to the WebSocket thread.
        cmd_tx: Option<Sender<WsCommand>>,
        /// Channel to receive events from the WebSocket thread.
        event_rx: Option<Receiver<TransportEvent>>,
        /// Handle to the WebSocket thread.
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeTransport {
        /// Create a new disconnected transport.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                events: Vec::new(),
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }
    }

    impl Default for NativeTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    fn run_socket(url: String, cmd_rx: Receiver<WsCommand>, event_tx: Sender<TransportEvent>) {
        let (mut socket, response) = match connect(url.as_str()) {
            Ok(connected) => connected,
            Err(e) => {
                log::error!("WebSocket connection failed: {}", e);
                let _ = event_tx.send(TransportEvent::Error {
                    message: format!("Connection failed: {}", e),
                });
                return;
            }
        };

        log::debug!("WebSocket connected, status: {}", response.status());
        let _ = event_tx.send(TransportEvent::Connected);

        // Short read timeout so the loop can service outgoing commands.
        if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }

        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    if let Err(e) = socket.send(Message::Text(msg)) {
                        log::error!("WebSocket send error: {}", e);
                        break;
                    }
                }
                Ok(WsCommand::Close) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    break;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match socket.read() {
                Ok(Message::Text(txt)) => {
                    let _ = event_tx.send(TransportEvent::Message(txt));
                }
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket received close frame");
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    log::error!("WebSocket read error: {}", e);
                    break;
                }
            }
        }

        let _ = event_tx.send(TransportEvent::Disconnected);
    }

    impl Transport for NativeTransport {
        fn connect(&mut self, url: &str) -> ChannelResult<()> {
            if self.cmd_tx.is_some() {
                return Err(ChannelError::AlreadyConnected);
            }

            let parsed = Url::parse(url)?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(ChannelError::InvalidScheme(parsed.scheme().to_string()));
            }

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<TransportEvent>();
            let url = url.to_string();
            let handle = thread::spawn(move || run_socket(url, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        fn send(&self, text: &str) -> ChannelResult<()> {
            match self.cmd_tx {
                Some(ref tx) => tx
                    .send(WsCommand::Send(text.to_string()))
                    .map_err(|e| ChannelError::Send(e.to_string())),
                None => Err(ChannelError::NotConnected),
            }
        }

        fn poll_events(&mut self) -> Vec<TransportEvent> {
            if let Some(ref rx) = self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        TransportEvent::Connected => self.state = ConnectionState::Connected,
                        TransportEvent::Disconnected => self.state = ConnectionState::Disconnected,
                        TransportEvent::Error { .. } => self.state = ConnectionState::Error,
                        TransportEvent::Message(_) => {}
                    }
                    self.events.push(event);
                }
            }
            std::mem::take(&mut self.events)
        }

        fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }

    impl Drop for NativeTransport {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

pub use native::NativeTransport;

// ============================================================================
// Scripted transport for tests
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// What the scripted transport saw and what it will deliver.
    #[derive(Debug, Default)]
    pub struct MockWire {
        pub url: Option<String>,
        pub sent: Vec<String>,
        pub inbound: VecDeque<TransportEvent>,
        pub disconnects: usize,
    }

    impl MockWire {
        pub fn sent_events(&self) -> Vec<BoardEvent> {
            self.sent
                .iter()
                .map(|json| BoardEvent::decode(json).unwrap())
                .collect()
        }
    }

    /// Transport whose wire is shared with the test.
    pub struct MockTransport {
        pub wire: Rc<RefCell<MockWire>>,
        state: ConnectionState,
    }

    impl MockTransport {
        pub fn new() -> (Self, Rc<RefCell<MockWire>>) {
            let wire = Rc::new(RefCell::new(MockWire::default()));
            let transport = Self {
                wire: wire.clone(),
                state: ConnectionState::Disconnected,
            };
            (transport, wire)
        }
    }

    impl Transport for MockTransport {
        fn connect(&mut self, url: &str) -> ChannelResult<()> {
            self.wire.borrow_mut().url = Some(url.to_string());
            self.state = ConnectionState::Connecting;
            Ok(())
        }

        fn send(&self, text: &str) -> ChannelResult<()> {
            self.wire.borrow_mut().sent.push(text.to_string());
            Ok(())
        }

        fn poll_events(&mut self) -> Vec<TransportEvent> {
            let events: Vec<_> = self.wire.borrow_mut().inbound.drain(..).collect();
            for event in &events {
                match event {
                    TransportEvent::Connected => self.state = ConnectionState::Connected,
                    TransportEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    TransportEvent::Error { .. } => self.state = ConnectionState::Error,
                    TransportEvent::Message(_) => {}
                }
            }
            events
        }

        fn disconnect(&mut self) {
            self.wire.borrow_mut().disconnects += 1;
            self.state = ConnectionState::Disconnected;
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }
}
