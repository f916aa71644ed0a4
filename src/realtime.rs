//! Server-sent events client
//!
//! The stream is read and parsed on a background thread. Parsed events wait
//! in a queue until [`RealtimeClient::poll`] dispatches them to listeners on
//! the caller's thread. Stream failures and end-of-stream arrive as an
//! [`ERROR_EVENT`]; the client never reconnects.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use flume::{Receiver, Sender};
use log::{debug, info, warn};

use crate::config::Capabilities;
use crate::data::EventStreamConnector;
use crate::error::RealtimeError;

/// Event delivered when the stream fails or ends
pub const ERROR_EVENT: &str = "error";

const DEFAULT_EVENT: &str = "message";

const READ_BUFFER_SIZE: usize = 4096;

/// One dispatched server-sent event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerEvent {
    pub event: String,
    pub data: String,
    /// Last event id seen on the stream
    pub id: Option<String>,
}

impl ServerEvent {
    fn error(detail: impl Into<String>) -> Self {
        Self {
            event: ERROR_EVENT.to_string(),
            data: detail.into(),
            id: None,
        }
    }
}

/// Incremental `text/event-stream` parser, fed one line at a time
#[derive(Debug, Default)]
pub struct EventStreamParser {
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line without its terminator; a blank line dispatches
    pub fn feed_line(&mut self, line: &str) -> Option<ServerEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            // `retry` is ignored
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<ServerEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(ServerEvent {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.last_id.clone(),
        })
    }
}

/// Handle returned by [`RealtimeClient::on`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

type Listener = Box<dyn FnMut(&ServerEvent)>;

pub struct RealtimeClient {
    url: String,
    events: Receiver<ServerEvent>,
    listeners: HashMap<String, Vec<(ListenerId, Listener)>>,
    next_listener: usize,
    closed: Arc<AtomicBool>,
}

impl RealtimeClient {
    /// Open the stream at `url` and start reading it in the background
    pub fn new(
        url: &str,
        connector: Option<Arc<dyn EventStreamConnector>>,
        capabilities: Capabilities,
    ) -> Result<Self, RealtimeError> {
        let connector = match connector {
            Some(connector) if capabilities.event_stream => connector,
            _ => return Err(RealtimeError::Unsupported),
        };

        let (tx, rx) = flume::unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let reader_closed = Arc::clone(&closed);
        let reader_url = url.to_string();
        thread::Builder::new()
            .name("crocodoc-realtime".to_string())
            .spawn(move || read_stream(connector.as_ref(), &reader_url, &tx, &reader_closed))?;

        info!("Realtime stream opened for {url}");
        Ok(Self {
            url: url.to_string(),
            events: rx,
            listeners: HashMap::new(),
            next_listener: 0,
            closed,
        })
    }

    /// Subscribe `handler` to events named `event`
    pub fn on<F>(&mut self, event: &str, handler: F) -> ListenerId
    where
        F: FnMut(&ServerEvent) + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove one listener; returns false if it was not subscribed
    pub fn off(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(listeners) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        before != listeners.len()
    }

    /// Dispatch every queued event; returns how many were received
    pub fn poll(&mut self) -> usize {
        if self.is_destroyed() {
            return 0;
        }
        let pending: Vec<ServerEvent> = self.events.try_iter().collect();
        for event in &pending {
            match self.listeners.get_mut(&event.event) {
                Some(listeners) => {
                    for (_, listener) in listeners.iter_mut() {
                        listener(event);
                    }
                }
                None => debug!("No listener for realtime event '{}'", event.event),
            }
        }
        pending.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the stream and drop all listeners
    pub fn destroy(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.listeners.clear();
        self.events.try_iter().for_each(drop);
        debug!("Realtime stream for {} closed", self.url);
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Read errors that only mean nothing arrived yet
fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn read_stream(
    connector: &dyn EventStreamConnector,
    url: &str,
    events: &Sender<ServerEvent>,
    closed: &AtomicBool,
) {
    let mut stream: Box<dyn Read + Send> = match connector.connect(url) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to open event stream {url}: {e}");
            let _ = events.send(ServerEvent::error(e.to_string()));
            return;
        }
    };

    let mut parser = EventStreamParser::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        // Returning drops `stream`, which closes the connection
        if closed.load(Ordering::Acquire) {
            debug!("Event stream {url} closed by client");
            return;
        }
        match stream.read(&mut buf) {
            Ok(0) => {
                debug!("Event stream {url} ended");
                let _ = events.send(ServerEvent::error("event stream closed"));
                return;
            }
            Ok(count) => {
                pending.extend_from_slice(&buf[..count]);
                while let Some(end) = pending.iter().position(|byte| *byte == b'\n') {
                    let raw: Vec<u8> = pending.drain(..=end).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end_matches(['\n', '\r']);
                    let Some(event) = parser.feed_line(line) else {
                        continue;
                    };
                    if closed.load(Ordering::Acquire) || events.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) if is_idle(&e) => {}
            Err(e) => {
                warn!("Event stream {url} failed: {e}");
                let _ = events.send(ServerEvent::error(e.to_string()));
                return;
            }
        }
    }
}
