//! Scripted transports, recording components and scope builders for tests

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};

use crate::config::Config;
use crate::data::{DocumentMetadata, EventStreamConnector, Transport};
use crate::error::{FrameworkError, TransportError};
use crate::framework::{Component, Framework, Plugin};
use crate::message::Message;
use crate::scope::Scope;
use crate::types::{PageSize, Viewport};

type Response = Result<Vec<u8>, TransportError>;

/// Transport answering from per-URL scripts.
///
/// Scripted responses are consumed in order; once a URL's script runs out
/// its standing response (if any) is returned, otherwise HTTP 404.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Response>>>,
    standing: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response for `url`
    pub fn respond(&self, url: &str, response: Response) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Answer every request for `url` with `body`
    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.standing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), body.into());
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|requested| *requested == url)
            .count()
    }

    /// Every requested URL, in request order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for ScriptedTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let scripted = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(url)
            .and_then(VecDeque::pop_front);
        if let Some(response) = scripted {
            return response;
        }
        self.standing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .ok_or(TransportError::Status { status: 404 })
    }
}

#[derive(Default)]
struct Gate {
    attempts: usize,
    release: Option<Response>,
}

/// Transport whose requests block until the test releases them
#[derive(Default)]
pub struct GatedTransport {
    gate: Mutex<Gate>,
    changed: Condvar,
}

impl GatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until at least one request has started
    pub fn wait_entered(&self) {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let _gate = self
            .changed
            .wait_while(gate, |gate| gate.attempts == 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Let the pending request finish with `response`
    pub fn release(&self, response: Response) {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.release = Some(response);
        self.changed.notify_all();
    }

    pub fn attempts(&self) -> usize {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attempts
    }
}

impl Transport for GatedTransport {
    fn fetch(&self, _url: &str) -> Result<Vec<u8>, TransportError> {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.attempts += 1;
        self.changed.notify_all();
        let mut gate = self
            .changed
            .wait_while(gate, |gate| gate.release.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        gate.release
            .take()
            .unwrap_or(Err(TransportError::Network("gate closed".into())))
    }
}

/// How long an idle scripted stream blocks a read before timing out
const IDLE_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Event stream fed by the test one chunk at a time.
///
/// Like a quiet server, an idle stream times out reads rather than ending.
pub struct ScriptedEventStream {
    sender: Mutex<Option<Sender<Vec<u8>>>>,
    receiver: Mutex<Option<Receiver<Vec<u8>>>>,
    connected: Arc<AtomicBool>,
    fail_connect: bool,
}

impl ScriptedEventStream {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            connected: Arc::new(AtomicBool::new(false)),
            fail_connect: false,
        }
    }

    /// Connector whose connection attempt fails
    pub fn refusing() -> Self {
        Self {
            fail_connect: true,
            ..Self::new()
        }
    }

    /// Append raw stream text
    pub fn push(&self, chunk: &str) {
        if let Some(tx) = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(chunk.as_bytes().to_vec());
        }
    }

    /// True from `connect` until the reader side is dropped
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// End the stream
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Default for ScriptedEventStream {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStreamConnector for ScriptedEventStream {
    fn connect(&self, _url: &str) -> Result<Box<dyn Read + Send>, TransportError> {
        if self.fail_connect {
            return Err(TransportError::Status { status: 503 });
        }
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| TransportError::Network("stream already opened".into()))?;
        self.connected.store(true, Ordering::Release);
        Ok(Box::new(ChannelReader {
            chunks: receiver,
            pending: Vec::new(),
            offset: 0,
            connected: Arc::clone(&self.connected),
        }))
    }
}

struct ChannelReader {
    chunks: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
    connected: Arc<AtomicBool>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.offset >= self.pending.len() {
            match self.chunks.recv_timeout(IDLE_READ_TIMEOUT) {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data yet"));
                }
                // Sender gone: end of stream
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let available = &self.pending[self.offset..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.offset += count;
        Ok(count)
    }
}

impl Drop for ChannelReader {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::Release);
    }
}

/// Shared, ordered record of lifecycle and message events
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Component that logs `name:init`, `name:<message>` and `name:destroyed`
pub struct RecordingComponent {
    name: String,
    log: EventLog,
}

impl RecordingComponent {
    pub fn new(name: impl Into<String>, log: EventLog) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}

impl Component for RecordingComponent {
    fn init(&mut self, _scope: &Scope) -> Result<(), FrameworkError> {
        self.log.push(format!("{}:init", self.name));
        Ok(())
    }

    fn on_message(&mut self, _scope: &Scope, message: &Message) {
        self.log.push(format!("{}:{}", self.name, message.name()));
    }

    fn destroy(&mut self) {
        self.log.push(format!("{}:destroyed", self.name));
    }
}

/// Plugin that logs the same way as [`RecordingComponent`]
pub struct RecordingPlugin {
    name: String,
    messages: Vec<&'static str>,
    log: EventLog,
}

impl RecordingPlugin {
    pub fn new(name: impl Into<String>, messages: &[&'static str], log: EventLog) -> Self {
        Self {
            name: name.into(),
            messages: messages.to_vec(),
            log,
        }
    }
}

impl Plugin for RecordingPlugin {
    fn messages(&self) -> &[&str] {
        &self.messages
    }

    fn init(&mut self, _scope: &Scope, _config: &serde_json::Value) -> Result<(), FrameworkError> {
        self.log.push(format!("{}:init", self.name));
        Ok(())
    }

    fn on_message(&mut self, _scope: &Scope, message: &Message) {
        self.log.push(format!("{}:{}", self.name, message.name()));
    }

    fn destroy(&mut self) {
        self.log.push(format!("{}:destroyed", self.name));
    }
}

/// Metadata for `num_pages` pages of one size
pub fn metadata(num_pages: usize, size: PageSize) -> DocumentMetadata {
    DocumentMetadata {
        numpages: num_pages,
        dimensions: size,
        pages: Vec::new(),
        doc_type: None,
    }
}

/// `info.json` body matching [`metadata`]
pub fn metadata_json(num_pages: usize, size: PageSize) -> String {
    serde_json::json!({
        "numpages": num_pages,
        "dimensions": { "width": size.width, "height": size.height },
    })
    .to_string()
}

/// Scope with loaded metadata and a viewport, ready for a layout
pub fn layout_scope(num_pages: usize, size: PageSize, viewport: Viewport) -> Scope {
    layout_scope_with(num_pages, size, viewport, |_| {})
}

/// Like [`layout_scope`], with a hook to adjust the config first
pub fn layout_scope_with(
    num_pages: usize,
    size: PageSize,
    viewport: Viewport,
    adjust: impl FnOnce(&mut Config),
) -> Scope {
    let framework = Framework::new(Arc::new(ScriptedTransport::new())).with_builtins();
    let mut config = Config::with_url("https://cdn.example.com/doc");
    config.metadata = Some(metadata(num_pages, size));
    config.num_pages = num_pages;
    config.viewport = viewport;
    adjust(&mut config);
    Scope::new(Rc::new(framework), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_responses_run_out_into_standing_ones() {
        let transport = ScriptedTransport::new();
        transport.respond("u", Err(TransportError::Status { status: 500 }));
        transport.serve("u", "ok");

        assert!(transport.fetch("u").is_err());
        assert_eq!(transport.fetch("u").unwrap(), b"ok");
        assert!(matches!(
            transport.fetch("v"),
            Err(TransportError::Status { status: 404 })
        ));
        assert_eq!(transport.request_count("u"), 2);
        assert_eq!(transport.requests(), vec!["u", "u", "v"]);
    }

    #[test]
    fn event_stream_ends_when_closed() {
        let stream = ScriptedEventStream::new();
        stream.push("data: a\n");
        stream.close();

        let mut body = String::new();
        stream
            .connect("u")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "data: a\n");
        assert!(stream.connect("u").is_err());
    }

    #[test]
    fn layout_scope_carries_metadata() {
        let scope = layout_scope(3, PageSize::new(10.0, 20.0), Viewport::new(100.0, 100.0));
        let config = scope.config();
        assert_eq!(config.num_pages, 3);
        assert_eq!(config.metadata.as_ref().map(|m| m.numpages), Some(3));
    }
}
