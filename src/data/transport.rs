//! Transports for asset requests and event streams

use std::io::{self, Read};
use std::time::Duration;

use log::debug;

use crate::error::TransportError;

/// Blocking fetch of one URL; called from fetch worker threads
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// Opens a long-lived server-sent events stream.
///
/// While the stream is idle, reads may fail with `io::ErrorKind::TimedOut`;
/// the reader treats that as a chance to notice it has been closed and
/// reads again.
pub trait EventStreamConnector: Send + Sync {
    fn connect(&self, url: &str) -> Result<Box<dyn Read + Send>, TransportError>;
}

/// HTTP transport backed by a blocking reqwest client
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    stream_client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    /// Longest a read on an idle event stream blocks
    pub const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        // Bounds each read, not the life of the stream
        let stream_client = reqwest::blocking::Client::builder()
            .connect_timeout(Self::REQUEST_TIMEOUT)
            .timeout(Self::STREAM_READ_TIMEOUT)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self {
            client,
            stream_client,
        })
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TransportError::Status {
            status: status.as_u16(),
        })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let bytes = check_status(response)?
            .bytes()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl EventStreamConnector for HttpTransport {
    fn connect(&self, url: &str) -> Result<Box<dyn Read + Send>, TransportError> {
        debug!("Opening event stream {url}");
        let response = self
            .stream_client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Box::new(HttpEventStream(check_status(response)?)))
    }
}

struct HttpEventStream(reqwest::blocking::Response);

impl Read for HttpEventStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|err| {
            let timed_out = err.kind() == io::ErrorKind::TimedOut
                || err
                    .get_ref()
                    .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
                    .is_some_and(reqwest::Error::is_timeout);
            if timed_out {
                io::Error::new(io::ErrorKind::TimedOut, err)
            } else {
                err
            }
        })
    }
}
