/// Bounded collection of a child's combined stdout/stderr
/// Both streams are redirected into one pipe, so the text keeps the order the
/// solver wrote it in. A reader thread drains the pipe continuously (the child
/// never blocks on a full pipe) and hands chunks over a channel; bytes past the
/// limit are counted and dropped.
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const CHUNK_SIZE: usize = 8192;

/// Marker appended when output was cut at the limit
pub const TRUNCATION_MARKER: &str = "[output truncated]";

/// Output integrity classification
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputIntegrity {
    #[default]
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "truncated")]
    Truncated,
    #[serde(rename = "read_error")]
    ReadError,
    #[serde(rename = "collection_timeout")]
    CollectionTimeout,
}

impl std::fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::Truncated => write!(f, "truncated"),
            OutputIntegrity::ReadError => write!(f, "read_error"),
            OutputIntegrity::CollectionTimeout => write!(f, "collection_timeout"),
        }
    }
}

/// Collected output
#[derive(Debug, Clone, Default)]
pub struct CombinedOutput {
    /// Retained bytes (at most the limit)
    pub bytes: Vec<u8>,
    /// Bytes the child wrote, including dropped ones
    pub total_bytes: usize,
    pub integrity: OutputIntegrity,
}

impl CombinedOutput {
    /// Lossy UTF-8 text with surrounding whitespace trimmed
    pub fn text(&self) -> String {
        let text = String::from_utf8_lossy(&self.bytes).trim().to_string();
        if self.integrity == OutputIntegrity::Truncated {
            format!("{}\n{}", text, TRUNCATION_MARKER)
        } else {
            text
        }
    }
}

enum Chunk {
    Data(Vec<u8>),
    Failed(String),
}

/// Handle on a running reader thread
pub struct OutputCollector {
    limit: usize,
    rx: Receiver<Chunk>,
    handle: Option<JoinHandle<()>>,
    output: CombinedOutput,
    closed: bool,
}

impl OutputCollector {
    /// Start draining `stream` on a background thread
    pub fn spawn<R: Read + Send + 'static>(stream: R, limit: usize) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::spawn(move || {
            let mut stream = stream;
            let mut chunk = [0u8; CHUNK_SIZE];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Chunk::Data(chunk[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Chunk::Failed(e.to_string()));
                        break;
                    }
                }
            }
        });

        Self {
            limit,
            rx,
            handle: Some(handle),
            output: CombinedOutput::default(),
            closed: false,
        }
    }

    fn absorb(&mut self, chunk: Chunk) {
        match chunk {
            Chunk::Data(data) => {
                self.output.total_bytes += data.len();
                let room = self.limit.saturating_sub(self.output.bytes.len());
                if data.len() > room {
                    self.output.bytes.extend_from_slice(&data[..room]);
                    self.output.integrity = OutputIntegrity::Truncated;
                } else {
                    self.output.bytes.extend_from_slice(&data);
                }
            }
            Chunk::Failed(err) => {
                log::warn!("Output collection failed: {}", err);
                if self.output.integrity == OutputIntegrity::Complete {
                    self.output.integrity = OutputIntegrity::ReadError;
                }
            }
        }
    }

    /// Absorb whatever has arrived so far without blocking
    pub fn drain(&mut self) {
        while !self.closed {
            match self.rx.try_recv() {
                Ok(chunk) => self.absorb(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.closed = true,
            }
        }
    }

    /// Wait up to `grace` for end-of-stream and return the collected output.
    ///
    /// A descendant that inherited the pipe can hold it open past the child's
    /// exit; in that case the reader is abandoned and the output so far is
    /// returned as `CollectionTimeout`.
    pub fn finish(mut self, grace: Duration) -> CombinedOutput {
        let deadline = Instant::now() + grace;
        while !self.closed {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(chunk) => self.absorb(chunk),
                Err(RecvTimeoutError::Disconnected) => self.closed = true,
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("Output pipe still open {:?} after child exit", grace);
                    if self.output.integrity == OutputIntegrity::Complete {
                        self.output.integrity = OutputIntegrity::CollectionTimeout;
                    }
                    return std::mem::take(&mut self.output);
                }
            }
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        std::mem::take(&mut self.output)
    }
}
