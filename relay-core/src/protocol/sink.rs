//! Response sinks the wire protocol is written to.
//!
//! A sink is only usable for streaming if it can push each part to the
//! client as soon as it is written. That capability is resolved exactly once,
//! through [`ResponseSink::into_streaming`], when the stream starts.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

/// An output the HTTP layer hands to the protocol writer.
pub trait ResponseSink: Send {
    /// Resolve the incremental-flush capability of this sink.
    ///
    /// Returns `None` if the sink can only deliver a fully buffered body.
    fn into_streaming(self: Box<Self>) -> Option<Box<dyn StreamingSink>>;
}

/// A sink that delivers bytes to the client incrementally.
#[async_trait]
pub trait StreamingSink: Send {
    /// Set a response header. Only called before the first write.
    fn set_header(&mut self, name: &str, value: &str);

    /// Write `buf`, returning how many bytes were accepted.
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Push buffered bytes to the client.
    async fn flush(&mut self) -> io::Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    headers: Vec<(String, String)>,
    buffer: Vec<u8>,
    flushes: usize,
}

/// In-memory streaming sink.
///
/// Clones share the same buffer, so a caller can keep one handle and give
/// the other to a [`StreamWriter`](super::StreamWriter).
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Everything written so far, decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock().buffer).into_owned()
    }

    /// Written lines without their trailing newline.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    /// Headers set on the sink, in order.
    pub fn headers(&self) -> Vec<(String, String)> {
        self.lock().headers.clone()
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<String> {
        self.lock()
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// Number of flushes performed.
    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }
}

impl ResponseSink for MemorySink {
    fn into_streaming(self: Box<Self>) -> Option<Box<dyn StreamingSink>> {
        Some(self)
    }
}

#[async_trait]
impl StreamingSink for MemorySink {
    fn set_header(&mut self, name: &str, value: &str) {
        self.lock()
            .headers
            .push((name.to_string(), value.to_string()));
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.lock().flushes += 1;
        Ok(())
    }
}
