//! Stdout response sink.

use std::io;

use async_trait::async_trait;
use relay_core::protocol::{ResponseSink, StreamingSink};
use tokio::io::{AsyncWriteExt, Stdout};

/// Streams wire parts to stdout.
///
/// Headers have no place on stdout; they are echoed to stderr when
/// `show_headers` is set and dropped otherwise.
pub struct StdoutSink {
    stdout: Stdout,
    show_headers: bool,
}

impl StdoutSink {
    pub fn new(show_headers: bool) -> Self {
        Self {
            stdout: tokio::io::stdout(),
            show_headers,
        }
    }
}

impl ResponseSink for StdoutSink {
    fn into_streaming(self: Box<Self>) -> Option<Box<dyn StreamingSink>> {
        Some(self)
    }
}

#[async_trait]
impl StreamingSink for StdoutSink {
    fn set_header(&mut self, name: &str, value: &str) {
        if self.show_headers {
            eprintln!("{}: {}", name, value);
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.write(buf).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush().await
    }
}
