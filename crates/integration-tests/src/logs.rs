//! Captured log output.
//!
//! Installs a JSON `tracing` subscriber on the current thread and keeps every
//! line it writes, so tests can assert on the structured `key` field of sync
//! log lines.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::Level;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Shared buffer behind a thread-local subscriber.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

#[derive(Debug)]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Capture everything logged on this thread until the guard drops.
    ///
    /// `#[tokio::test]` runs on a current-thread runtime, so walks driven
    /// from the test body log through this subscriber.
    #[must_use]
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_max_level(Level::DEBUG)
            .with_ansi(false)
            .with_writer(capture.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    /// Every captured line, parsed.
    #[must_use]
    pub fn lines(&self) -> Vec<Value> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// The `key` field of every sync log line.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lines()
            .iter()
            .filter_map(|line| line.get("key").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// Sync log lines whose key ends with `:{event}`.
    #[must_use]
    pub fn count_event(&self, event: &str) -> usize {
        let suffix = format!(":{event}");
        self.keys().iter().filter(|key| key.ends_with(&suffix)).count()
    }
}
