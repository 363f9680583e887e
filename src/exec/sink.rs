// src/exec/sink.rs

//! Destinations for hook process output.

use std::io;
use std::sync::Arc;

use tracing::info;

/// Receives process output one line at a time.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Production sink: every line becomes an INFO event tagged with the source.
#[derive(Debug, Clone)]
pub struct TracingSink {
    source: String,
}

impl TracingSink {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl OutputSink for TracingSink {
    fn write_line(&self, line: &str) {
        info!(source = %self.source, "{}", line);
    }
}

/// [`io::Write`] adapter over an [`OutputSink`].
///
/// Each `write` call is forwarded as a single line (one trailing newline is
/// stripped) and always reports the whole buffer as written.
pub struct SinkWriter {
    sink: Arc<dyn OutputSink>,
}

impl SinkWriter {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }
}

impl io::Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let line = text
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(&*text);
        self.sink.write_line(line);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
