use std::sync::{Arc, Mutex};

use srvhooks::exec::OutputSink;

/// An output sink that keeps every line it receives.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl OutputSink for CollectingSink {
    fn write_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}
