// ── Status indicator seam ──
//
// The tailer reports "getting ready" and "ready" transitions through this
// trait. The CLI plugs in a spinner; embedders and tests use `LineStatus`
// or their own recorder.

use tracing::warn;

use crate::output::OutputSink;

/// Transient progress display around session setup.
pub trait StatusIndicator: Send + Sync {
    /// Show `message` while setup is in progress.
    fn begin(&mut self, message: &str);

    /// Replace the in-progress display with `message`.
    fn finish(&mut self, message: &str);

    /// Replace the in-progress display with a failure `message`.
    fn fail(&mut self, message: &str) {
        self.finish(message);
    }
}

/// Writes each status message as a plain line on an [`OutputSink`].
#[derive(Debug, Clone)]
pub struct LineStatus {
    sink: OutputSink,
}

impl LineStatus {
    pub fn new(sink: OutputSink) -> Self {
        Self { sink }
    }

    fn write(&self, message: &str) {
        if let Err(e) = self.sink.write_line(message) {
            warn!(error = %e, "failed to write status line");
        }
    }
}

impl StatusIndicator for LineStatus {
    fn begin(&mut self, message: &str) {
        self.write(message);
    }

    fn finish(&mut self, message: &str) {
        self.write(message);
    }
}
