// ── Interrupt signals ──
//
// SIGINT and SIGTERM on unix, Ctrl-C elsewhere. Handlers are installed
// when `InterruptSignals` is registered and stay installed for the life
// of the process, so a second signal during shutdown is absorbed rather
// than killing the process mid-cleanup.

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Registered interest in process interrupt signals.
#[derive(Debug)]
pub struct InterruptSignals {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    terminate: Signal,
}

impl InterruptSignals {
    /// Install the handlers. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next signal and return its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler failed, interrupts are ignored");
            std::future::pending::<()>().await;
        }
        "ctrl_c"
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn recv_waits_until_a_signal_arrives() {
        let mut signals = InterruptSignals::register().unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(50), signals.recv()).await;
        assert!(waited.is_err());
    }
}
