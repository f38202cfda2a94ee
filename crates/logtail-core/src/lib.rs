// logtail-core: session coordination and request-log rendering on top of logtail-api.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod output;
pub mod render;
pub mod session;
pub mod signal;
pub mod status;
pub mod tailer;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_API_BASE, DEFAULT_FEATURE, OutputFormat, TailerConfig};
pub use dispatch::Dispatcher;
pub use error::CoreError;
pub use output::{OutputSink, SharedBuffer};
pub use render::{EventPayload, StatusColor, status_color};
pub use session::{Authorizer, Transport, TransportFactory, TransportOptions, WebSocketFactory};
pub use status::{LineStatus, StatusIndicator};
pub use tailer::{READY_MESSAGE, RunState, ShutdownHandle, Tailer};

// Wire-level types consumers need alongside the core API.
pub use logtail_api::{IncomingMessage, RequestLogEvent, SessionDescriptor, StreamState};
