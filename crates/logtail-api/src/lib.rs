// logtail-api: session authorization and websocket transport for request-log streaming

pub mod error;
pub mod message;
pub mod session;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use message::{IncomingMessage, RequestLogEvent};
pub use session::{SessionClient, SessionDescriptor};
pub use transport::TransportConfig;
pub use websocket::{StreamState, WebSocketClient, WebSocketConfig};
