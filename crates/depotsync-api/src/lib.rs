// depotsync-api: request/response correlation over a shared WebSocket, plus HTTP job polling

pub mod error;
pub mod jobs;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use jobs::{JobClient, JobHandle, JobKind, JobStatus, PollConfig, poll_request};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{
    ConnectionState, Handler, InboundMessage, ReconnectConfig, Reply, SocketConfig, SocketHandle,
    WsConnector,
};
