// Transport seam for the socket handle.
//
// A `Connector` opens one duplex channel per call. The connection loop
// calls it again after every drop, so implementations must be reusable.

use std::pin::Pin;

use futures::future::{self, BoxFuture};
use futures::{Sink, SinkExt, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use url::Url;

use crate::error::Error;

/// A frame surfaced by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, Error>> + Send>>;

/// One open duplex channel.
pub struct Channel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens channels to a single fixed endpoint.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, Result<Channel, Error>>;
}

// ── WsConnector ──────────────────────────────────────────────────────

/// tokio-tungstenite connector.
///
/// If a token is supplied it is sent as `Authorization: Bearer <token>`
/// on the upgrade request. The token is never inspected.
pub struct WsConnector {
    url: Url,
    token: Option<SecretString>,
}

impl WsConnector {
    pub fn new(url: Url, token: Option<SecretString>) -> Self {
        Self { url, token }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn open(&self) -> Result<Channel, Error> {
        tracing::info!(url = %self.url, "Connecting to WebSocket");

        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let mut request = ClientRequestBuilder::new(uri);
        if let Some(ref token) = self.token {
            request = request.with_header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_handshake_error)?;

        let (write, read) = ws_stream.split();

        let sink = write
            .with(|text: String| future::ready(Ok::<_, tungstenite::Error>(Message::text(text))))
            .sink_map_err(|e| Error::WebSocketConnect(e.to_string()));

        let stream = read.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Close(frame)) => Some(Ok(match frame {
                    Some(cf) => Frame::Close {
                        code: u16::from(cf.code),
                        reason: cf.reason.as_str().to_owned(),
                    },
                    None => Frame::Close {
                        code: 1005,
                        reason: String::new(),
                    },
                })),
                Ok(Message::Ping(_)) => {
                    // tungstenite handles pong replies automatically
                    tracing::trace!("WebSocket ping");
                    None
                }
                // Binary, Pong, Frame -- ignore
                Ok(_) => None,
                Err(e) => Some(Err(Error::WebSocketConnect(e.to_string()))),
            })
        });

        Ok(Channel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Channel, Error>> {
        Box::pin(self.open())
    }
}

fn map_handshake_error(err: tungstenite::Error) -> Error {
    if let tungstenite::Error::Http(ref response) = err {
        if response.status() == tungstenite::http::StatusCode::UNAUTHORIZED {
            return Error::Authentication {
                message: "WebSocket upgrade rejected the credential".into(),
            };
        }
    }
    Error::WebSocketConnect(err.to_string())
}
