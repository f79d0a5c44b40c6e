//! WebSocket transport
//!
//! One envelope per WebSocket message. Outgoing envelopes are sent as text
//! frames; inbound text and binary frames are both decoded as JSON. Ping and
//! pong frames are answered by tungstenite and skipped here. A close frame or
//! the end of the stream reads as `Error::ConnectionClosed`.
//!
//! ```rust,no_run
//! use rpclink_engine::{Rpc, WsTransport};
//!
//! #[tokio::main]
//! async fn main() -> rpclink_core::Result<()> {
//!     let (stream, _) = tokio_tungstenite::connect_async("ws://127.0.0.1:8080")
//!         .await
//!         .map_err(|e| rpclink_core::Error::WebSocket(e.to_string()))?;
//!
//!     let link = Rpc::new().attach(WsTransport::new(stream), ());
//!     link.run().await
//! }
//! ```

use crate::transport::{EnvelopeSink, EnvelopeSource, Transport};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rpclink_core::{codec, Envelope, Error, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

/// JSON envelopes over an established WebSocket
pub struct WsTransport<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a connected (client or server side) WebSocket stream
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn split(self) -> (Box<dyn EnvelopeSource>, Box<dyn EnvelopeSink>) {
        let (sink, stream) = self.stream.split();
        (Box::new(WsSource { stream }), Box::new(WsSink { sink }))
    }
}

struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> EnvelopeSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self, into: &mut Envelope) -> Result<()> {
        while let Some(frame) = self.stream.next().await {
            match frame.map_err(ws_error)? {
                Message::Text(text) => return codec::decode_into(&text, into),
                Message::Binary(bytes) => {
                    *into = codec::decode_slice(&bytes)?;
                    return Ok(());
                }
                Message::Close(frame) => {
                    tracing::debug!(?frame, "WebSocket closed by peer");
                    return Err(Error::ConnectionClosed);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
        Err(Error::ConnectionClosed)
    }
}

struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> EnvelopeSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let text = codec::encode(envelope)?;
        self.sink.send(Message::Text(text)).await.map_err(ws_error)
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await.map_err(ws_error)
    }
}

fn ws_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            Error::ConnectionClosed
        }
        other => Error::WebSocket(other.to_string()),
    }
}
