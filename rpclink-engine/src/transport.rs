//! Transport abstraction
//!
//! A link needs exactly two things from its connection: read the next
//! envelope, and write one envelope. A [`Transport`] splits into those two
//! halves:
//!
//! - [`EnvelopeSource`]: owned by the connection loop, read sequentially
//! - [`EnvelopeSink`]: shared by every task that sends, serialized by the
//!   link
//!
//! [`LineTransport`] speaks newline-delimited JSON over any tokio byte
//! stream (TCP, Unix sockets, pipes, `tokio::io::duplex`). The WebSocket
//! adapter lives in [`crate::ws`]. Any `(source, sink)` pair is also a
//! transport, which is how custom framings plug in.
//!
//! ```rust,no_run
//! use rpclink_engine::{LineTransport, Rpc};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> rpclink_core::Result<()> {
//!     let stream = TcpStream::connect("127.0.0.1:9000").await?;
//!     let link = Rpc::new().attach(LineTransport::new(stream), ());
//!     link.run().await
//! }
//! ```

use async_trait::async_trait;
use rpclink_core::{codec, Envelope, Error, Result};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};

/// Default upper bound for one inbound envelope (16 MiB)
pub const DEFAULT_MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Reading half of a transport
#[async_trait]
pub trait EnvelopeSource: Send {
    /// Decode the next envelope into `into`
    ///
    /// Returns `Err(Error::ConnectionClosed)` on a clean end of stream.
    async fn recv(&mut self, into: &mut Envelope) -> Result<()>;
}

/// Writing half of a transport
#[async_trait]
pub trait EnvelopeSink: Send {
    /// Encode and write one whole envelope
    async fn send(&mut self, envelope: &Envelope) -> Result<()>;

    /// Close the write direction
    async fn close(&mut self) -> Result<()>;
}

/// A bidirectional envelope stream
pub trait Transport: Send + 'static {
    /// Separate the reading and writing halves
    fn split(self) -> (Box<dyn EnvelopeSource>, Box<dyn EnvelopeSink>);
}

impl<S, K> Transport for (S, K)
where
    S: EnvelopeSource + 'static,
    K: EnvelopeSink + 'static,
{
    fn split(self) -> (Box<dyn EnvelopeSource>, Box<dyn EnvelopeSink>) {
        (Box::new(self.0), Box::new(self.1))
    }
}

/// Newline-delimited JSON over a byte stream
///
/// One envelope per line. Blank lines are skipped and a trailing `\r` is
/// tolerated. Lines longer than the configured limit fail the read with
/// `Error::EnvelopeTooLarge`.
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
    max_envelope_size: usize,
}

impl<S> LineTransport<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a bidirectional stream
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer)
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap separate read and write streams, e.g. stdin/stdout
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            max_envelope_size: DEFAULT_MAX_ENVELOPE_SIZE,
        }
    }

    /// Set the largest accepted inbound line, in bytes
    pub fn with_max_envelope_size(mut self, bytes: usize) -> Self {
        self.max_envelope_size = bytes;
        self
    }
}

impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn split(self) -> (Box<dyn EnvelopeSource>, Box<dyn EnvelopeSink>) {
        let source = LineSource {
            reader: BufReader::new(self.reader),
            line: Vec::new(),
            limit: self.max_envelope_size,
        };
        let sink = LineSink {
            writer: self.writer,
        };
        (Box::new(source), Box::new(sink))
    }
}

struct LineSource<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    limit: usize,
}

#[async_trait]
impl<R> EnvelopeSource for LineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn recv(&mut self, into: &mut Envelope) -> Result<()> {
        loop {
            self.line.clear();
            let read = (&mut self.reader)
                .take((self.limit as u64).saturating_add(1))
                .read_until(b'\n', &mut self.line)
                .await?;

            if read == 0 {
                return Err(Error::ConnectionClosed);
            }
            if self.line.last() != Some(&b'\n') && self.line.len() > self.limit {
                return Err(Error::EnvelopeTooLarge { limit: self.limit });
            }

            let text = std::str::from_utf8(&self.line)
                .map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))?;
            let text = text.trim_end_matches(['\n', '\r']);
            if text.trim().is_empty() {
                continue;
            }

            return codec::decode_into(text, into);
        }
    }
}

struct LineSink<W> {
    writer: W,
}

#[async_trait]
impl<W> EnvelopeSink for LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let line = codec::encode_line(envelope)?;
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
