// Message framing for MCP sessions

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::codec::{
    AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead, FramedWrite, LinesCodec,
    LinesCodecError,
};
use toolmux_core::TransportError;

/// Upper bound for a single newline-delimited message
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Carries whole JSON-RPC messages in both directions
#[async_trait]
pub trait Wire: Send {
    async fn send(&mut self, message: String) -> Result<(), TransportError>;

    /// Next message, or `None` once the peer has closed the stream
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// One message per line over a byte stream pair (child stdio, pipes).
/// Lines are read as raw bytes, so a backend printing non-UTF-8 log output
/// does not break the session.
pub struct LineWire<R, W> {
    reader: FramedRead<R, AnyDelimiterCodec>,
    writer: FramedWrite<W, LinesCodec>,
}

impl<R, W> LineWire<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(
                reader,
                AnyDelimiterCodec::new_with_max_length(
                    b"\n".to_vec(),
                    Vec::new(),
                    MAX_LINE_BYTES,
                ),
            ),
            writer: FramedWrite::new(writer, LinesCodec::new()),
        }
    }
}

#[async_trait]
impl<R, W> Wire for LineWire<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: String) -> Result<(), TransportError> {
        self.writer.send(message).await.map_err(lines_error)
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.reader.next().await {
                None => return Ok(None),
                Some(Ok(chunk)) => {
                    let line = String::from_utf8_lossy(&chunk);
                    let line = line.trim();
                    if !line.is_empty() {
                        return Ok(Some(line.to_string()));
                    }
                }
                Some(Err(err)) => return Err(chunk_error(err)),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::<String>::close(&mut self.writer)
            .await
            .map_err(lines_error)
    }
}

fn chunk_error(err: AnyDelimiterCodecError) -> TransportError {
    match err {
        AnyDelimiterCodecError::MaxChunkLengthExceeded => {
            TransportError::Protocol(format!("message exceeds {} bytes", MAX_LINE_BYTES))
        }
        AnyDelimiterCodecError::Io(err) => TransportError::Io(err.to_string()),
    }
}

fn lines_error(err: LinesCodecError) -> TransportError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            TransportError::Protocol(format!("message exceeds {} bytes", MAX_LINE_BYTES))
        }
        LinesCodecError::Io(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
            TransportError::Closed
        }
        LinesCodecError::Io(err) => TransportError::Io(err.to_string()),
    }
}

/// One message per text frame
pub struct WsWire<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsWire<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> Wire for WsWire<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(message))
            .await
            .map_err(ws_error)
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes).map(Some).map_err(|_| {
                        TransportError::Protocol("binary frame is not UTF-8".to_string())
                    })
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(ws_error(err)),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(err) => Err(ws_error(err)),
        }
    }
}

fn ws_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::Io(other.to_string()),
    }
}
