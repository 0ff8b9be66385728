use crate::error::{AvrError, Result};
use crate::protocol::DELIMITER;
use crate::queue::LineSender;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_LINE_LENGTH: usize = 1024;

/// Byte-stream link to the receiver
///
/// `send` is fire-and-forget: it queues `text` for writing and returns
/// without waiting for the device. Implementations serialize concurrent
/// writers themselves.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, text: &str) -> Result<()>;
}

/// Frames commands and hands them to the transport
#[derive(Clone)]
pub(crate) struct CommandSink {
    transport: Arc<dyn Transport>,
}

impl CommandSink {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn send(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        tracing::debug!("Sending: {}", text);
        self.transport.send(&format!("{}{}", text, DELIMITER))
    }
}

/// TCP (telnet port) transport
///
/// A writer task drains an unbounded channel into the socket; a reader task
/// splits the stream on CR/LF and pushes each line onto the receive queue.
pub struct TcpTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl TcpTransport {
    /// Connect to `host:port` and start delivering lines to `lines`
    pub async fn connect(host: &str, port: u16, lines: LineSender) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        tracing::info!("Connecting to {}", addr);

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| AvrError::Timeout)??;
        stream.set_nodelay(true)?;
        let (read, mut write) = stream.into_split();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = write.write_all(text.as_bytes()).await {
                    tracing::error!("Failed to send {:?}: {}", text.trim_end(), e);
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut frames = FramedRead::new(read, LineCodec::new());
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(bytes) => {
                        let line = String::from_utf8_lossy(&bytes);
                        if line.trim().is_empty() {
                            continue;
                        }
                        tracing::debug!("Received: {}", line);
                        if lines.push(line.into_owned()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Receive error: {}", e);
                        break;
                    }
                }
            }
            tracing::info!("Connection to {} closed", addr);
        });

        Ok(Self { tx })
    }
}

/// CR/LF line framing that drops over-long lines instead of failing
///
/// The inner codec discards up to the next delimiter after reporting an
/// over-long chunk, so decoding simply continues.
struct LineCodec {
    inner: AnyDelimiterCodec,
}

impl LineCodec {
    fn new() -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\r\n".to_vec(),
                DELIMITER.as_bytes().to_vec(),
                MAX_LINE_LENGTH,
            ),
        }
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = AnyDelimiterCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<Bytes>, Self::Error> {
        loop {
            match self.inner.decode(buf) {
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    tracing::warn!("Discarding line longer than {} bytes", MAX_LINE_LENGTH);
                }
                other => return other,
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<Bytes>, Self::Error> {
        loop {
            match self.inner.decode_eof(buf) {
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    tracing::warn!("Discarding line longer than {} bytes", MAX_LINE_LENGTH);
                }
                other => return other,
            }
        }
    }
}

impl Transport for TcpTransport {
    fn send(&self, text: &str) -> Result<()> {
        self.tx
            .send(text.to_string())
            .map_err(|_| AvrError::ConnectionClosed)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn sink_trims_and_terminates() {
        let transport = RecordingTransport::new();
        let sink = CommandSink::new(transport.clone());
        sink.send("  PWON ").unwrap();
        sink.send("").unwrap();
        assert_eq!(transport.raw(), vec!["PWON\r".to_string()]);
    }

    #[tokio::test]
    async fn tcp_transport_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"PWON\rMV50\r\nSICD\r").await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let (lines, mut rx) = crate::queue::channel();
        let transport = TcpTransport::connect("127.0.0.1", port, lines).await.unwrap();
        transport.send("MUON\r").unwrap();

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(rx.recv().await.unwrap());
        }
        assert_eq!(received, vec!["PWON", "MV50", "SICD"]);
        assert_eq!(&server.await.unwrap(), b"MUON\r");
    }

    #[test]
    fn over_long_line_is_skipped() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[b'X'; 2000]);
        buf.extend_from_slice(b"\rPWON\rMV50\r");

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&b"PWON"[..]));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&b"MV50"[..]));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[tokio::test]
    async fn reader_survives_over_long_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut burst = vec![b'X'; 2000];
            burst.extend_from_slice(b"\rPWON\rMV50\r");
            stream.write_all(&burst).await.unwrap();
            // keep the link open until the client is done
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
        });

        let (lines, mut rx) = crate::queue::channel();
        let transport = TcpTransport::connect("127.0.0.1", port, lines).await.unwrap();

        let mut received = Vec::new();
        for _ in 0..2 {
            let line = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
            received.push(line.unwrap());
        }
        assert_eq!(received, vec!["PWON", "MV50"]);

        transport.send("MUON\r").unwrap();
        server.await.unwrap();
    }
}
