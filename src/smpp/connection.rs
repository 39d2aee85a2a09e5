//! Framed SMPP transport over TCP or TLS.
//!
//! Buffered frame I/O: bytes accumulate in a read buffer until a complete
//! length-prefixed PDU can be parsed; writes go through a `BufWriter` and are
//! flushed per frame.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::pdu::{Frame, FrameError};
use super::SmppError;

/// Boxed stream so TCP and TLS sessions share one connection type.
type Transport = Box<dyn AsyncStream>;

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// A framed SMPP session transport.
pub struct Connection {
    stream: BufWriter<Transport>,
    buffer: BytesMut,
}

impl Connection {
    /// Open a transport to the SMSC, optionally wrapped in TLS.
    pub async fn connect(
        host: &str,
        port: u16,
        use_tls: bool,
        timeout: Duration,
    ) -> Result<Self, SmppError> {
        let tcp = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| SmppError::ConnectTimeout)?
            .map_err(SmppError::Io)?;

        tcp.set_nodelay(true).map_err(SmppError::Io)?;

        let stream: Transport = if use_tls {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();

            let server_name = ServerName::try_from(host.to_string())
                .map_err(|e| SmppError::Tls(e.to_string()))?;

            let connector = TlsConnector::from(Arc::new(config));
            let tls = tokio::time::timeout(timeout, connector.connect(server_name, tcp))
                .await
                .map_err(|_| SmppError::ConnectTimeout)?
                .map_err(SmppError::Io)?;

            debug!(host, port, "TLS session established");
            Box::new(tls)
        } else {
            Box::new(tcp)
        };

        Ok(Self::new(stream))
    }

    pub fn new(stream: Transport) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Read a single frame. Returns `None` on clean EOF.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, SmppError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if 0 == self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(SmppError::Io)?
            {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(SmppError::ConnectionReset)
                };
            }
        }
    }

    fn parse_frame(&mut self) -> Result<Option<Frame>, SmppError> {
        let mut cursor = Cursor::new(&self.buffer[..]);

        match Frame::check(&mut cursor) {
            Ok(len) => {
                cursor.set_position(0);
                let frame = Frame::parse(&mut cursor).map_err(|e| match e {
                    FrameError::Incomplete => SmppError::ConnectionReset,
                    FrameError::Codec(c) => SmppError::Codec(c),
                })?;
                self.buffer.advance(len);
                Ok(Some(frame))
            }
            Err(FrameError::Incomplete) => Ok(None),
            Err(FrameError::Codec(e)) => Err(SmppError::Codec(e)),
        }
    }

    /// Write one frame and flush.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), SmppError> {
        let bytes = frame
            .to_bytes()
            .ok_or_else(|| SmppError::Protocol("frame is not writable".into()))?;
        self.write_bytes(&bytes).await
    }

    /// Write raw PDU bytes and flush.
    pub async fn write_bytes(&mut self, bytes: &Bytes) -> Result<(), SmppError> {
        self.stream.write_all(bytes).await.map_err(SmppError::Io)?;
        self.stream.flush().await.map_err(SmppError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smpp::pdu::{EnquireLink, SubmitSm};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_frame_roundtrip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(Box::new(socket));

            // Echo frames back.
            while let Some(frame) = conn.read_frame().await.unwrap() {
                if let Some(bytes) = frame.to_bytes() {
                    conn.write_bytes(&bytes).await.unwrap();
                }
            }
        });

        let socket = TcpStream::connect(addr).await.unwrap();
        let mut conn = Connection::new(Box::new(socket));

        conn.write_frame(&Frame::EnquireLink(EnquireLink::new(5)))
            .await
            .unwrap();
        match conn.read_frame().await.unwrap().unwrap() {
            Frame::EnquireLink(el) => assert_eq!(el.sequence_number, 5),
            other => panic!("expected EnquireLink, got {other:?}"),
        }

        let submit = SubmitSm::new(6, "12345", "+1999", b"payload".to_vec());
        conn.write_frame(&Frame::SubmitSm(submit)).await.unwrap();
        match conn.read_frame().await.unwrap().unwrap() {
            Frame::SubmitSm(sm) => {
                assert_eq!(sm.sequence_number, 6);
                assert_eq!(sm.short_message, b"payload");
            }
            other => panic!("expected SubmitSm, got {other:?}"),
        }

        drop(conn);
        let _ = server.await;
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_error() {
        // RFC 5737 TEST-NET address: either filtered (timeout) or rejected.
        let result =
            Connection::connect("192.0.2.1", 2775, false, Duration::from_millis(50)).await;
        assert!(matches!(
            result,
            Err(SmppError::ConnectTimeout) | Err(SmppError::Io(_))
        ));
    }
}
