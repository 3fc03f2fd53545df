//! Transport layer for RPC frames
//!
//! Opens one stream per call (TCP or Unix domain socket), optionally wraps it
//! in TLS, and exchanges length-prefixed frames over it:
//!
//! ```text
//! [4-byte big-endian length] [serialized body]
//! ```

pub mod tls;

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

pub use tls::TlsSettings;

/// Largest frame body accepted from a peer (100 MB)
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Any bidirectional byte stream a transport can run over
pub trait RpcStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> RpcStream for T {}

pub type BoxedStream = Box<dyn RpcStream>;

/// Where a client connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl Endpoint {
    /// Open the underlying transport-level connection
    pub async fn open(&self) -> io::Result<BoxedStream> {
        match self {
            Endpoint::Tcp { host, port } => {
                let stream = tokio::net::TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix { path } => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                Ok(Box::new(stream))
            }
            #[cfg(not(unix))]
            Endpoint::Unix { .. } => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Unix domain sockets are not supported on this platform",
            )),
        }
    }

    /// Host name presented for TLS server verification
    pub fn server_name(&self) -> &str {
        match self {
            Endpoint::Tcp { host, .. } => host,
            Endpoint::Unix { .. } => "localhost",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Frame-level transport for a single connection
#[async_trait]
pub trait Transport: Send {
    /// Write one frame body
    async fn write_frame(&mut self, body: &[u8]) -> io::Result<()>;

    /// Read one frame body
    async fn read_frame(&mut self) -> io::Result<Vec<u8>>;

    /// Close the connection
    async fn close(&mut self) -> io::Result<()>;

    /// Get transport description for logging
    fn description(&self) -> String;
}

/// Length-prefixed framing over any [`RpcStream`]
pub struct FramedTransport<S> {
    stream: S,
    description: String,
}

impl<S: RpcStream> FramedTransport<S> {
    pub fn new(stream: S, description: impl Into<String>) -> Self {
        Self {
            stream,
            description: description.into(),
        }
    }
}

#[async_trait]
impl<S: RpcStream> Transport for FramedTransport<S> {
    async fn write_frame(&mut self, body: &[u8]) -> io::Result<()> {
        frame::write(&mut self.stream, body).await
    }

    async fn read_frame(&mut self) -> io::Result<Vec<u8>> {
        frame::read(&mut self.stream).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

/// Helpers for the length-prefixed frame format
pub mod frame {
    use super::*;

    /// Encode a frame body with its length prefix
    pub fn encode(body: &[u8]) -> io::Result<Vec<u8>> {
        let len = u32::try_from(body.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "frame body exceeds u32::MAX bytes")
        })?;
        let mut buf = Vec::with_capacity(4 + body.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(body);
        Ok(buf)
    }

    /// Write a length prefix followed by the body, then flush
    pub async fn write<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, body: &[u8]) -> io::Result<()> {
        let buf = encode(body)?;
        writer.write_all(&buf).await?;
        writer.flush().await?;

        trace!("Sent frame: {} bytes", body.len());
        Ok(())
    }

    /// Read one frame. A clean EOF before the prefix is reported as `UnexpectedEof`.
    pub async fn read<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
        let len = reader.read_u32().await? as usize;

        if len > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Frame too large: {} bytes (max {} bytes)", len, MAX_FRAME_SIZE),
            ));
        }

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;

        trace!("Received frame: {} bytes", len);
        Ok(body)
    }
}
