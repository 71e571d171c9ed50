//! Transport abstraction between the Connection Loop and the wire.
//!
//! Kept as a trait (rather than hard-wiring `TcpStream`) so TLS or a
//! test double can stand in without touching `client.rs`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{ClientError, Result};

/// Read/write/close primitives the Connection Loop needs from a socket.
pub trait Transport: Send {
    fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>>;
    fn write_all<'a>(&'a mut self, data: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn close<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Plain TCP transport, the only one the core ships with.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout(connect_timeout))?
            .map_err(ClientError::Io)?;
        stream.set_nodelay(true).ok();
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>> {
        Box::pin(async move { self.stream.read(buf).await.map_err(ClientError::Io) })
    }

    fn write_all<'a>(&'a mut self, data: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.stream.write_all(data).await.map_err(ClientError::Io)?;
            self.stream.flush().await.map_err(ClientError::Io)
        })
    }

    fn close<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.stream.shutdown().await.map_err(ClientError::Io) })
    }
}
