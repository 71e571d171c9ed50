//! In-process TCP server double for the Connection Loop's negotiation and
//! streaming tests. Not part of the public API; gated behind `#[cfg(test)]`
//! imports from `stream.rs` and the integration tests.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use seedlink_rs_protocol::ProtocolVersion;

/// Scripted behavior for one simulated SeedLink server connection.
pub struct MockConfig {
    pub version: ProtocolVersion,
    pub hello_line1: String,
    pub hello_line2: String,
    /// Sent after `GETCAPABILITIES`'s `OK`, v4 only.
    pub capabilities_line: String,
    pub accept_slproto: bool,
    pub accept_auth: bool,
    /// Raw wire frames streamed once negotiation completes.
    pub frames: Vec<Vec<u8>>,
    /// Uni-station sessions never send `END`; stream as soon as the action
    /// command (`DATA`/`FETCH`/`TIME`) is acked instead of waiting for it.
    pub uni_mode: bool,
    pub close_after_stream: bool,
}

impl MockConfig {
    pub fn v3_default(frames: Vec<Vec<u8>>) -> Self {
        Self {
            version: ProtocolVersion::V3,
            hello_line1: "SeedLink v3.1 (2020.075)".to_owned(),
            hello_line2: "Mock Server".to_owned(),
            capabilities_line: String::new(),
            accept_slproto: false,
            accept_auth: true,
            frames,
            uni_mode: false,
            close_after_stream: false,
        }
    }

    pub fn v4_default(frames: Vec<Vec<u8>>) -> Self {
        Self {
            version: ProtocolVersion::V4,
            hello_line1: "SeedLink v4.0 (mock) :: SLPROTO:4.0 SLPROTO:3.1".to_owned(),
            hello_line2: "Mock Server v4".to_owned(),
            capabilities_line: "SLPROTO:4.0 SLPROTO:3.1 TIME".to_owned(),
            accept_slproto: true,
            accept_auth: true,
            frames,
            uni_mode: false,
            close_after_stream: false,
        }
    }
}

pub struct MockServer {
    addr: SocketAddr,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            Self::handle_connection(listener, config).await;
        });

        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn handle_connection(listener: TcpListener, config: MockConfig) {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        loop {
            line.clear();
            let n = match read_cr_line(&mut reader, &mut line).await {
                Ok(n) => n,
                Err(_) => break,
            };
            if n == 0 {
                break;
            }

            let trimmed = line.trim();
            let upper = trimmed.to_uppercase();
            let mut write_failed = false;

            if upper == "HELLO" {
                let response = format!("{}\r\n{}\r\n", config.hello_line1, config.hello_line2);
                write_failed = write_half.write_all(response.as_bytes()).await.is_err();
            } else if upper.starts_with("AUTH") {
                let reply = if config.accept_auth { "OK" } else { "ERROR AUTH rejected" };
                write_failed = write_line(&mut write_half, reply).await;
            } else if upper.starts_with("SLPROTO") {
                let reply = if config.accept_slproto { "OK" } else { "ERROR UNSUPPORTED unsupported" };
                write_failed = write_line(&mut write_half, reply).await;
            } else if upper == "GETCAPABILITIES" {
                write_failed = write_line(&mut write_half, "OK").await
                    || write_line(&mut write_half, &config.capabilities_line).await;
            } else if upper == "BATCH" || upper.starts_with("USERAGENT") {
                write_failed = write_line(&mut write_half, "OK").await;
            } else if upper.starts_with("STATION") || upper.starts_with("SELECT") {
                write_failed = write_line(&mut write_half, "OK").await;
            } else if upper == "DATA"
                || upper.starts_with("DATA ")
                || upper == "FETCH"
                || upper.starts_with("FETCH ")
                || upper.starts_with("TIME ")
            {
                write_failed = write_line(&mut write_half, "OK").await;
                if !write_failed && config.uni_mode {
                    Self::stream_frames(&mut write_half, &config).await;
                    if config.close_after_stream {
                        break;
                    }
                }
            } else if upper == "END" {
                write_failed = write_line(&mut write_half, "OK").await;
                if !write_failed {
                    Self::stream_frames(&mut write_half, &config).await;
                    if config.close_after_stream {
                        break;
                    }
                }
            } else if upper == "BYE" {
                let _ = write_half.shutdown().await;
                break;
            } else {
                write_failed = write_line(&mut write_half, "ERROR UNSUPPORTED unknown command").await;
            }

            if write_failed {
                break;
            }
        }
    }

    async fn stream_frames(write_half: &mut tokio::net::tcp::OwnedWriteHalf, config: &MockConfig) {
        for frame in &config.frames {
            if write_half.write_all(frame).await.is_err() {
                return;
            }
        }
        let _ = write_half.flush().await;
    }
}

/// Commands are CR-terminated (not CRLF) on the wire; read up to the bare `\r`.
async fn read_cr_line<R: AsyncRead + Unpin>(reader: &mut R, out: &mut String) -> std::io::Result<usize> {
    let mut byte = [0u8; 1];
    let mut n = 0;
    loop {
        let read = reader.read_exact(&mut byte).await;
        match read {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(n),
            Err(e) => return Err(e),
        }
        n += 1;
        if byte[0] == b'\r' {
            return Ok(n);
        }
        out.push(byte[0] as char);
    }
}

async fn write_line(write_half: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) -> bool {
    let mut bytes = line.as_bytes().to_vec();
    bytes.extend_from_slice(b"\r\n");
    if write_half.write_all(&bytes).await.is_err() {
        return true;
    }
    write_half.flush().await.is_err()
}
