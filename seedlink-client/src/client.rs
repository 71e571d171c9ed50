//! The Connection Loop: the state machine applications drive by calling
//! [`SeedLinkClient::collect`] in a tight loop.
//!
//! One invocation performs at most one state advance — open the transport,
//! run the Negotiator, read and frame one packet, or service a timer — and
//! returns promptly, matching the reference implementation's non-blocking
//! polling contract rather than holding the caller inside one giant await.

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use seedlink_rs_protocol::{Command, InfoLevel, ProtocolVersion, Response, SequenceNumber};

use crate::auth::AuthCallbacks;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::logger::{LogLevel, Logger};
use crate::negotiate;
use crate::receive::{Control, ReceivePipeline, StepOutcome};
use crate::state::{ConnectionState, Link, PacketInfo, Query, ServerInfo};
use crate::statefile;
use crate::stream_table::StreamTable;
use crate::transport::{TcpTransport, Transport};

/// Poll cadence for a blocking-mode read with nothing pending.
const BLOCKING_POLL: Duration = Duration::from_millis(500);
/// Poll cadence for a non-blocking-mode read.
const NONBLOCKING_POLL: Duration = Duration::from_millis(1);
/// One read syscall's worth of scratch space; the ring buffer absorbs it.
const READ_CHUNK: usize = 4096;
/// Ceiling on a single negotiation response line, to bound a misbehaving peer.
const MAX_LINE_LEN: usize = 4096;

/// What one [`SeedLinkClient::collect`] invocation produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Status {
    /// A complete packet is ready; read it via [`SeedLinkClient::packet`]
    /// and the bytes written into `collect`'s `out` buffer.
    Packet,
    /// Nothing to report this round. Call again.
    NoPacket,
    /// The packet's `payload_len` exceeded `out`; enlarge the buffer and
    /// call again. Nothing was lost — `payload_collected` is preserved.
    TooLarge,
    /// The connection ended, gracefully or fatally. Calling `collect` again
    /// reconnects (after `netdly`) unless [`SeedLinkClient::terminate`] was
    /// requested.
    Terminate,
}

/// Async SeedLink client: owns the socket, the Stream Table, and every
/// timer the Connection Loop services.
pub struct SeedLinkClient {
    config: ClientConfig,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    pipeline: Option<ReceivePipeline>,
    stream_table: StreamTable,
    version: ProtocolVersion,
    server_info: Option<ServerInfo>,
    supports_time: bool,
    supports_lastpkttime: bool,
    batch_mode: bool,
    pending_info: Option<InfoLevel>,
    terminate_requested: bool,
    auth: Option<AuthCallbacks>,
    logger: Logger,
}

impl SeedLinkClient {
    /// New client, not yet connected. Call `set_address`, `add_stream`/
    /// `set_uni_params`, then drive `collect` in a loop.
    pub fn new(client_name: impl Into<String>) -> Self {
        Self::with_config(ClientConfig::new(client_name, None))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            state: ConnectionState::new(),
            pipeline: None,
            stream_table: StreamTable::new(),
            version: ProtocolVersion::V3,
            server_info: None,
            supports_time: false,
            supports_lastpkttime: false,
            batch_mode: false,
            pending_info: None,
            terminate_requested: false,
            auth: None,
            logger: Logger::default(),
        }
    }

    // ---- configuration ----

    pub fn set_address(&mut self, addr: &str) -> Result<()> {
        self.config.set_address(addr)
    }

    pub fn set_time_window(&mut self, begin: Option<String>, end: Option<String>) {
        self.config.set_time_window(begin, end);
    }

    pub fn set_keepalive(&mut self, seconds: u64) {
        self.config.set_keepalive(seconds);
    }

    pub fn set_netto(&mut self, seconds: u64) {
        self.config.set_netto(seconds);
    }

    pub fn set_netdly(&mut self, seconds: u64) {
        self.config.set_netdly(seconds);
    }

    pub fn set_iotimeout(&mut self, seconds: u64) {
        self.config.set_iotimeout(seconds);
    }

    pub fn set_nonblocking(&mut self, value: bool) {
        self.config.set_nonblocking(value);
    }

    pub fn set_dialup(&mut self, value: bool) {
        self.config.set_dialup(value);
    }

    pub fn set_batch(&mut self, value: bool) {
        self.config.set_batch(value);
    }

    pub fn set_auth_callbacks(&mut self, callbacks: AuthCallbacks) {
        self.auth = Some(callbacks);
    }

    pub fn add_stream(&mut self, station_id: impl Into<String>, selectors: Option<String>) -> Result<()> {
        self.stream_table.add(station_id, selectors, None, None)
    }

    /// Like [`Self::add_stream`], resuming from a specific sequence number
    /// and/or last-packet timestamp instead of "next available".
    pub fn add_stream_resuming(
        &mut self,
        station_id: impl Into<String>,
        selectors: Option<String>,
        seq: Option<SequenceNumber>,
        timestamp: Option<String>,
    ) -> Result<()> {
        self.stream_table.add(station_id, selectors, seq, timestamp)
    }

    pub fn set_uni_params(&mut self, selectors: Option<String>) -> Result<()> {
        self.stream_table.set_uni(selectors, None, None)
    }

    /// Like [`Self::set_uni_params`], resuming from a specific sequence
    /// number and/or last-packet timestamp instead of "next available".
    pub fn set_uni_params_resuming(
        &mut self,
        selectors: Option<String>,
        seq: Option<SequenceNumber>,
        timestamp: Option<String>,
    ) -> Result<()> {
        self.stream_table.set_uni(selectors, seq, timestamp)
    }

    /// Queue an `INFO <level>` request. Sent as soon as the connection is
    /// streaming and no other query is in flight.
    pub fn request_info(&mut self, level: InfoLevel) -> Result<()> {
        if self.pending_info.is_some() || self.state.query != Query::None {
            return Err(ClientError::InfoRequestPending);
        }
        self.pending_info = Some(level);
        Ok(())
    }

    /// Ask the Connection Loop to wind down on its next invocation.
    pub fn terminate(&mut self) {
        self.terminate_requested = true;
    }

    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<()> {
        statefile::save_state(&self.stream_table, path)
    }

    pub fn recover_state(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        statefile::recover_state(&mut self.stream_table, path)
    }

    /// Descriptor of the packet most recently completed by `collect`.
    pub fn packet(&self) -> Option<&PacketInfo> {
        self.pipeline.as_ref().map(ReceivePipeline::packet)
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub fn stream_table(&self) -> &StreamTable {
        &self.stream_table
    }

    // ---- the Connection Loop ----

    /// Advance the connection by one step. Callers invoke this in a loop;
    /// `out` receives payload bytes when the result is [`Status::Packet`].
    pub async fn collect(&mut self, out: &mut [u8]) -> Result<Status> {
        let now = Instant::now();

        if self.terminate_requested && self.state.link != Link::Down {
            self.teardown(now).await;
            self.terminate_requested = false;
            return Ok(Status::Terminate);
        }

        match self.state.link {
            Link::Down => self.advance_down(now).await,
            Link::Up => self.advance_up(now).await,
            Link::Streaming => self.advance_streaming(now, out).await,
        }
    }

    async fn advance_down(&mut self, now: Instant) -> Result<Status> {
        if let Some(deadline) = self.state.netdly_deadline {
            if now < deadline {
                let poll = if self.config.nonblocking {
                    NONBLOCKING_POLL
                } else {
                    BLOCKING_POLL.min(deadline.saturating_duration_since(now))
                };
                tokio::time::sleep(poll).await;
                return Ok(Status::NoPacket);
            }
        }

        let addr = self.config.address();
        debug!(addr = %addr, "opening transport");
        match TcpTransport::connect(&addr, self.config.iotimeout).await {
            Ok(transport) => {
                self.transport = Some(Box::new(transport));
                self.state.reset_timers(now, self.config.netto, self.config.keepalive);
                self.state.link = Link::Up;
                Ok(Status::NoPacket)
            }
            Err(err) => {
                self.logger
                    .log(LogLevel::Error, 0, &format!("connect to {addr} failed: {err}"));
                self.state.netdly_deadline = Some(now + self.config.netdly);
                Ok(Status::NoPacket)
            }
        }
    }

    async fn advance_up(&mut self, now: Instant) -> Result<Status> {
        match self.negotiate().await {
            Ok(()) => {
                info!(version = %self.version, "streaming");
                self.pipeline = Some(ReceivePipeline::new(self.version));
                self.state.link = Link::Streaming;
                Ok(Status::NoPacket)
            }
            Err(err) => {
                self.logger
                    .log(LogLevel::Error, 0, &format!("negotiation failed: {err}"));
                self.teardown(now).await;
                Ok(Status::NoPacket)
            }
        }
    }

    async fn advance_streaming(&mut self, now: Instant, out: &mut [u8]) -> Result<Status> {
        if self.pending_info.is_some() && self.state.query == Query::None {
            self.send_pending_info().await?;
        }

        if let Err(err) = self.fill_ring().await {
            self.logger.log(LogLevel::Error, 0, &format!("read error: {err}"));
            self.teardown(now).await;
            return Ok(Status::NoPacket);
        }

        let timestamp = now_timestamp(now);
        loop {
            let outcome = {
                let pipeline = self.pipeline.as_mut().expect("streaming implies a pipeline");
                pipeline.step(out, &mut self.stream_table, &mut self.state.query, &timestamp)
            };

            match outcome {
                Ok(StepOutcome::NeedMoreData) => break,
                Ok(StepOutcome::Suppressed) | Ok(StepOutcome::Duplicate) => continue,
                Ok(StepOutcome::TooLarge) => return Ok(Status::TooLarge),
                Ok(StepOutcome::PacketReady) => {
                    self.state.reset_timers(now, self.config.netto, self.config.keepalive);
                    return Ok(Status::Packet);
                }
                Ok(StepOutcome::Control(Control::End)) => {
                    info!("server sent END, closing");
                    self.teardown(now).await;
                    return Ok(Status::Terminate);
                }
                Ok(StepOutcome::Control(Control::Error(message))) => {
                    self.logger.log(LogLevel::Error, 0, &format!("server error: {message}"));
                    self.teardown(now).await;
                    return Ok(Status::Terminate);
                }
                Err(err) => {
                    self.logger.log(LogLevel::Error, 0, &format!("framing error: {err}"));
                    self.teardown(now).await;
                    return Ok(Status::Terminate);
                }
            }
        }

        self.service_timers(now).await
    }

    async fn fill_ring(&mut self) -> Result<()> {
        let poll = if self.config.nonblocking {
            NONBLOCKING_POLL
        } else {
            BLOCKING_POLL
        };
        let transport = self.transport.as_mut().expect("streaming implies a transport");
        let mut chunk = [0u8; READ_CHUNK];
        match tokio::time::timeout(poll, transport.read(&mut chunk)).await {
            Ok(Ok(0)) => Err(ClientError::Disconnected),
            Ok(Ok(n)) => {
                self.pipeline
                    .as_mut()
                    .expect("streaming implies a pipeline")
                    .feed(&chunk[..n]);
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Ok(()), // poll window elapsed with nothing to read
        }
    }

    async fn service_timers(&mut self, now: Instant) -> Result<Status> {
        if self.state.keepalive_deadline.is_none() {
            if let Some(keepalive) = self.config.keepalive {
                self.state.keepalive_deadline = Some(now + keepalive);
            }
        }

        if let Some(deadline) = self.state.keepalive_deadline {
            if now >= deadline && self.state.query == Query::None {
                trace!("keepalive due, sending INFO ID");
                let transport = self.transport.as_mut().expect("streaming implies a transport");
                if write_command(transport, &Command::Info { level: InfoLevel::Id }, self.version)
                    .await
                    .is_ok()
                {
                    self.state.query = Query::KeepaliveInFlight;
                }
                if let Some(keepalive) = self.config.keepalive {
                    self.state.keepalive_deadline = Some(now + keepalive);
                }
            }
        }

        if let Some(deadline) = self.state.netto_deadline {
            if now >= deadline {
                self.logger.log(LogLevel::Error, 0, "idle timeout, reconnecting");
                self.teardown(now).await;
                return Ok(Status::NoPacket);
            }
        }

        Ok(Status::NoPacket)
    }

    async fn send_pending_info(&mut self) -> Result<()> {
        let level = self.pending_info.take().expect("checked by caller");
        let transport = self.transport.as_mut().expect("streaming implies a transport");
        write_command(transport, &Command::Info { level }, self.version).await?;
        self.state.query = Query::InfoInFlight;
        Ok(())
    }

    async fn teardown(&mut self, now: Instant) {
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close().await;
        }
        self.pipeline = None;
        self.state.link = Link::Down;
        self.state.query = Query::None;
        self.state.netdly_deadline = Some(now + self.config.netdly);
    }

    // ---- negotiation ----

    async fn negotiate(&mut self) -> Result<()> {
        let transport = self.transport.as_mut().expect("Link::Up implies a transport");

        write_command(transport, &Command::Hello, ProtocolVersion::V3).await?;
        let line1 = read_line(transport, self.config.iotimeout).await?;
        let line2 = read_line(transport, self.config.iotimeout).await?;
        let hello = Response::parse_hello(&line1, &line2)?;
        let Response::Hello {
            software,
            version,
            extra,
            organization,
        } = hello
        else {
            return Err(ClientError::UnexpectedResponse("expected HELLO response".into()));
        };

        let capabilities = negotiate::parse_capabilities(&extra);
        let (server_major, server_minor) = negotiate::parse_version(&version).unwrap_or((3, 0));

        if let Some(auth) = self.auth.clone() {
            let value = auth.value();
            let response = self.send_and_ack(Command::Auth { value }).await?;
            let accepted = matches!(response, Response::Ok);
            auth.finish(accepted);
            if !accepted {
                return Err(ClientError::NegotiationFailed("AUTH rejected".into()));
            }
        }

        self.version = ProtocolVersion::V3;
        if self.config.prefer_v4 && negotiate::supports_v4(&capabilities) {
            let target = negotiate::highest_slproto(&capabilities).unwrap_or((4, 0));
            let transport = self.transport.as_mut().expect("Link::Up implies a transport");
            write_command(
                transport,
                &Command::SlProto {
                    version: format!("{}.{}", target.0, target.1),
                },
                ProtocolVersion::V4,
            )
            .await?;
            let line = read_line(transport, self.config.iotimeout).await?;
            match Response::parse_line(&line)? {
                Response::Ok => self.version = ProtocolVersion::V4,
                Response::Error { description, .. } => {
                    warn!(%description, "SLPROTO rejected, staying on v3");
                }
                other => {
                    return Err(ClientError::UnexpectedResponse(format!("unexpected SLPROTO reply: {other:?}")));
                }
            }
        }

        let mut negotiated_capabilities = capabilities;
        if self.version == ProtocolVersion::V4 {
            let response = self.send_and_ack(Command::GetCapabilities).await?;
            if let Response::Error { description, .. } = response {
                return Err(ClientError::NegotiationFailed(format!(
                    "GETCAPABILITIES rejected: {description}"
                )));
            }
            let transport = self.transport.as_mut().expect("Link::Up implies a transport");
            let line = read_line(transport, self.config.iotimeout).await?;
            negotiated_capabilities = negotiate::parse_capabilities(&line);
        }

        self.supports_time = match self.version {
            ProtocolVersion::V4 => negotiate::has_capability(&negotiated_capabilities, "TIME"),
            ProtocolVersion::V3 => negotiate::version_at_least(server_major, server_minor, 2, 92),
        };
        self.supports_lastpkttime = match self.version {
            ProtocolVersion::V4 => true,
            ProtocolVersion::V3 => negotiate::version_at_least(server_major, server_minor, 2, 93),
        };

        if self.version == ProtocolVersion::V3
            && !self.stream_table.is_uni_mode()
            && self.stream_table.len() > 1
            && !negotiate::version_at_least(server_major, server_minor, 2, 5)
        {
            return Err(ClientError::NegotiationFailed(
                "server does not support multi-station mode".into(),
            ));
        }

        if self.config.batch
            && self.version == ProtocolVersion::V3
            && negotiate::version_at_least(server_major, server_minor, 3, 1)
        {
            let response = self.send_and_ack(Command::Batch).await?;
            if matches!(response, Response::Ok) {
                self.batch_mode = true;
            }
        }

        if self.version == ProtocolVersion::V4 {
            let cmd = negotiate::useragent_command(&self.config.client_name, self.config.client_version.as_deref());
            self.send_and_ack(cmd).await?;
        }

        self.server_info = Some(ServerInfo {
            software,
            version,
            organization,
            capabilities: negotiated_capabilities,
        });

        self.negotiate_streams().await
    }

    async fn negotiate_streams(&mut self) -> Result<()> {
        let entries: Vec<_> = self.stream_table.iter().cloned().collect();
        if entries.is_empty() {
            return Err(ClientError::NegotiationFailed("no subscriptions configured".into()));
        }

        let time_window = self.config.time_window.clone();
        let mut accepted = 0usize;

        for entry in &entries {
            let commands = negotiate::station_commands(
                entry,
                self.version,
                self.config.dialup,
                time_window.as_ref(),
                self.supports_time,
                self.supports_lastpkttime,
            );
            let mut station_ok = true;
            for cmd in commands {
                match self.send_and_ack(cmd).await {
                    Ok(Response::Error { description, .. }) => {
                        warn!(station = %entry.station_id, %description, "station command rejected");
                        station_ok = false;
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(station = %entry.station_id, %err, "station command failed");
                        station_ok = false;
                        break;
                    }
                }
            }
            if station_ok {
                accepted += 1;
            }
        }

        if accepted == 0 {
            return Err(ClientError::AllSubscriptionsRejected);
        }

        let uni_no_end = self.version == ProtocolVersion::V3 && self.stream_table.is_uni_mode();
        if !uni_no_end {
            self.send_and_ack(Command::End).await?;
        }

        Ok(())
    }

    /// Send one command and, unless batch mode suppresses acknowledgement,
    /// read and parse the reply line.
    async fn send_and_ack(&mut self, cmd: Command) -> Result<Response> {
        let transport = self.transport.as_mut().expect("Link::Up implies a transport");
        write_command(transport, &cmd, self.version).await?;
        if self.batch_mode {
            return Ok(Response::Ok);
        }
        let line = read_line(transport, self.config.iotimeout).await?;
        Response::parse_line(&line).map_err(ClientError::Protocol)
    }
}

async fn write_command(transport: &mut Box<dyn Transport>, cmd: &Command, version: ProtocolVersion) -> Result<()> {
    trace!(?cmd, %version, "sending");
    let bytes = cmd.to_bytes(version)?;
    transport.write_all(&bytes).await
}

/// Read one `\r\n`-terminated line, one byte at a time — negotiation is
/// low-volume, and `Transport` offers no buffered reader of its own.
async fn read_line(transport: &mut Box<dyn Transport>, timeout: Duration) -> Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = tokio::time::timeout(timeout, transport.read(&mut byte))
            .await
            .map_err(|_| ClientError::Timeout(timeout))??;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n") {
            break;
        }
        if buf.len() > MAX_LINE_LEN {
            return Err(ClientError::UnexpectedResponse("response line too long".into()));
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// ISO-8601 UTC timestamp for the Stream Table's `last_time` field.
/// `now` is a monotonic `Instant`, so this reports wall-clock time at the
/// instant of the call rather than deriving it from `now`.
fn now_timestamp(_now: Instant) -> String {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = since_epoch.as_secs();
    let millis = since_epoch.subsec_millis();
    format_unix_utc(secs, millis)
}

/// Minimal civil-calendar conversion (no leap seconds), matching the
/// precision the Stream Table needs for `last_time` bookkeeping.
fn format_unix_utc(secs: u64, millis: u32) -> String {
    const DAYS_PER_400Y: i64 = 146097;
    let days = secs as i64 / 86400;
    let rem = secs as i64 % 86400;
    let (hour, minute, second) = (rem / 3600, (rem % 3600) / 60, rem % 60);

    let z = days + 719468;
    let era = if z >= 0 { z } else { z - DAYS_PER_400Y + 1 } / DAYS_PER_400Y;
    let doe = z - era * DAYS_PER_400Y;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };

    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{millis:03}Z")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_starts_down() {
        let client = SeedLinkClient::new("test-client");
        assert_eq!(client.server_info(), None);
        assert!(client.packet().is_none());
    }

    #[test]
    fn request_info_rejects_second_pending() {
        let mut client = SeedLinkClient::new("test-client");
        client.request_info(InfoLevel::Id).unwrap();
        assert!(matches!(
            client.request_info(InfoLevel::Stations),
            Err(ClientError::InfoRequestPending)
        ));
    }

    #[test]
    fn format_unix_utc_epoch() {
        assert_eq!(format_unix_utc(0, 0), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn format_unix_utc_known_date() {
        // 2024-01-02T03:04:05Z
        assert_eq!(format_unix_utc(1_704_164_645, 250), "2024-01-02T03:04:05.250Z");
    }

    #[tokio::test]
    async fn collect_before_connect_attempts_transport() {
        let mut client = SeedLinkClient::new("test-client");
        client.set_address("127.0.0.1:1").unwrap();
        client.add_stream("IU_ANMO", None).unwrap();
        let mut out = [0u8; 64];
        // Port 1 is reserved and nothing listens there: expect a prompt
        // non-fatal failure that arms the reconnect-delay timer.
        let status = client.collect(&mut out).await.unwrap();
        assert_eq!(status, Status::NoPacket);
        assert_eq!(client.state.link, Link::Down);
        assert!(client.state.netdly_deadline.is_some());
    }
}
