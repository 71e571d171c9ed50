use tokio::time::Instant;

use seedlink_rs_protocol::{PacketFormat, SequenceNumber};

/// Socket-level state of the Connection Loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Link {
    /// Not connected; waiting out `netdly_deadline` before the next attempt.
    Down,
    /// Transport open, Negotiator not yet run to completion.
    Up,
    /// Negotiator succeeded; the Receive Pipeline is consuming frames.
    Streaming,
}

/// The Receive Pipeline's position within the packet currently being
/// assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Waiting for (or mid-way through) a wire header, or an in-band
    /// `"END"`/`"ERROR"` control token.
    Header,
    /// v4 only: copying the variable-length station identifier.
    StationId,
    /// Copying payload bytes into the caller's buffer.
    Payload,
}

/// Whether the server currently owes an INFO response, so the pipeline
/// knows to suppress delivery of the next INFO payload as a keepalive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Query {
    None,
    InfoInFlight,
    KeepaliveInFlight,
}

/// Descriptor for the packet currently being received, and the one handed
/// back to the caller once `payload_collected == payload_len`.
///
/// Zeroed when the Receive Pipeline enters [`Frame::Header`]; populated
/// field-by-field as framing progresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketInfo {
    pub seq: SequenceNumber,
    pub payload_len: u32,
    pub payload_collected: u32,
    pub payload_format: PacketFormat,
    pub payload_subformat: u8,
    pub station_id: String,
    pub station_id_len: u8,
}

impl PacketInfo {
    pub fn empty() -> Self {
        Self {
            seq: SequenceNumber::UNSET,
            payload_len: 0,
            payload_collected: 0,
            payload_format: PacketFormat::Unknown,
            payload_subformat: 0,
            station_id: String::new(),
            station_id_len: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.payload_collected == self.payload_len
    }
}

impl Default for PacketInfo {
    fn default() -> Self {
        Self::empty()
    }
}

/// The three state machines driven by the Connection Loop, plus its timer
/// deadlines, as a single bundle.
#[derive(Clone, Debug)]
pub struct ConnectionState {
    pub link: Link,
    pub frame: Frame,
    pub query: Query,
    pub netto_deadline: Option<Instant>,
    pub netdly_deadline: Option<Instant>,
    pub keepalive_deadline: Option<Instant>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            link: Link::Down,
            frame: Frame::Header,
            query: Query::None,
            netto_deadline: None,
            netdly_deadline: None,
            keepalive_deadline: None,
        }
    }

    /// Reset all timer deadlines relative to `now`, per the `netto`/`netdly`/
    /// `keepalive` durations configured on the client. Called whenever the
    /// transport is (re)opened.
    pub fn reset_timers(
        &mut self,
        now: Instant,
        netto: std::time::Duration,
        keepalive: Option<std::time::Duration>,
    ) {
        self.netto_deadline = Some(now + netto);
        self.netdly_deadline = None;
        self.keepalive_deadline = keepalive.map(|d| now + d);
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Information about the connected SeedLink server, parsed from HELLO.
#[derive(Clone, Debug)]
pub struct ServerInfo {
    /// Server software name (e.g., `"SeedLink"`).
    pub software: String,
    /// Server version string (e.g., `"v3.1"`).
    pub version: String,
    /// Server organization line.
    pub organization: String,
    /// Advertised capabilities (e.g., `["SLPROTO:4.0", "SLPROTO:3.1"]`).
    pub capabilities: Vec<String>,
}
