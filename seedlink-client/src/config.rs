use std::time::Duration;

use crate::error::{ClientError, Result};

pub const DEFAULT_PORT: u16 = 18000;

/// Every tunable knob exposed through the caller-facing `set_*` API.
///
/// Defaults mirror the reference implementation: a 600 s idle timeout, a
/// 30 s reconnect delay, disabled keepalive, and a 60 s per-I/O timeout.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub client_name: String,
    pub client_version: Option<String>,
    pub prefer_v4: bool,
    pub time_window: Option<TimeWindow>,
    pub keepalive: Option<Duration>,
    pub netto: Duration,
    pub netdly: Duration,
    pub iotimeout: Duration,
    pub nonblocking: bool,
    pub dialup: bool,
    pub batch: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub begin: String,
    pub end: Option<String>,
}

impl ClientConfig {
    pub fn new(client_name: impl Into<String>, client_version: Option<String>) -> Self {
        Self {
            host: "localhost".to_owned(),
            port: DEFAULT_PORT,
            client_name: client_name.into(),
            client_version,
            prefer_v4: true,
            time_window: None,
            keepalive: None,
            netto: Duration::from_secs(600),
            netdly: Duration::from_secs(30),
            iotimeout: Duration::from_secs(60),
            nonblocking: false,
            dialup: false,
            batch: false,
        }
    }

    /// Parse `host:port`, `host`, `:port`, or `host@port` into `(host, port)`,
    /// defaulting a missing host to `localhost` and a missing port to
    /// [`DEFAULT_PORT`].
    pub fn set_address(&mut self, addr: &str) -> Result<()> {
        let (host, port) = parse_address(addr)?;
        self.host = host;
        self.port = port;
        Ok(())
    }

    pub fn set_time_window(&mut self, begin: Option<String>, end: Option<String>) {
        self.time_window = begin.map(|begin| TimeWindow { begin, end });
    }

    pub fn set_keepalive(&mut self, seconds: u64) {
        self.keepalive = if seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(seconds))
        };
    }

    pub fn set_netto(&mut self, seconds: u64) {
        self.netto = Duration::from_secs(seconds);
    }

    pub fn set_netdly(&mut self, seconds: u64) {
        self.netdly = Duration::from_secs(seconds);
    }

    pub fn set_iotimeout(&mut self, seconds: u64) {
        self.iotimeout = Duration::from_secs(seconds);
    }

    pub fn set_nonblocking(&mut self, value: bool) {
        self.nonblocking = value;
    }

    pub fn set_dialup(&mut self, value: bool) {
        self.dialup = value;
    }

    pub fn set_batch(&mut self, value: bool) {
        self.batch = value;
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_address(addr: &str) -> Result<(String, u16)> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Ok(("localhost".to_owned(), DEFAULT_PORT));
    }

    let sep = addr.find(['@', ':']);
    let (host_part, port_part) = match sep {
        Some(idx) => (&addr[..idx], Some(&addr[idx + 1..])),
        None => (addr, None),
    };

    let host = if host_part.is_empty() {
        "localhost".to_owned()
    } else {
        host_part.to_owned()
    };

    let port = match port_part {
        Some("") | None => DEFAULT_PORT,
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| ClientError::InvalidAddress(addr.to_owned()))?,
    };

    Ok((host, port))
}
