//! Pure helpers for the HELLO/SLPROTO/GETCAPABILITIES/STATION dialogue.
//!
//! These functions build the command sequence and interpret capability
//! strings; the actual send/receive loop lives in the Connection Loop
//! (`client.rs`), which is the only place that touches the transport.

use seedlink_rs_protocol::{Command, InfoLevel, ProtocolVersion, SequenceNumber};

use crate::config::TimeWindow;
use crate::error::{ClientError, Result};
use crate::stream_table::{Subscription, UNI_STATION};

/// Parse capabilities from the `extra` field of a HELLO response.
///
/// The extra field may look like:
/// - `"(2020.075) :: SLPROTO:4.0 SLPROTO:3.1"` — contains `"::"` separator
/// - `"SLPROTO:4.0 SLPROTO:3.1"` — already stripped by `parse_hello` when no extra text
///
/// We split on `"::"` and parse tokens from the right side. If no `"::"` is found,
/// we look for capability-style tokens (containing `:`) in the full string.
pub fn parse_capabilities(extra: &str) -> Vec<String> {
    if let Some(idx) = extra.find("::") {
        let right = extra[idx + 2..].trim();
        if right.is_empty() {
            return Vec::new();
        }
        return right.split_whitespace().map(|s| s.to_owned()).collect();
    }

    let tokens: Vec<String> = extra
        .split_whitespace()
        .filter(|t| t.contains(':'))
        .map(|s| s.to_owned())
        .collect();
    tokens
}

/// Check if capabilities include SeedLink v4 support.
pub fn supports_v4(capabilities: &[String]) -> bool {
    highest_slproto(capabilities).is_some_and(|(major, _)| major >= 4)
}

/// Parse `"v<M>.<m>"` (as returned in `Response::Hello.version`) into
/// `(major, minor)`.
pub fn parse_version(version: &str) -> Result<(u8, u8)> {
    let stripped = version.strip_prefix(['v', 'V']).unwrap_or(version);
    let (major_str, minor_str) = stripped
        .split_once('.')
        .ok_or_else(|| ClientError::NegotiationFailed(format!("unparseable version {version:?}")))?;
    let major: u8 = major_str
        .parse()
        .map_err(|_| ClientError::NegotiationFailed(format!("bad major version in {version:?}")))?;
    let minor: u8 = minor_str
        .parse()
        .map_err(|_| ClientError::NegotiationFailed(format!("bad minor version in {version:?}")))?;
    Ok((major, minor))
}

/// Find the highest `SLPROTO:<M>.<m>` flag in a capability list.
pub fn highest_slproto(capabilities: &[String]) -> Option<(u8, u8)> {
    capabilities
        .iter()
        .filter_map(|c| c.strip_prefix("SLPROTO:"))
        .filter_map(|v| parse_version(v).ok())
        .max()
}

pub fn has_capability(capabilities: &[String], flag: &str) -> bool {
    capabilities.iter().any(|c| c == flag)
}

/// `(major, minor) >= (min_major, min_minor)`.
pub fn version_at_least(major: u8, minor: u8, min_major: u8, min_minor: u8) -> bool {
    (major, minor) >= (min_major, min_minor)
}

/// Build the `USERAGENT <name>[/<version>] libslink-rs/<libver>` command.
pub fn useragent_command(client_name: &str, client_version: Option<&str>) -> Command {
    let lib_version = env!("CARGO_PKG_VERSION");
    let ident = match client_version {
        Some(v) if !client_name.is_empty() => format!("{client_name}/{v}"),
        _ => client_name.to_owned(),
    };
    let description = if ident.is_empty() {
        format!("seedlink-rs/{lib_version}")
    } else {
        format!("{ident} seedlink-rs/{lib_version}")
    };
    Command::UserAgent { description }
}

/// The one `DATA`/`FETCH`/`TIME` action command for a subscription, chosen
/// per the priority: explicit time window > resume-from-sequence > fresh.
pub fn action_command(
    entry: &Subscription,
    version: ProtocolVersion,
    dialup: bool,
    time_window: Option<&TimeWindow>,
    supports_time: bool,
    supports_lastpkttime: bool,
) -> Command {
    if let (Some(window), true) = (time_window, supports_time) {
        return Command::Time {
            start: window.begin.clone(),
            end: window.end.clone(),
        };
    }

    if entry.last_seq != SequenceNumber::UNSET {
        let resume_seq = SequenceNumber::new(entry.last_seq.value().wrapping_add(1));
        let start = if supports_lastpkttime && !entry.last_time.is_empty() {
            Some(entry.last_time.clone())
        } else {
            None
        };
        return if dialup {
            Command::Fetch {
                sequence: Some(resume_seq),
            }
        } else {
            Command::Data {
                sequence: Some(resume_seq),
                start,
                end: None,
            }
        };
    }

    match version {
        ProtocolVersion::V3 if dialup => Command::Fetch { sequence: None },
        _ => Command::Data {
            sequence: None,
            start: None,
            end: None,
        },
    }
}

/// Build the full per-station command sequence: `STATION`, each `SELECT`,
/// then the one action command. Does not include the trailing `END`, which
/// is sent once after all stations (v4) or not at all (v3 uni-station).
///
/// Uni-station sessions (`entry.station_id == UNI_STATION`) never get a
/// `STATION` command: the server is already addressing a single stream by
/// virtue of the connection itself, so only `SELECT`s and the action command
/// are sent.
pub fn station_commands(
    entry: &Subscription,
    version: ProtocolVersion,
    dialup: bool,
    time_window: Option<&TimeWindow>,
    supports_time: bool,
    supports_lastpkttime: bool,
) -> Vec<Command> {
    let mut commands = Vec::new();
    if entry.station_id != UNI_STATION {
        if let Some((network, station)) = entry.station_id.split_once('_') {
            commands.push(Command::Station {
                station: station.to_owned(),
                network: network.to_owned(),
            });
        }
    }
    if let Some(selectors) = &entry.selectors {
        for sel in selectors.split_whitespace() {
            commands.push(Command::Select {
                pattern: sel.to_owned(),
            });
        }
    }
    commands.push(action_command(
        entry,
        version,
        dialup,
        time_window,
        supports_time,
        supports_lastpkttime,
    ));
    commands
}

/// Build the `INFO <level>` command.
pub fn info_command(level: InfoLevel) -> Command {
    Command::Info { level }
}
