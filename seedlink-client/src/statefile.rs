//! Save and recover per-station sequence numbers and timestamps to/from a
//! plain-text state file, so a restarted client resumes instead of
//! re-requesting already-seen data.
//!
//! Two line formats are understood on read:
//!
//! - modern: `NET_STA seq|-1 [ISO-8601-timestamp]`
//! - legacy: `NET STA seq|-1 [YYYY,MM,DD,hh,mm,ss[,ffff]]`
//!
//! Only the modern, single-token form is written.

use std::fs;
use std::path::Path;

use seedlink_rs_protocol::SequenceNumber;

use crate::error::{ClientError, Result};
use crate::stream_table::StreamTable;

pub fn save_state(table: &StreamTable, path: impl AsRef<Path>) -> Result<()> {
    let mut out = String::new();
    for entry in table.iter() {
        let seq = if entry.last_seq == SequenceNumber::UNSET {
            "-1".to_owned()
        } else {
            entry.last_seq.value().to_string()
        };
        out.push_str(&entry.station_id);
        out.push(' ');
        out.push_str(&seq);
        if !entry.last_time.is_empty() {
            out.push(' ');
            out.push_str(&entry.last_time);
        }
        out.push('\n');
    }
    fs::write(path, out).map_err(ClientError::Io)
}

/// Returns `Ok(false)` if the state file does not exist (not an error: a
/// first run has nothing to recover), `Ok(true)` on success.
pub fn recover_state(table: &mut StreamTable, path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(ClientError::Io(e)),
    };

    for line in contents.lines() {
        if let Some(parsed) = parse_line(line) {
            let (station_id, seq, timestamp) = parsed;
            apply_recovered(table, &station_id, seq, timestamp);
        }
    }
    Ok(true)
}

fn apply_recovered(table: &mut StreamTable, station_id: &str, seq: SequenceNumber, timestamp: String) {
    for entry in table.iter_mut_matching(station_id) {
        entry.last_seq = seq;
        if !timestamp.is_empty() {
            entry.last_time = timestamp.clone();
        }
    }
}

/// Parse one state-file line, accepting both the modern `NET_STA seq [ts]`
/// and legacy `NET STA seq [ts]` forms. Returns `None` for blank or
/// unparseable lines.
fn parse_line(line: &str) -> Option<(String, SequenceNumber, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut fields = line.split_whitespace();
    let first = fields.next()?;
    let second = fields.next()?;

    let (station_id, seqstr, rest): (String, &str, Option<&str>) = if second.chars().all(|c| c.is_ascii_digit() || c == '-') {
        (first.to_owned(), second, fields.next())
    } else {
        let third = fields.next()?;
        (format!("{first}_{second}"), third, fields.next())
    };

    let seq = if seqstr == "-1" {
        SequenceNumber::UNSET
    } else {
        SequenceNumber::new(seqstr.parse().ok()?)
    };

    let timestamp = rest.map(|ts| comma_to_iso(ts).unwrap_or_else(|| ts.to_owned())).unwrap_or_default();

    Some((station_id, seq, timestamp))
}

/// Convert a legacy `YYYY,MM,DD,hh,mm,ss[,ffff]` timestamp to ISO-8601 `Z`.
/// Returns `None` if `ts` is not in the comma form (e.g. already ISO, or
/// empty), so callers can fall back to the original string unchanged.
pub fn comma_to_iso(ts: &str) -> Option<String> {
    if !ts.contains(',') {
        return None;
    }
    let mut parts = ts.split(',');
    let year: u32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute: u32 = parts.next()?.parse().ok()?;
    let second: u32 = parts.next()?.parse().ok()?;
    let frac: u32 = parts.next().and_then(|f| f.parse().ok()).unwrap_or(0);
    Some(format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{frac:04}Z"
    ))
}
