//! Parse the two external stream-list formats into `(station_id, selectors)`
//! pairs ready for [`crate::client::SeedLinkClient::add_stream`].
//!
//! Neither format does any subscribing itself; both are pure parsing
//! functions, matching the reference's thin stream-list producers.

use crate::error::{ClientError, Result};

/// One line-oriented entry from a stream-list file, or one comma-separated
/// item from the CLI `-S` string form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEntry {
    pub station_id: String,
    pub selectors: Option<String>,
}

/// Parse a stream-list text file's contents.
///
/// ```text
/// # comment
/// NET_STA [selectors]
/// # legacy:
/// NET STA [selectors]
/// ```
///
/// Comments begin with `#` or `*`; blank lines are ignored.
pub fn parse_stream_list_file(contents: &str) -> Vec<StreamEntry> {
    contents.lines().filter_map(parse_file_line).collect()
}

fn parse_file_line(line: &str) -> Option<StreamEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('*') {
        return None;
    }

    let mut fields = line.split_whitespace();
    let first = fields.next()?;

    if first.contains('_') {
        let selectors = fields.next().map(str::to_owned);
        return Some(StreamEntry {
            station_id: first.to_owned(),
            selectors,
        });
    }

    // Legacy `NET STA [selectors]` form: the station code is a separate token.
    let second = fields.next()?;
    let selectors = fields.next().map(str::to_owned);
    Some(StreamEntry {
        station_id: format!("{first}_{second}"),
        selectors,
    })
}

/// Parse the CLI `-S` stream-spec string: a comma-separated list of
/// `NET_STA[:selectors[ sel2 ...]]` items.
pub fn parse_stream_list_string(spec: &str) -> Result<Vec<StreamEntry>> {
    spec.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse_stream_spec_item)
        .collect()
}

fn parse_stream_spec_item(item: &str) -> Result<StreamEntry> {
    let mut parts = item.splitn(2, ':');
    let station_id = parts.next().unwrap_or_default();
    if !station_id.contains('_') {
        return Err(ClientError::InvalidStreamSpec(item.to_owned()));
    }
    let selectors = parts.next().map(str::to_owned);
    Ok(StreamEntry {
        station_id: station_id.to_owned(),
        selectors,
    })
}

/// Subscribe `client` to every parsed entry, logging and skipping any entry
/// the Stream Table rejects (e.g. a uni/multi-station conflict) rather than
/// aborting the whole list. Returns the count of entries actually added —
/// 0-based, so an empty list yields `0`.
pub fn add_all(client: &mut crate::client::SeedLinkClient, entries: &[StreamEntry]) -> usize {
    let mut added = 0;
    for entry in entries {
        match client.add_stream(entry.station_id.clone(), entry.selectors.clone()) {
            Ok(()) => added += 1,
            Err(e) => tracing::warn!(station_id = %entry.station_id, error = %e, "skipping stream entry"),
        }
    }
    added
}
