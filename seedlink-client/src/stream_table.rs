use seedlink_rs_protocol::SequenceNumber;

use crate::error::{ClientError, Result};
use crate::glob::glob_match;

/// Reserved station ID for uni-station mode (legacy single-implicit-stream servers).
pub const UNI_STATION: &str = "XX_UNI";

/// Match priority: exact identifiers win over `?`-wildcards, which win over
/// `*`-wildcards, so a table scan applies the most specific entry first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Exact = 1,
    Question = 2,
    Star = 3,
}

fn priority_of(station_id: &str) -> Priority {
    if station_id.contains('*') {
        Priority::Star
    } else if station_id.contains('?') || station_id.contains('[') {
        Priority::Question
    } else {
        Priority::Exact
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub station_id: String,
    pub selectors: Option<String>,
    pub last_seq: SequenceNumber,
    pub last_time: String,
    pub priority: Priority,
}

impl Subscription {
    fn new(station_id: String, selectors: Option<String>, seq: SequenceNumber, time: String) -> Self {
        let priority = priority_of(&station_id);
        Self {
            station_id,
            selectors,
            last_seq: seq,
            last_time: time,
            priority,
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some((*self as u8).cmp(&(*other as u8)))
    }
}

/// Ordered table of per-station subscriptions, sorted by `(priority, station_id)`
/// so specific entries win over wildcard ones and state-file output is
/// deterministic.
#[derive(Default, Debug)]
pub struct StreamTable {
    entries: Vec<Subscription>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn has_uni(&self) -> bool {
        self.entries.iter().any(|e| e.station_id == UNI_STATION)
    }

    fn is_uni(&self, station_id: &str) -> bool {
        station_id == UNI_STATION
    }

    pub fn add(
        &mut self,
        station_id: impl Into<String>,
        selectors: Option<String>,
        seq: Option<SequenceNumber>,
        timestamp: Option<String>,
    ) -> Result<()> {
        let station_id = station_id.into();
        if self.is_uni(&station_id) {
            return self.set_uni(selectors, seq, timestamp);
        }
        if self.has_uni() {
            return Err(ClientError::StreamTableConflict(
                "cannot add a station entry while a uni-station entry exists".into(),
            ));
        }
        let entry = Subscription::new(
            station_id,
            selectors,
            seq.unwrap_or(SequenceNumber::UNSET),
            normalize_timestamp(timestamp),
        );
        self.insert_sorted(entry);
        Ok(())
    }

    pub fn set_uni(
        &mut self,
        selectors: Option<String>,
        seq: Option<SequenceNumber>,
        timestamp: Option<String>,
    ) -> Result<()> {
        if self.entries.iter().any(|e| e.station_id != UNI_STATION) {
            return Err(ClientError::StreamTableConflict(
                "cannot set uni-station params while station entries exist".into(),
            ));
        }
        self.entries.clear();
        self.entries.push(Subscription::new(
            UNI_STATION.to_owned(),
            selectors,
            seq.unwrap_or(SequenceNumber::UNSET),
            normalize_timestamp(timestamp),
        ));
        Ok(())
    }

    fn insert_sorted(&mut self, entry: Subscription) {
        let pos = self
            .entries
            .iter()
            .position(|e| {
                (e.priority, e.station_id.as_str()) > (entry.priority, entry.station_id.as_str())
            })
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, entry);
    }

    /// Update every entry whose pattern glob-matches `packet_station_id`.
    /// The uni-station entry matches unconditionally. Errs if nothing matched.
    ///
    /// Returns whether the packet was fresh: `false` when every matching
    /// entry already recorded a `last_seq` greater than or equal to `seq`,
    /// which happens when a server re-sends its last buffered packet across
    /// a reconnect boundary. A fresh match still advances `last_seq`/
    /// `last_time` on every matching entry; a non-fresh one leaves them
    /// untouched so a genuinely newer packet is never masked by a stale one
    /// arriving out of order.
    pub fn update(
        &mut self,
        packet_station_id: &str,
        seq: SequenceNumber,
        timestamp: String,
    ) -> Result<bool> {
        let mut matched = false;
        let mut fresh = false;
        for entry in &mut self.entries {
            let hit = entry.station_id == UNI_STATION || glob_match(packet_station_id, &entry.station_id);
            if hit {
                matched = true;
                let is_fresh = entry.last_seq == SequenceNumber::UNSET || seq > entry.last_seq;
                if is_fresh {
                    fresh = true;
                    entry.last_seq = seq;
                    entry.last_time = timestamp.clone();
                }
            }
        }
        if matched {
            Ok(fresh)
        } else {
            Err(ClientError::UnsubscribedStation(packet_station_id.to_owned()))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    /// Mutable entries whose station ID exactly equals `station_id`, for
    /// state-file recovery (which matches recorded identifiers literally,
    /// not via glob).
    pub fn iter_mut_matching(&mut self, station_id: &str) -> impl Iterator<Item = &mut Subscription> {
        self.entries.iter_mut().filter(move |e| e.station_id == station_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_uni_mode(&self) -> bool {
        self.has_uni()
    }
}

/// Normalize a legacy `YYYY,MM,DD,hh,mm,ss[,ffff]` timestamp to ISO-8601 `Z`.
/// Strings already in ISO form (or empty) pass through unchanged.
fn normalize_timestamp(timestamp: Option<String>) -> String {
    let Some(ts) = timestamp else {
        return String::new();
    };
    crate::statefile::comma_to_iso(&ts).unwrap_or(ts)
}
