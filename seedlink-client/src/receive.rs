//! The Receive Pipeline: a `Header -> [StationId] -> Payload` state machine
//! fed through a fixed-capacity ring buffer, so a wire header or payload
//! chunk split arbitrarily across transport reads is reassembled correctly.

use seedlink_rs_protocol::frame::v3;
use seedlink_rs_protocol::{PacketFormat, ProtocolVersion, SequenceNumber};

use crate::error::{ClientError, Result};
use crate::state::{Frame, PacketInfo, Query};
use crate::stream_table::StreamTable;

pub const RING_CAPACITY: usize = 16 * 1024;

const V4_HEADER_LEN: usize = 17;

/// Fixed-capacity byte buffer with a monotonically advancing read cursor.
/// `feed` appends as much as fits; the caller backs off when it returns less
/// than the input length.
pub struct RingBuffer {
    data: Vec<u8>,
    capacity: usize,
    start: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            start: 0,
        }
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.data.drain(..self.start);
            self.start = 0;
        }
    }

    /// Append bytes, returning how many were actually accepted.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        self.compact();
        let free = self.capacity.saturating_sub(self.data.len());
        let n = bytes.len().min(free);
        self.data.extend_from_slice(&bytes[..n]);
        n
    }

    pub fn available(&self) -> &[u8] {
        &self.data[self.start..]
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.data.len());
    }
}

/// A control token seen in place of a real wire header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
    /// Graceful end of stream.
    End,
    /// Server-side error, with its message.
    Error(String),
}

/// What one `step()` call produced.
#[derive(Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not enough bytes buffered yet; feed more and retry.
    NeedMoreData,
    /// An in-band control token was consumed.
    Control(Control),
    /// A complete packet was copied into the caller's buffer; consult
    /// `ReceivePipeline::packet()` for its descriptor.
    PacketReady,
    /// The caller's buffer is too small for `payload_len`; `payload_collected`
    /// is preserved so a larger buffer can be supplied and the step retried.
    TooLarge,
    /// A packet whose delivery was suppressed (keepalive/INFO noise) was
    /// fully consumed with nothing to hand to the caller.
    Suppressed,
    /// A fully received packet did not advance any matching Stream Table
    /// entry's `last_seq` — a duplicate re-sent across a reconnect boundary.
    Duplicate,
}

pub struct ReceivePipeline {
    ring: RingBuffer,
    version: ProtocolVersion,
    frame: Frame,
    packet: PacketInfo,
    station_id_read: u8,
    packet_fresh: bool,
}

impl ReceivePipeline {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            ring: RingBuffer::new(RING_CAPACITY),
            version,
            frame: Frame::Header,
            packet: PacketInfo::empty(),
            station_id_read: 0,
            packet_fresh: true,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        self.ring.feed(bytes)
    }

    pub fn packet(&self) -> &PacketInfo {
        &self.packet
    }

    pub fn frame_state(&self) -> Frame {
        self.frame
    }

    /// Advance the pipeline by at most one packet, copying payload bytes
    /// into `out` as they become available. `table` is updated once the
    /// first 64 bytes of a v3 payload (or the v4 header) reveal the
    /// station ID; `query` governs keepalive/INFO suppression.
    pub fn step(&mut self, out: &mut [u8], table: &mut StreamTable, query: &mut Query, timestamp: &str) -> Result<StepOutcome> {
        match self.frame {
            Frame::Header => self.step_header(out, table, query, timestamp),
            Frame::StationId => self.step_station_id(out, table, query, timestamp),
            Frame::Payload => self.step_payload(out, table, query, timestamp),
        }
    }

    fn step_header(&mut self, out: &mut [u8], table: &mut StreamTable, query: &mut Query, timestamp: &str) -> Result<StepOutcome> {
        let buf = self.ring.available();
        if buf.len() < 2 {
            return Ok(StepOutcome::NeedMoreData);
        }

        if !buf.starts_with(b"SL") && !buf.starts_with(b"SE") {
            return self.step_control(buf);
        }

        self.packet = PacketInfo::empty();
        self.packet_fresh = true;

        match self.version {
            ProtocolVersion::V3 => {
                if buf.len() < v3::HEADER_LEN {
                    return Ok(StepOutcome::NeedMoreData);
                }
                let header = v3::parse_header(&buf[..v3::HEADER_LEN])?;
                self.ring.consume(v3::HEADER_LEN);
                match header {
                    v3::V3Header::Data { sequence } => {
                        self.packet.seq = sequence;
                        self.packet.payload_format = PacketFormat::Unknown;
                    }
                    v3::V3Header::Info { terminator } => {
                        self.packet.seq = SequenceNumber::UNSET;
                        self.packet.payload_format = if terminator {
                            PacketFormat::MiniSeed2InfoTerm
                        } else {
                            PacketFormat::MiniSeed2Info
                        };
                    }
                }
                self.frame = Frame::Payload;
                self.step_payload(out, table, query, timestamp)
            }
            ProtocolVersion::V4 => {
                if buf.len() < V4_HEADER_LEN {
                    return Ok(StepOutcome::NeedMoreData);
                }
                let format = seedlink_rs_protocol::PayloadFormat::from_byte(buf[2])?;
                self.packet.payload_format = packet_format_from_v4(format);
                self.packet.payload_subformat = buf[3];
                self.packet.payload_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
                let seq_bytes: [u8; 8] = buf[8..16].try_into().unwrap();
                self.packet.seq = SequenceNumber::from_v4_le_bytes(seq_bytes);
                self.packet.station_id_len = buf[16];
                self.ring.consume(V4_HEADER_LEN);
                self.station_id_read = 0;
                self.frame = if self.packet.station_id_len > 0 {
                    Frame::StationId
                } else {
                    Frame::Payload
                };
                if self.frame == Frame::StationId {
                    self.step_station_id(out, table, query, timestamp)
                } else {
                    self.step_payload(out, table, query, timestamp)
                }
            }
        }
    }

    fn step_control(&mut self, buf: &[u8]) -> Result<StepOutcome> {
        const MAX_CONTROL_LEN: usize = 256;
        let Some(crlf) = find_crlf(buf) else {
            if buf.len() > MAX_CONTROL_LEN {
                return Err(ClientError::Protocol(
                    seedlink_rs_protocol::SeedlinkError::InvalidSignature {
                        expected: "SL/SE",
                        actual: [buf[0], buf[1]],
                    },
                ));
            }
            return Ok(StepOutcome::NeedMoreData);
        };
        let line = std::str::from_utf8(&buf[..crlf]).unwrap_or("").to_owned();
        self.ring.consume(crlf + 2);

        if line.eq_ignore_ascii_case("END") {
            Ok(StepOutcome::Control(Control::End))
        } else if line.to_uppercase().starts_with("ERROR") {
            Ok(StepOutcome::Control(Control::Error(line)))
        } else {
            Err(ClientError::UnexpectedResponse(line))
        }
    }

    fn step_station_id(&mut self, out: &mut [u8], table: &mut StreamTable, query: &mut Query, timestamp: &str) -> Result<StepOutcome> {
        let need = self.packet.station_id_len as usize - self.station_id_read as usize;
        let buf = self.ring.available();
        if buf.len() < need {
            return Ok(StepOutcome::NeedMoreData);
        }
        let id_bytes = &buf[..need];
        self.packet.station_id = std::str::from_utf8(id_bytes).unwrap_or("").to_owned();
        self.ring.consume(need);
        self.station_id_read = self.packet.station_id_len;
        self.frame = Frame::Payload;
        self.step_payload(out, table, query, timestamp)
    }

    fn step_payload(&mut self, out: &mut [u8], table: &mut StreamTable, query: &mut Query, timestamp: &str) -> Result<StepOutcome> {
        match self.version {
            ProtocolVersion::V3 => self.step_payload_v3(out, table, query, timestamp),
            ProtocolVersion::V4 => self.step_payload_v4(out, table, query, timestamp),
        }
    }

    fn step_payload_v3(&mut self, out: &mut [u8], table: &mut StreamTable, query: &mut Query, timestamp: &str) -> Result<StepOutcome> {
        if self.packet.payload_len == 0 {
            let buf = self.ring.available();
            if buf.len() < seedlink_rs_protocol::MIN_DETECT_PREFIX {
                return Ok(StepOutcome::NeedMoreData);
            }
            let info_flag = matches!(
                self.packet.payload_format,
                PacketFormat::MiniSeed2Info | PacketFormat::MiniSeed2InfoTerm
            );
            let info_term = matches!(self.packet.payload_format, PacketFormat::MiniSeed2InfoTerm);
            let detected = seedlink_rs_protocol::detect_v3_payload(buf, info_flag, info_term)?;
            self.packet.payload_len = detected.length as u32;
            if !info_flag {
                self.packet.payload_format = detected.format;
            }
        }
        self.copy_payload(out, table, query, timestamp)
    }

    fn step_payload_v4(&mut self, out: &mut [u8], table: &mut StreamTable, query: &mut Query, timestamp: &str) -> Result<StepOutcome> {
        self.copy_payload(out, table, query, timestamp)
    }

    fn copy_payload(&mut self, out: &mut [u8], table: &mut StreamTable, query: &mut Query, timestamp: &str) -> Result<StepOutcome> {
        let total = self.packet.payload_len as usize;
        if (total as u32) > out.len() as u32 {
            return Ok(StepOutcome::TooLarge);
        }

        let was_first_chunk = self.packet.payload_collected == 0;
        let buf = self.ring.available();
        let remaining = total - self.packet.payload_collected as usize;
        let take = buf.len().min(remaining);
        out[self.packet.payload_collected as usize..self.packet.payload_collected as usize + take]
            .copy_from_slice(&buf[..take]);
        self.ring.consume(take);
        self.packet.payload_collected += take as u32;

        // INFO/ERROR payloads carry no station identity; resolving one from
        // their body would read garbage, so the Stream Table is left alone.
        let is_info_or_error = matches!(
            self.packet.payload_format,
            PacketFormat::MiniSeed2Info | PacketFormat::MiniSeed2InfoTerm
        ) || (self.packet.payload_format == PacketFormat::Json
            && matches!(self.packet.payload_subformat, b'I' | b'R'));

        if was_first_chunk && !is_info_or_error && self.packet.payload_collected as usize >= 64.min(total) {
            if let Some(station_id) = self.resolve_station_id(out) {
                self.packet_fresh = table.update(&station_id, self.packet.seq, timestamp.to_owned())?;
            }
        }

        if !self.packet.is_complete() {
            return Ok(StepOutcome::NeedMoreData);
        }

        self.frame = Frame::Header;
        let is_info_delivery = matches!(
            self.packet.payload_format,
            PacketFormat::MiniSeed2InfoTerm
        ) || (self.packet.payload_subformat == b'I');

        if *query == Query::KeepaliveInFlight && is_info_delivery {
            *query = Query::None;
            self.packet = PacketInfo::empty();
            return Ok(StepOutcome::Suppressed);
        }

        if !self.packet_fresh {
            return Ok(StepOutcome::Duplicate);
        }

        Ok(StepOutcome::PacketReady)
    }

    fn resolve_station_id(&self, out: &[u8]) -> Option<String> {
        if !self.packet.station_id.is_empty() {
            return Some(self.packet.station_id.clone());
        }
        if self.version != ProtocolVersion::V3 {
            return None;
        }
        match self.packet.payload_format {
            PacketFormat::MiniSeed3 => net_sta_from_mseed3(out),
            _ if out.len() >= 20 => {
                let station = std::str::from_utf8(&out[8..13]).ok()?.trim().to_owned();
                let network = std::str::from_utf8(&out[18..20]).ok()?.trim().to_owned();
                if !station.is_empty() && !network.is_empty() {
                    Some(format!("{network}_{station}"))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// miniSEED3 fixed header length in bytes, matching the `sid_len`/`extra_len`/
/// `data_len` layout `seedlink_rs_protocol::detect` uses to size records.
const MSEED3_FIXED_HEADER_LEN: usize = 40;

/// Extract `NET_STA` from a miniSEED3 record's FDSN Source Identifier
/// (`FDSN:NET_STA_LOC_B_S_SS`), which immediately follows the fixed header.
fn net_sta_from_mseed3(out: &[u8]) -> Option<String> {
    if out.len() <= MSEED3_FIXED_HEADER_LEN {
        return None;
    }
    let sid_len = out[33] as usize;
    let sid_start = MSEED3_FIXED_HEADER_LEN;
    let sid_end = sid_start.checked_add(sid_len)?;
    if sid_end > out.len() {
        return None;
    }
    let sid = std::str::from_utf8(&out[sid_start..sid_end]).ok()?;
    net_sta_from_fdsn_sourceid(sid)
}

/// Parse `NET_STA` out of an `FDSN:NET_STA_LOC_B_S_SS` Source Identifier:
/// the substring from after the `"FDSN:"` prefix up to (and including) the
/// second `'_'`.
fn net_sta_from_fdsn_sourceid(sid: &str) -> Option<String> {
    let rest = sid.strip_prefix("FDSN:")?;
    let first_us = rest.find('_')?;
    let second_us = rest[first_us + 1..].find('_')? + first_us + 1;
    let net_sta = &rest[..second_us];
    if net_sta.is_empty() {
        None
    } else {
        Some(net_sta.to_owned())
    }
}

fn packet_format_from_v4(format: seedlink_rs_protocol::PayloadFormat) -> PacketFormat {
    use seedlink_rs_protocol::PayloadFormat as PF;
    match format {
        PF::MiniSeed2 => PacketFormat::MiniSeed2,
        PF::MiniSeed3 => PacketFormat::MiniSeed3,
        PF::Json => PacketFormat::Json,
        PF::Xml => PacketFormat::Xml,
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_feed_and_consume() {
        let mut ring = RingBuffer::new(8);
        assert_eq!(ring.feed(b"hello"), 5);
        assert_eq!(ring.available(), b"hello");
        ring.consume(2);
        assert_eq!(ring.available(), b"llo");
        assert_eq!(ring.feed(b"world!"), 5);
        assert_eq!(ring.available(), b"lloworl");
    }

    #[test]
    fn control_end_token_detected() {
        let mut pipeline = ReceivePipeline::new(ProtocolVersion::V4);
        pipeline.feed(b"END\r\n");
        let mut table = StreamTable::new();
        let mut query = Query::None;
        let mut out = [0u8; 16];
        let outcome = pipeline.step(&mut out, &mut table, &mut query, "").unwrap();
        assert_eq!(outcome, StepOutcome::Control(Control::End));
    }

    #[test]
    fn control_error_token_detected() {
        let mut pipeline = ReceivePipeline::new(ProtocolVersion::V4);
        pipeline.feed(b"ERROR disconnect requested\r\n");
        let mut table = StreamTable::new();
        let mut query = Query::None;
        let mut out = [0u8; 16];
        let outcome = pipeline.step(&mut out, &mut table, &mut query, "").unwrap();
        assert!(matches!(outcome, StepOutcome::Control(Control::Error(_))));
    }

    #[test]
    fn v4_packet_split_across_feeds() {
        let payload = vec![0xABu8; 32];
        let frame = seedlink_rs_protocol::frame::v4::write(
            seedlink_rs_protocol::PayloadFormat::MiniSeed2,
            seedlink_rs_protocol::PayloadSubformat::Data,
            SequenceNumber::new(7),
            "IU_ANMO",
            &payload,
        )
        .unwrap();

        let mut pipeline = ReceivePipeline::new(ProtocolVersion::V4);
        let mut table = StreamTable::new();
        table.set_uni(None, None, None).unwrap();
        let mut query = Query::None;
        let mut out = [0u8; 64];

        pipeline.feed(&frame[..10]);
        assert_eq!(
            pipeline.step(&mut out, &mut table, &mut query, "ts").unwrap(),
            StepOutcome::NeedMoreData
        );

        pipeline.feed(&frame[10..]);
        let outcome = pipeline.step(&mut out, &mut table, &mut query, "ts").unwrap();
        assert_eq!(outcome, StepOutcome::PacketReady);
        assert_eq!(pipeline.packet().seq, SequenceNumber::new(7));
        assert_eq!(&out[..32], &payload[..]);
    }

    #[test]
    fn too_large_preserves_collected() {
        let payload = vec![0xCDu8; 32];
        let frame = seedlink_rs_protocol::frame::v4::write(
            seedlink_rs_protocol::PayloadFormat::MiniSeed2,
            seedlink_rs_protocol::PayloadSubformat::Data,
            SequenceNumber::new(1),
            "",
            &payload,
        )
        .unwrap();

        let mut pipeline = ReceivePipeline::new(ProtocolVersion::V4);
        let mut table = StreamTable::new();
        table.set_uni(None, None, None).unwrap();
        let mut query = Query::None;
        let mut small_out = [0u8; 8];

        pipeline.feed(&frame);
        let outcome = pipeline.step(&mut small_out, &mut table, &mut query, "ts").unwrap();
        assert_eq!(outcome, StepOutcome::TooLarge);
    }

    #[test]
    fn v3_info_packet_does_not_touch_stream_table() {
        let mut header = [0u8; 8];
        header[0..6].copy_from_slice(b"SLINFO");
        header[7] = b'*';

        let mut payload = vec![0u8; seedlink_rs_protocol::MIN_DETECT_PREFIX];
        payload[0..6].copy_from_slice(b"000001");
        payload[6] = b'D';
        payload[8..13].copy_from_slice(b"BOGUS");
        payload[18..20].copy_from_slice(b"ZZ");
        payload[20..22].copy_from_slice(&2024u16.to_be_bytes());
        payload[22..24].copy_from_slice(&15u16.to_be_bytes());
        payload[39] = 1;
        payload[46..48].copy_from_slice(&48u16.to_be_bytes());
        payload.extend_from_slice(&[0u8; 16]);
        payload[48..50].copy_from_slice(&1000u16.to_be_bytes());
        payload[50..52].copy_from_slice(&0u16.to_be_bytes());
        payload[54] = 6; // 1 << 6 == 64 bytes

        let mut pipeline = ReceivePipeline::new(ProtocolVersion::V3);
        pipeline.feed(&header);
        pipeline.feed(&payload);

        // No subscriptions at all: if `copy_payload` ever called `table.update()`
        // for this INFO packet, the lookup would fail with UnsubscribedStation.
        let mut table = StreamTable::new();
        let mut query = Query::None;
        let mut out = [0u8; 128];

        let outcome = pipeline.step(&mut out, &mut table, &mut query, "ts").unwrap();
        assert_eq!(outcome, StepOutcome::PacketReady);
    }

    #[test]
    fn v3_mseed3_station_id_resolved_from_fdsn_sourceid() {
        let wire_header = v3::write_header(SequenceNumber::new(5));

        let sid = b"FDSN:XX_ABCDE_00_B_H_Z";
        let mut record = vec![0u8; 40];
        record[0] = b'M';
        record[1] = b'S';
        record[2] = 3;
        record[33] = sid.len() as u8;
        record[34..36].copy_from_slice(&0u16.to_le_bytes());
        record[36..40].copy_from_slice(&0u32.to_le_bytes());
        record.extend_from_slice(sid);
        record.extend_from_slice(&[0u8; 2]); // pad to MIN_DETECT_PREFIX

        let mut pipeline = ReceivePipeline::new(ProtocolVersion::V3);
        pipeline.feed(&wire_header);
        pipeline.feed(&record);

        let mut table = StreamTable::new();
        table.add("XX_ABCDE", None, None, None).unwrap();
        let mut query = Query::None;
        let mut out = [0u8; 128];

        let outcome = pipeline.step(&mut out, &mut table, &mut query, "ts").unwrap();
        assert_eq!(outcome, StepOutcome::PacketReady);
        let entry = table.iter().find(|e| e.station_id == "XX_ABCDE").unwrap();
        assert_eq!(entry.last_seq, SequenceNumber::new(5));
    }

    #[test]
    fn net_sta_from_fdsn_sourceid_parses_prefix() {
        assert_eq!(
            net_sta_from_fdsn_sourceid("FDSN:IU_ANMO_00_B_H_Z"),
            Some("IU_ANMO".to_owned())
        );
        assert_eq!(net_sta_from_fdsn_sourceid("not-fdsn"), None);
        assert_eq!(net_sta_from_fdsn_sourceid("FDSN:NOUNDERSCORE"), None);
    }
}
