//! Payload length/format detection for SeedLink v3 frames.
//!
//! v3 carries neither payload length nor format in its 8-byte header; both
//! must be inferred from the miniSEED record itself. Only reached once the
//! Receive Pipeline has buffered a minimum prefix of the payload.

use crate::error::{Result, SeedlinkError};

/// Minimum number of payload bytes required before detection is attempted.
pub const MIN_DETECT_PREFIX: usize = 64;

/// Fixed miniSEED2 data-header length (sequence number through first-blockette offset).
const MSEED2_FIXED_HEADER_LEN: usize = 48;

/// Fixed miniSEED3 header length (record indicator through data-payload length).
const MSEED3_FIXED_HEADER_LEN: usize = 40;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PacketFormat {
    Unknown,
    MiniSeed2,
    MiniSeed3,
    MiniSeed2Info,
    MiniSeed2InfoTerm,
    Json,
    Xml,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DetectedPayload {
    pub format: PacketFormat,
    pub length: usize,
}

/// Infer `(format, length)` for a v3 data payload from its first
/// [`MIN_DETECT_PREFIX`] bytes (or more).
///
/// `info` indicates the frame arrived with the `"SLINFO"` header variant
/// rather than `"SL"`, in which case the format is `MiniSeed2Info[Term]`
/// rather than plain `MiniSeed2`; detection of the record length proceeds
/// identically either way.
pub fn detect_v3_payload(prefix: &[u8], info: bool, info_terminator: bool) -> Result<DetectedPayload> {
    if prefix.len() < MIN_DETECT_PREFIX {
        return Err(SeedlinkError::FrameTooShort {
            expected: MIN_DETECT_PREFIX,
            actual: prefix.len(),
        });
    }

    if is_mseed3_signature(prefix) {
        let length = mseed3_record_length(prefix)?;
        return Ok(DetectedPayload {
            format: PacketFormat::MiniSeed3,
            length,
        });
    }

    if is_mseed2_signature(prefix) {
        let length = mseed2_record_length(prefix)?;
        let format = if info {
            if info_terminator {
                PacketFormat::MiniSeed2InfoTerm
            } else {
                PacketFormat::MiniSeed2Info
            }
        } else {
            PacketFormat::MiniSeed2
        };
        return Ok(DetectedPayload { format, length });
    }

    Err(SeedlinkError::InvalidResponse(
        "v3 payload is not recognizable miniSEED".into(),
    ))
}

fn is_mseed3_signature(data: &[u8]) -> bool {
    data.len() >= MSEED3_FIXED_HEADER_LEN && &data[0..2] == b"MS" && data[2] == 3
}

fn mseed3_record_length(data: &[u8]) -> Result<usize> {
    let sid_len = data[33] as usize;
    let extra_len = u16::from_le_bytes([data[34], data[35]]) as usize;
    let data_len = u32::from_le_bytes([data[36], data[37], data[38], data[39]]) as usize;
    Ok(MSEED3_FIXED_HEADER_LEN + sid_len + extra_len + data_len)
}

fn is_mseed2_signature(data: &[u8]) -> bool {
    if data.len() < MSEED2_FIXED_HEADER_LEN {
        return false;
    }
    // Bytes 0..6 are the 6-digit ASCII sequence number; byte 6 is the data
    // header/quality indicator, one of D, R, Q, M.
    data[0..6].iter().all(u8::is_ascii_digit) && matches!(data[6], b'D' | b'R' | b'Q' | b'M')
}

/// Walk the miniSEED2 blockette chain looking for blockette 1000 (data-only
/// SEED record length). Falls back to probing for the next valid fixed
/// header at 64-byte-aligned offsets if no 1000 blockette is present.
fn mseed2_record_length(data: &[u8]) -> Result<usize> {
    let swapped = looks_byte_swapped(data);

    let read_u16 = |off: usize| -> u16 {
        let bytes = [data[off], data[off + 1]];
        if swapped {
            u16::from_le_bytes(bytes)
        } else {
            u16::from_be_bytes(bytes)
        }
    };

    let num_blockettes = data[39];
    let mut next_offset = read_u16(46) as usize;

    if num_blockettes > 0 && next_offset != 0 {
        let mut visited_from = 0usize;
        loop {
            if next_offset == 0 {
                break;
            }
            if next_offset <= visited_from || next_offset + 4 > data.len() {
                return Err(SeedlinkError::InvalidResponse(
                    "miniSEED2 blockette chain is malformed".into(),
                ));
            }
            let blkt_type = read_u16(next_offset);
            let blkt_next = read_u16(next_offset + 2) as usize;

            if blkt_type == 1000 {
                if next_offset + 7 > data.len() {
                    return Err(SeedlinkError::FrameTooShort {
                        expected: next_offset + 7,
                        actual: data.len(),
                    });
                }
                let length_exponent = data[next_offset + 6];
                return Ok(1usize << length_exponent);
            }

            visited_from = next_offset;
            next_offset = blkt_next;
        }
    }

    // No 1000 blockette: probe subsequent 64-byte-aligned offsets for the
    // start of the next fixed header.
    let mut probe = MSEED2_FIXED_HEADER_LEN;
    while probe + MSEED2_FIXED_HEADER_LEN <= data.len() {
        if is_mseed2_signature(&data[probe..]) {
            return Ok(probe);
        }
        probe += 64;
    }

    Err(SeedlinkError::InvalidResponse(
        "miniSEED2 record has no blockette 1000 and no discoverable next header".into(),
    ))
}

/// Sanity-check the record's year/day-of-year field (bytes 20..24, BE) to
/// decide whether the record is byte-swapped relative to network order.
fn looks_byte_swapped(data: &[u8]) -> bool {
    let year_be = u16::from_be_bytes([data[20], data[21]]);
    let day_be = u16::from_be_bytes([data[22], data[23]]);
    let plausible_be = (1960..=2100).contains(&year_be) && (1..=366).contains(&day_be);
    !plausible_be
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mseed2_header(num_blockettes: u8, first_blockette_offset: u16) -> Vec<u8> {
        let mut h = vec![0u8; MIN_DETECT_PREFIX];
        h[0..6].copy_from_slice(b"000001");
        h[6] = b'D';
        h[8..13].copy_from_slice(b"ANMO ");
        h[18..20].copy_from_slice(b"IU");
        h[20..22].copy_from_slice(&2024u16.to_be_bytes());
        h[22..24].copy_from_slice(&15u16.to_be_bytes());
        h[39] = num_blockettes;
        h[46..48].copy_from_slice(&first_blockette_offset.to_be_bytes());
        h
    }

    #[test]
    fn detects_mseed2_via_blockette_1000() {
        let mut data = mseed2_header(1, 48);
        data.extend_from_slice(&[0u8; 16]);
        // Blockette 1000 at offset 48: type=1000, next=0, encoding, word order, length exponent=9 (512)
        data[48..50].copy_from_slice(&1000u16.to_be_bytes());
        data[50..52].copy_from_slice(&0u16.to_be_bytes());
        data[54] = 9;

        let result = detect_v3_payload(&data, false, false).unwrap();
        assert_eq!(result.format, PacketFormat::MiniSeed2);
        assert_eq!(result.length, 512);
    }

    #[test]
    fn detects_mseed2_info_variant() {
        let mut data = mseed2_header(1, 48);
        data.extend_from_slice(&[0u8; 16]);
        data[48..50].copy_from_slice(&1000u16.to_be_bytes());
        data[50..52].copy_from_slice(&0u16.to_be_bytes());
        data[54] = 8;

        let result = detect_v3_payload(&data, true, true).unwrap();
        assert_eq!(result.format, PacketFormat::MiniSeed2InfoTerm);
        assert_eq!(result.length, 256);
    }

    #[test]
    fn rejects_non_miniseed() {
        let data = vec![0xFFu8; MIN_DETECT_PREFIX];
        assert!(detect_v3_payload(&data, false, false).is_err());
    }

    #[test]
    fn rejects_short_prefix() {
        let data = vec![0u8; 10];
        assert!(matches!(
            detect_v3_payload(&data, false, false).unwrap_err(),
            SeedlinkError::FrameTooShort { .. }
        ));
    }

    #[test]
    fn rejects_backwards_blockette_chain() {
        let mut data = mseed2_header(2, 48);
        data.extend_from_slice(&[0u8; 16]);
        // First blockette points back to offset 10, which is before itself.
        data[48..50].copy_from_slice(&200u16.to_be_bytes());
        data[50..52].copy_from_slice(&10u16.to_be_bytes());

        assert!(detect_v3_payload(&data, false, false).is_err());
    }

    #[test]
    fn falls_back_to_next_header_probe() {
        let mut data = mseed2_header(0, 0);
        data.resize(128, 0);
        let next = mseed2_header(0, 0);
        data[MSEED2_FIXED_HEADER_LEN..MSEED2_FIXED_HEADER_LEN + MSEED2_FIXED_HEADER_LEN]
            .copy_from_slice(&next[..MSEED2_FIXED_HEADER_LEN]);

        let result = detect_v3_payload(&data, false, false).unwrap();
        assert_eq!(result.length, MSEED2_FIXED_HEADER_LEN);
    }
}
