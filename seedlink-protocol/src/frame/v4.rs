use crate::error::{Result, SeedlinkError};
use crate::frame::{PayloadFormat, PayloadSubformat, RawFrame};
use crate::sequence::SequenceNumber;

pub const SIGNATURE: &[u8; 2] = b"SE";

/// Minimum header size: 2 (sig) + 1 (format) + 1 (subformat) + 4 (payload len)
///                    + 8 (sequence) + 1 (station id len) = 17
pub const MIN_HEADER_LEN: usize = 17;

/// Parse a v4 frame from the beginning of a buffer.
///
/// Returns `(frame, bytes_consumed)` because v4 frames are variable-length.
pub fn parse(data: &[u8]) -> Result<(RawFrame<'_>, usize)> {
    if data.len() < MIN_HEADER_LEN {
        return Err(SeedlinkError::FrameTooShort {
            expected: MIN_HEADER_LEN,
            actual: data.len(),
        });
    }

    // Check signature
    if &data[0..2] != SIGNATURE.as_slice() {
        return Err(SeedlinkError::InvalidSignature {
            expected: "SE",
            actual: [data[0], data[1]],
        });
    }

    let format = PayloadFormat::from_byte(data[2])?;
    let subformat = PayloadSubformat::from_byte(data[3])?;

    let payload_len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;

    let seq_bytes: [u8; 8] = data[8..16].try_into().unwrap();
    let sequence = SequenceNumber::from_v4_le_bytes(seq_bytes);

    let station_id_len = data[16] as usize;
    let header_len = MIN_HEADER_LEN + station_id_len;
    let total_len = header_len + payload_len;

    if data.len() < total_len {
        return Err(SeedlinkError::FrameTooShort {
            expected: total_len,
            actual: data.len(),
        });
    }

    let station_id = std::str::from_utf8(&data[17..17 + station_id_len])
        .map_err(|_| SeedlinkError::InvalidCommand("station ID is not valid UTF-8".into()))?;

    let payload = &data[header_len..total_len];

    Ok((
        RawFrame::V4 {
            format,
            subformat,
            sequence,
            station_id,
            payload,
        },
        total_len,
    ))
}

/// Write a v4 frame.
pub fn write(
    format: PayloadFormat,
    subformat: PayloadSubformat,
    sequence: SequenceNumber,
    station_id: &str,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let station_id_bytes = station_id.as_bytes();
    let station_id_len = station_id_bytes.len();

    let header_len = MIN_HEADER_LEN + station_id_len;
    let total_len = header_len + payload.len();

    let mut frame = Vec::with_capacity(total_len);

    // Signature
    frame.extend_from_slice(SIGNATURE);
    // Format + Subformat
    frame.push(format.to_byte());
    frame.push(subformat.to_byte());
    // Payload length (u32 LE)
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    // Sequence (u64 LE)
    frame.extend_from_slice(&sequence.to_v4_le_bytes());
    // Station ID length (u8) + Station ID
    frame.push(station_id_len as u8);
    frame.extend_from_slice(station_id_bytes);
    // Payload
    frame.extend_from_slice(payload);

    debug_assert_eq!(frame.len(), total_len);
    Ok(frame)
}
