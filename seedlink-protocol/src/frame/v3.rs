use crate::error::{Result, SeedlinkError};
use crate::sequence::SequenceNumber;

pub const SIGNATURE: &[u8; 2] = b"SL";
pub const INFO_SIGNATURE: &[u8; 6] = b"SLINFO";
pub const HEADER_LEN: usize = 8;

/// Parsed v3 header: either a sequenced data frame or an INFO chunk.
///
/// v3 carries no length or format field; the payload must be classified by
/// the payload detector once enough of it has been buffered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum V3Header {
    Data { sequence: SequenceNumber },
    Info { terminator: bool },
}

/// Parse the fixed 8-byte v3 header.
pub fn parse_header(data: &[u8]) -> Result<V3Header> {
    if data.len() < HEADER_LEN {
        return Err(SeedlinkError::FrameTooShort {
            expected: HEADER_LEN,
            actual: data.len(),
        });
    }

    if &data[0..6] == INFO_SIGNATURE.as_slice() {
        return Ok(V3Header::Info {
            terminator: data[7] == b'*',
        });
    }

    if &data[0..2] != SIGNATURE.as_slice() {
        return Err(SeedlinkError::InvalidSignature {
            expected: "SL",
            actual: [data[0], data[1]],
        });
    }

    let hex_str = std::str::from_utf8(&data[2..8])
        .map_err(|_| SeedlinkError::InvalidSequence("sequence bytes are not valid UTF-8".into()))?;
    let sequence = SequenceNumber::from_v3_hex(hex_str)?;

    Ok(V3Header::Data { sequence })
}

/// Write an 8-byte v3 data header. Payload bytes are appended by the caller.
pub fn write_header(sequence: SequenceNumber) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0..2].copy_from_slice(SIGNATURE);
    header[2..8].copy_from_slice(sequence.to_v3_hex().as_bytes());
    header
}
