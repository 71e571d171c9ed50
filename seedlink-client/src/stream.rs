//! Adapt [`SeedLinkClient::collect`]'s poll loop into a [`Stream`] of owned
//! packets, for callers who'd rather `while let Some(packet) = stream.next()`
//! than drive the Connection Loop by hand.

use futures_core::Stream;

use crate::client::{SeedLinkClient, Status};
use crate::error::ClientError;
use crate::state::PacketInfo;

const INITIAL_BUF: usize = 8 * 1024;

/// One fully received packet: its descriptor plus the payload bytes it
/// carried, decoupled from the `collect` buffer that produced them.
#[derive(Clone, Debug)]
pub struct OwnedPacket {
    pub info: PacketInfo,
    pub payload: Vec<u8>,
}

/// Turn a [`SeedLinkClient`] into a [`Stream`] of [`OwnedPacket`]s.
///
/// The stream never ends on its own — a dropped connection is reconnected
/// transparently by the Connection Loop — except when `collect` returns an
/// error, which the stream yields once before terminating.
pub fn packet_stream(mut client: SeedLinkClient) -> impl Stream<Item = Result<OwnedPacket, ClientError>> {
    async_stream::try_stream! {
        let mut buf = vec![0u8; INITIAL_BUF];
        loop {
            match client.collect(&mut buf).await? {
                Status::Packet => {
                    let info = client.packet().expect("Packet implies a descriptor").clone();
                    let payload = buf[..info.payload_len as usize].to_vec();
                    yield OwnedPacket { info, payload };
                }
                Status::TooLarge => {
                    buf.resize(buf.len() * 2, 0);
                }
                Status::NoPacket | Status::Terminate => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConfig, MockServer};
    use seedlink_rs_protocol::SequenceNumber;
    use seedlink_rs_protocol::frame::v3;
    use std::pin::pin;
    use tokio_stream::StreamExt;

    fn make_v3_frame(seq: u64, station: &str, network: &str) -> Vec<u8> {
        let mut payload = [0u8; v3::PAYLOAD_LEN];
        let sta_bytes = station.as_bytes();
        for (i, &b) in sta_bytes.iter().enumerate().take(5) {
            payload[8 + i] = b;
        }
        for i in sta_bytes.len()..5 {
            payload[8 + i] = b' ';
        }
        let net_bytes = network.as_bytes();
        for (i, &b) in net_bytes.iter().enumerate().take(2) {
            payload[18 + i] = b;
        }
        for i in net_bytes.len()..2 {
            payload[18 + i] = b' ';
        }
        v3::write(SequenceNumber::new(seq), &payload).unwrap()
    }

    #[tokio::test]
    async fn stream_yields_frames() {
        let frames = vec![make_v3_frame(1, "ANMO", "IU"), make_v3_frame(2, "ANMO", "IU")];
        let config = MockConfig {
            uni_mode: true,
            ..MockConfig::v3_default(frames)
        };
        let server = MockServer::start(config).await;

        let mut client = SeedLinkClient::new("stream-test");
        client.set_address(&server.addr().to_string()).unwrap();
        client.set_uni_params(None).unwrap();

        let mut stream = pin!(packet_stream(client));

        let packet1 = stream.next().await.unwrap().unwrap();
        assert_eq!(packet1.info.seq, SequenceNumber::new(1));

        let packet2 = stream.next().await.unwrap().unwrap();
        assert_eq!(packet2.info.seq, SequenceNumber::new(2));
    }
}
