//! Integration tests that connect to real SeedLink servers.
//!
//! Gated by environment variables so CI without network access skips them:
//! - `SEEDLINK_TEST_SERVER` — v3 server (e.g., `rtserve.iris.washington.edu:18000`)
//! - `SEEDLINK_V4_TEST_SERVER` — v4 server

use std::time::Duration;

use seedlink_rs_client::{SeedLinkClient, Status};

fn v3_server() -> Option<String> {
    std::env::var("SEEDLINK_TEST_SERVER").ok()
}

fn v4_server() -> Option<String> {
    std::env::var("SEEDLINK_V4_TEST_SERVER").ok()
}

/// Drive `collect` until a packet arrives, `rounds` timer ticks have passed
/// with nothing to report, or the connection terminates.
async fn collect_one(client: &mut SeedLinkClient, out: &mut [u8], rounds: usize) -> Option<Status> {
    for _ in 0..rounds {
        match client.collect(out).await.unwrap() {
            Status::Packet => return Some(Status::Packet),
            Status::Terminate => return Some(Status::Terminate),
            Status::TooLarge | Status::NoPacket => continue,
        }
    }
    None
}

#[tokio::test]
async fn v3_hello_and_stream() {
    let Some(addr) = v3_server() else {
        eprintln!("skipping: SEEDLINK_TEST_SERVER not set");
        return;
    };

    let mut client = SeedLinkClient::new("integration-test");
    client.set_address(&addr).unwrap();
    client.set_netdly(2);
    client.add_stream("IU_ANMO", Some("BHZ".into())).unwrap();

    let mut out = [0u8; 4096];
    let status = collect_one(&mut client, &mut out, 200).await;
    assert_eq!(status, Some(Status::Packet));
    assert!(!client.server_info().unwrap().software.is_empty());
}

#[tokio::test]
async fn v4_negotiate_and_stream() {
    let Some(addr) = v4_server() else {
        eprintln!("skipping: SEEDLINK_V4_TEST_SERVER not set");
        return;
    };

    let mut config = seedlink_rs_client::ClientConfig::new("integration-test", None);
    config.set_address(&addr).unwrap();
    let mut client = SeedLinkClient::with_config(config);
    client.add_stream("IU_ANMO", Some("BHZ".into())).unwrap();

    let mut out = [0u8; 4096];
    let status = collect_one(&mut client, &mut out, 200).await;
    assert_eq!(status, Some(Status::Packet));

    let info = client.server_info().unwrap();
    eprintln!("v4 server: {} {} ({})", info.software, info.version, info.organization);
}

#[tokio::test]
async fn v3_info_id() {
    let Some(addr) = v3_server() else {
        eprintln!("skipping: SEEDLINK_TEST_SERVER not set");
        return;
    };

    let mut client = SeedLinkClient::new("integration-test");
    client.set_address(&addr).unwrap();
    client.set_uni_params(None).unwrap();
    client.request_info(seedlink_rs_protocol::InfoLevel::Id).unwrap();

    let mut out = [0u8; 4096];
    let status = collect_one(&mut client, &mut out, 200).await;
    assert_eq!(status, Some(Status::Packet));
}

#[tokio::test]
async fn negotiate_timeout_is_reported() {
    // Port 1 is reserved; nothing ever answers, so repeated `collect` calls
    // should keep reporting `NoPacket` rather than panicking or hanging.
    let mut client = SeedLinkClient::new("integration-test");
    client.set_address("127.0.0.1:1").unwrap();
    client.set_netdly(1);
    client.add_stream("IU_ANMO", None).unwrap();

    let mut out = [0u8; 64];
    for _ in 0..3 {
        assert_eq!(
            tokio::time::timeout(Duration::from_secs(1), client.collect(&mut out))
                .await
                .unwrap()
                .unwrap(),
            Status::NoPacket
        );
    }
}
