//! Exercises the SeedLink client end to end against a real server: connect,
//! subscribe, print each packet's sequence number, optionally persist state.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use seedlink_rs_client::{SeedLinkClient, Status};
use seedlink_rs_protocol::InfoLevel;

const DEFAULT_HOSTNAME: &str = "localhost";
const DEFAULT_PORT: u16 = 18000;

fn info_level(s: &str) -> Result<InfoLevel, String> {
    InfoLevel::parse(s).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "slink-collect")]
#[command(about = "Collect packets from a SeedLink server")]
struct Args {
    /// SeedLink server hostname.
    #[arg(default_value_t = DEFAULT_HOSTNAME.to_string())]
    hostname: String,

    /// SeedLink server port.
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Send keepalive (INFO ID) packets this often, in seconds.
    #[arg(short = 'k', long = "keepalive", value_name = "SECONDS")]
    keepalive: Option<u64>,

    /// Save and restore stream state to/from this file.
    #[arg(short = 'x', long = "state-file", value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Configure the connection in dial-up mode (stop after the initial buffer drains).
    #[arg(short = 'd', long = "dial-up")]
    dial_up: bool,

    /// Enable pipelined command batching.
    #[arg(short = 'b', long = "batch")]
    batch: bool,

    /// Define a comma-separated stream list: STREAM_1[:SELECTORS_1][,STREAM_2...],
    /// where STREAM_i is in NET_STA form, e.g. 'IU_ANMO:BHZ BHN,GE_WLF'.
    #[arg(short = 'S', long, value_name = "STREAMS")]
    streams: Option<String>,

    /// Path to a stream-list file (one NET_STA [selectors] entry per line).
    #[arg(short = 'l', long = "streamlist", value_name = "FILE")]
    stream_list_file: Option<PathBuf>,

    /// Request INFO of the given level and exit once it arrives.
    #[arg(short = 'i', long = "info", value_parser = info_level)]
    info: Option<InfoLevel>,

    /// Number of `collect` calls to make before giving up when nothing arrives.
    #[arg(long, default_value_t = 0)]
    max_rounds: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut client = SeedLinkClient::new("seedlink-rs-demos");
    client
        .set_address(&format!("{}:{}", args.hostname, args.port))
        .expect("invalid host/port");

    if let Some(seconds) = args.keepalive {
        client.set_keepalive(seconds);
    }
    client.set_dialup(args.dial_up);
    client.set_batch(args.batch);

    let mut total_added = 0;
    if let Some(spec) = &args.streams {
        match seedlink_rs_client::stream_list::parse_stream_list_string(spec) {
            Ok(entries) => total_added += seedlink_rs_client::stream_list::add_all(&mut client, &entries),
            Err(e) => {
                eprintln!("invalid -S stream spec: {e}");
                std::process::exit(1);
            }
        }
    }
    if let Some(path) = &args.stream_list_file {
        let contents = std::fs::read_to_string(path).expect("reading stream-list file");
        let entries = seedlink_rs_client::stream_list::parse_stream_list_file(&contents);
        total_added += seedlink_rs_client::stream_list::add_all(&mut client, &entries);
    }
    if total_added == 0 {
        client.set_uni_params(None).expect("uni-station fallback");
        info!("no streams given, falling back to uni-station mode");
    }

    if let Some(path) = &args.state_file {
        match client.recover_state(path) {
            Ok(true) => info!(path = %path.display(), "recovered stream state"),
            Ok(false) => info!(path = %path.display(), "no prior state file, starting fresh"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to recover state"),
        }
    }

    if let Some(level) = args.info {
        client.request_info(level).expect("queueing INFO request");
    }

    let mut buf = vec![0u8; 16 * 1024];
    let mut idle_rounds: u64 = 0;

    loop {
        match client.collect(&mut buf).await {
            Ok(Status::Packet) => {
                idle_rounds = 0;
                let packet = client.packet().expect("Packet implies a descriptor");
                println!("seq {} station {} bytes {}", packet.seq, packet.station_id, packet.payload_len);
                if let Some(path) = &args.state_file {
                    if let Err(e) = client.save_state(path) {
                        warn!(error = %e, "failed to save state");
                    }
                }
            }
            Ok(Status::TooLarge) => {
                buf.resize(buf.len() * 2, 0);
            }
            Ok(Status::NoPacket) => {
                idle_rounds += 1;
                if args.max_rounds > 0 && idle_rounds >= args.max_rounds {
                    info!("max-rounds reached with nothing pending, exiting");
                    break;
                }
            }
            Ok(Status::Terminate) => {
                info!("connection terminated");
                break;
            }
            Err(e) => {
                warn!(error = %e, "collect failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn verify_cli() {
        use super::Args;
        use clap::CommandFactory;

        Args::command().debug_assert()
    }
}
