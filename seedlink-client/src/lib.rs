//! Async SeedLink client for real-time seismic data streaming.
//!
//! Connect to SeedLink servers (IRIS, BMKG, etc.) and receive
//! miniSEED records in real-time.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod glob;
pub mod logger;
#[cfg(test)]
mod mock;
pub mod negotiate;
pub mod receive;
pub mod selector;
pub mod state;
pub mod statefile;
pub mod stream;
pub mod stream_list;
pub mod stream_table;
pub mod transport;

pub use auth::AuthCallbacks;
pub use client::{SeedLinkClient, Status};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use logger::{LogLevel, Logger};
pub use receive::{Control, ReceivePipeline, StepOutcome};
pub use state::{ConnectionState, Frame, Link, PacketInfo, Query, ServerInfo};
pub use stream::{packet_stream, OwnedPacket};
pub use stream_list::StreamEntry;
pub use stream_table::{StreamTable, Subscription};
pub use transport::{TcpTransport, Transport};
