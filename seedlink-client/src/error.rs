use std::time::Duration;

/// Errors that can occur during SeedLink client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// TCP or socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SeedLink protocol parsing error (invalid frame, bad command format, etc.).
    #[error("protocol error: {0}")]
    Protocol(#[from] seedlink_rs_protocol::SeedlinkError),

    /// Operation exceeded the configured timeout duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Server closed the connection (read returned 0 bytes).
    #[error("disconnected")]
    Disconnected,

    /// Server returned an ERROR response to a command.
    #[error("server error: {0}")]
    ServerError(String),

    /// Method called in wrong client state (e.g., `next_frame` before `end_stream`).
    #[error("invalid state: expected {expected}, actual {actual}")]
    InvalidState {
        /// The state(s) required for the operation.
        expected: &'static str,
        /// The current client state.
        actual: &'static str,
    },

    /// Protocol version negotiation failed.
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    /// Server sent an unexpected response line.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// `set_address` was given a syntactically invalid address.
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// `add_stream`/`set_uni_params` conflict (uni-station entry must be the
    /// only entry in the stream table).
    #[error("uni-station/multi-station conflict: {0}")]
    StreamTableConflict(String),

    /// `request_info` called while a query is already pending.
    #[error("an INFO request is already pending")]
    InfoRequestPending,

    /// The server sent a data packet for a station that matches no entry in
    /// the stream table.
    #[error("received packet for unsubscribed station: {0}")]
    UnsubscribedStation(String),

    /// All subscriptions were rejected during negotiation.
    #[error("all subscriptions rejected by server")]
    AllSubscriptionsRejected,

    /// A `-S` stream-spec item was not in `NET_STA[:selectors]` form.
    #[error("invalid stream spec: {0:?}")]
    InvalidStreamSpec(String),
}

/// Convenience alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;
