//! Control channel message types (spec section 4.8). Carried length-prefixed
//! JSON over the same reliable stream the handshake used to establish the
//! first suite.

use serde::{Deserialize, Serialize};

use crate::status::StatusSnapshot;

/// Challenge issued by the listener (GCS) immediately after the stream
/// opens, before any [`ControlMessage`] is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthChallenge {
    /// Random bytes the peer must sign to prove its identity.
    pub nonce: Vec<u8>,
}

/// Response to an [`AuthChallenge`]: a signature over the challenge nonce
/// under the sender's long-term signature key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Signature over `nonce`.
    pub signature: Vec<u8>,
}

/// Application-level control messages, exchanged after mutual
/// authentication completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Drone → GCS: begin a handshake under `suite_id`.
    StartSuite {
        /// Suite id to negotiate.
        suite_id: String,
    },
    /// Drone → GCS: announce the next suite and when to cut over to it.
    PrepareRekey {
        /// Suite id the rekey will move to.
        next_suite_id: String,
        /// Unix milliseconds (drone clock, adjusted by the Chronos offset)
        /// at which both sides stop sending with the old Session.
        cutover_at_unix_ms: i64,
    },
    /// Either side: terminate the current suite run and the tunnel.
    StopSuite,
    /// Either side: request the peer's current status snapshot.
    QueryStatus,
    /// Drone → GCS, first leg of the Chronos clock-offset exchange.
    ChronosSync {
        /// `t1`: drone's send timestamp, in Unix nanoseconds.
        t_drone_send_unix_ns: i64,
    },
    /// GCS → Drone, second and third legs of the Chronos exchange.
    ChronosSyncReply {
        /// `t2`: GCS's receive timestamp for the `ChronosSync` it answers.
        t_gcs_recv_unix_ns: i64,
        /// `t3`: GCS's send timestamp for this reply.
        t_gcs_send_unix_ns: i64,
    },
    /// Generic acknowledgement, referencing the message it responds to.
    Ack {
        /// Free-form description of what is being acknowledged.
        in_reply_to: String,
    },
    /// Response to [`ControlMessage::QueryStatus`].
    StatusReport {
        /// The responder's current status snapshot.
        snapshot: StatusSnapshot,
    },
    /// A protocol-level error the peer should know about.
    Error {
        /// Human-readable description.
        message: String,
    },
}
