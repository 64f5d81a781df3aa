//! Wire messages for the handshake stream, exchanged in this exact order.
//! Field declaration order is the wire's canonical order: both sides run
//! the same derived `Serialize` impl, so the serialized bytes — and thus
//! the transcript built from them — are byte-identical by construction.

use serde::{Deserialize, Serialize};

/// Protocol version this build speaks. Bumped on any wire-incompatible
/// change to the messages below.
pub const PROTOCOL_VERSION: u16 = 1;

/// Drone → GCS: opens the handshake, proposes a suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHello {
    /// Protocol version this side speaks.
    pub protocol_version: u16,
    /// 32 random bytes, mixed into the key schedule as `nonce_c`.
    pub nonce_c: Vec<u8>,
    /// Suite id the drone proposes.
    pub suite_id: String,
}

/// GCS → Drone: echoes the suite, supplies the ephemeral KEM public key,
/// and signs the exchange so far under the GCS's long-term key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerHello {
    /// 32 random bytes, mixed into the key schedule as `nonce_s`.
    pub nonce_s: Vec<u8>,
    /// Echo of the suite id from `ClientHello`, for explicit confirmation.
    pub suite_id_echo: String,
    /// Ephemeral KEM public key the drone must encapsulate against.
    pub kem_pk: Vec<u8>,
    /// Fingerprint of the GCS's long-term signature public key.
    pub sig_pk_fingerprint: Vec<u8>,
    /// Signature over `ClientHello bytes || nonce_s || suite_id || kem_pk`.
    pub signature: Vec<u8>,
}

/// Drone → GCS: the KEM ciphertext, signed under the drone's long-term key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientKemCt {
    /// KEM ciphertext encapsulated against `ServerHello.kem_pk`.
    pub kem_ct: Vec<u8>,
    /// Signature over `ServerHello bytes || kem_ct`.
    pub signature: Vec<u8>,
}

/// Exchanged by both sides once each, proving both computed the same key
/// schedule over the same transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finished {
    /// `HMAC(prk_exporter, "finished" || transcript_digest)`.
    pub mac: Vec<u8>,
}
