//! Session (C6): the keyed, epoch-scoped state the data-plane proxy uses to
//! seal outbound frames and open inbound ones.
//!
//! A `Session` is immutable key material plus a handful of interior-mutable
//! counters (`send_seq`, the replay window, traffic stats), which makes it
//! safe to share behind a single `Arc<Session>` between the task that
//! produces it (handshake or rekey) and the proxy loop that consumes it —
//! the rekey coordinator publishes a new `Arc<Session>` on a `watch`
//! channel, the proxy loop swaps its pointer, and that swap is the entire
//! handoff. Rekey never mutates an old Session's keys in place; it
//! publishes a brand new one.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use zeroize::Zeroize;

use crate::core::{CryptoError, Role, EPOCH_UNESTABLISHED, NONCE_DIR_D2G, NONCE_DIR_G2D};
use crate::frame::header_bytes;
use crate::registry::AeadAlgorithm;

use super::primitives::{aead_nonce_len, aead_open, aead_seal, construct_nonce};
use super::replay::ReplayWindow;

/// One direction's traffic accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectionStats {
    /// Frames processed in this direction since the session was formed.
    pub frames: u64,
    /// Payload bytes (post-decrypt / pre-encrypt) processed in this direction.
    pub bytes: u64,
}

/// A keyed session for one epoch of the tunnel.
pub struct Session {
    epoch: u32,
    suite_id: String,
    suite_family: u8,
    aead: AeadAlgorithm,
    role: Role,
    k_d2g: Vec<u8>,
    k_g2d: Vec<u8>,
    send_seq: AtomicU64,
    peer_addr_pin: SocketAddr,
    replay_window: Mutex<ReplayWindow>,
    created_at: Instant,
    sent: Mutex<DirectionStats>,
    received: Mutex<DirectionStats>,
}

impl Session {
    /// Build a new session immediately after a handshake or rekey produces
    /// `k_d2g`/`k_g2d`. `epoch` must be non-zero; epoch 0 is reserved for
    /// "no session established yet" and callers should represent that case
    /// as `Option<Session>` rather than constructing one here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        epoch: u32,
        suite_id: String,
        suite_family: u8,
        aead: AeadAlgorithm,
        role: Role,
        k_d2g: Vec<u8>,
        k_g2d: Vec<u8>,
        peer_addr_pin: SocketAddr,
    ) -> Self {
        debug_assert_ne!(epoch, EPOCH_UNESTABLISHED, "epoch 0 means unestablished");
        Self {
            epoch,
            suite_id,
            suite_family,
            aead,
            role,
            k_d2g,
            k_g2d,
            send_seq: AtomicU64::new(0),
            peer_addr_pin,
            replay_window: Mutex::new(ReplayWindow::new()),
            created_at: Instant::now(),
            sent: Mutex::new(DirectionStats::default()),
            received: Mutex::new(DirectionStats::default()),
        }
    }

    /// This session's epoch number.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// The suite id this session was negotiated under.
    pub fn suite_id(&self) -> &str {
        &self.suite_id
    }

    /// The informational suite-family byte carried in every frame header.
    pub fn suite_family(&self) -> u8 {
        self.suite_family
    }

    /// The pinned peer `(ip, port)` for this session.
    pub fn peer_addr_pin(&self) -> SocketAddr {
        self.peer_addr_pin
    }

    /// How long this session has been active.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Outbound traffic counters.
    pub fn sent_stats(&self) -> DirectionStats {
        *self.sent.lock().expect("session stats mutex poisoned")
    }

    /// Inbound traffic counters.
    pub fn received_stats(&self) -> DirectionStats {
        *self.received.lock().expect("session stats mutex poisoned")
    }

    fn local_send_key(&self) -> &[u8] {
        match self.role {
            Role::Drone => &self.k_d2g,
            Role::Gcs => &self.k_g2d,
        }
    }

    fn local_recv_key(&self) -> &[u8] {
        match self.role {
            Role::Drone => &self.k_g2d,
            Role::Gcs => &self.k_d2g,
        }
    }

    fn send_direction_byte(&self) -> u8 {
        match self.role {
            Role::Drone => NONCE_DIR_D2G,
            Role::Gcs => NONCE_DIR_G2D,
        }
    }

    fn recv_direction_byte(&self) -> u8 {
        match self.role {
            Role::Drone => NONCE_DIR_G2D,
            Role::Gcs => NONCE_DIR_D2G,
        }
    }

    /// Seal the next outbound datagram payload, consuming the next sequence
    /// number. Sequences start at 1 within an epoch. Returns
    /// `(sequence, ciphertext_with_tag)`; the caller frames this with the
    /// header codec.
    pub fn seal_outbound(&self, plaintext: &[u8]) -> Result<(u64, Vec<u8>), CryptoError> {
        let seq = self.send_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let nonce_len = aead_nonce_len(self.aead);
        let direction = self.send_direction_byte();
        let nonce = construct_nonce(self.epoch, seq, nonce_len, direction);
        let aad = header_bytes(self.suite_family, self.epoch, seq);
        let ciphertext = aead_seal(self.aead, self.local_send_key(), &nonce, &aad, plaintext)?;

        let mut sent = self.sent.lock().expect("session stats mutex poisoned");
        sent.frames += 1;
        sent.bytes += plaintext.len() as u64;
        Ok((seq, ciphertext))
    }

    /// Check whether `sequence` would be accepted by the replay window,
    /// without committing it. Call this before attempting AEAD open so a
    /// replayed ciphertext never reaches the expensive decrypt path.
    pub fn replay_check(&self, sequence: u64) -> crate::core::ReplayOutcome {
        self.replay_window
            .lock()
            .expect("replay window mutex poisoned")
            .check(self.epoch, sequence)
    }

    /// Open an inbound datagram payload at `sequence`, verifying the AEAD
    /// tag and, only on success, committing the sequence to the replay
    /// window. Callers must have already consulted [`Self::replay_check`]
    /// for early rejection; this method still safely no-ops the window
    /// commit when the tag fails to verify.
    pub fn open_inbound(
        &self,
        sequence: u64,
        ciphertext_with_tag: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let nonce_len = aead_nonce_len(self.aead);
        let direction = self.recv_direction_byte();
        let nonce = construct_nonce(self.epoch, sequence, nonce_len, direction);
        let aad = header_bytes(self.suite_family, self.epoch, sequence);
        let plaintext = aead_open(
            self.aead,
            self.local_recv_key(),
            &nonce,
            &aad,
            ciphertext_with_tag,
        )?;

        self.replay_window
            .lock()
            .expect("replay window mutex poisoned")
            .commit(self.epoch, sequence);
        let mut received = self.received.lock().expect("session stats mutex poisoned");
        received.frames += 1;
        received.bytes += plaintext.len() as u64;
        Ok(plaintext)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.k_d2g.zeroize();
        self.k_g2d.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired_sessions(aead: AeadAlgorithm) -> (Session, Session) {
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let k_d2g = vec![0x11u8; 32];
        let k_g2d = vec![0x22u8; 32];
        let drone = Session::new(
            1,
            "test-suite".into(),
            0,
            aead,
            Role::Drone,
            k_d2g.clone(),
            k_g2d.clone(),
            peer,
        );
        let gcs = Session::new(
            1,
            "test-suite".into(),
            0,
            aead,
            Role::Gcs,
            k_d2g,
            k_g2d,
            peer,
        );
        (drone, gcs)
    }

    #[test]
    fn drone_to_gcs_roundtrip() {
        let (drone, gcs) = paired_sessions(AeadAlgorithm::Aes256Gcm);
        let (seq, ct) = drone.seal_outbound(b"mavlink heartbeat").unwrap();
        assert_eq!(gcs.replay_check(seq), crate::core::ReplayOutcome::Accept);
        let pt = gcs.open_inbound(seq, &ct).unwrap();
        assert_eq!(pt, b"mavlink heartbeat");
    }

    #[test]
    fn gcs_to_drone_roundtrip_xchacha() {
        let (drone, gcs) = paired_sessions(AeadAlgorithm::XChaCha20Poly1305);
        let (seq, ct) = gcs.seal_outbound(b"command").unwrap();
        let pt = drone.open_inbound(seq, &ct).unwrap();
        assert_eq!(pt, b"command");
    }

    #[test]
    fn replay_is_rejected_after_first_delivery() {
        let (drone, gcs) = paired_sessions(AeadAlgorithm::Aes256Gcm);
        let (seq, ct) = drone.seal_outbound(b"frame one").unwrap();
        assert!(gcs.open_inbound(seq, &ct).is_ok());
        assert_eq!(gcs.replay_check(seq), crate::core::ReplayOutcome::Replay);
        assert!(gcs.open_inbound(seq, &ct).is_err());
    }

    #[test]
    fn tampered_ciphertext_does_not_advance_replay_window() {
        let (drone, gcs) = paired_sessions(AeadAlgorithm::Aes256Gcm);
        let (seq, mut ct) = drone.seal_outbound(b"frame").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(gcs.open_inbound(seq, &ct).is_err());
        assert_eq!(gcs.replay_check(seq), crate::core::ReplayOutcome::Accept);
    }

    #[test]
    fn reflection_across_directions_is_rejected() {
        let (drone, _gcs) = paired_sessions(AeadAlgorithm::Aes256Gcm);
        let (seq, ct) = drone.seal_outbound(b"frame").unwrap();
        // drone trying to "receive" its own outbound frame must fail: the
        // AAD direction byte and key selection differ per role.
        assert!(drone.open_inbound(seq, &ct).is_err());
    }

    #[test]
    fn sequence_numbers_increase_monotonically_starting_at_one() {
        let (drone, _gcs) = paired_sessions(AeadAlgorithm::Aes256Gcm);
        let (seq0, _) = drone.seal_outbound(b"a").unwrap();
        let (seq1, _) = drone.seal_outbound(b"b").unwrap();
        assert_eq!(seq0, 1);
        assert_eq!(seq1, 2);
    }
}
