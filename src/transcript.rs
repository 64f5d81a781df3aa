//! HandshakeTranscript: the ordered byte-stream of protocol messages as
//! they cross the wire, used as signature input and folded into the key
//! schedule. Built during a handshake, consumed by sign/verify and the
//! `Finished` MAC, then dropped — it outlives nothing past session
//! formation.

use sha2::{Digest, Sha256};

/// Accumulates raw wire bytes in the exact order both sides exchange them.
#[derive(Default)]
pub struct HandshakeTranscript {
    bytes: Vec<u8>,
}

impl HandshakeTranscript {
    /// An empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the exact bytes of one wire message (length prefix included)
    /// to the transcript, in the order it was sent or received.
    pub fn extend(&mut self, message_bytes: &[u8]) {
        self.bytes.extend_from_slice(message_bytes);
    }

    /// The full transcript so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 digest of the transcript, used as input to the `Finished`
    /// MAC and as a compact signature-binding value.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(&self.bytes).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_changes_with_every_appended_byte() {
        let mut a = HandshakeTranscript::new();
        a.extend(b"client-hello");
        let mut b = HandshakeTranscript::new();
        b.extend(b"client-hell0");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn digest_is_order_sensitive() {
        let mut a = HandshakeTranscript::new();
        a.extend(b"one");
        a.extend(b"two");
        let mut b = HandshakeTranscript::new();
        b.extend(b"two");
        b.extend(b"one");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn empty_transcript_is_deterministic() {
        assert_eq!(HandshakeTranscript::new().digest(), HandshakeTranscript::new().digest());
    }
}
