//! Error types for the secure tunnel, one enum per layer composed into
//! [`TunnelError`] at the binary boundary.

use thiserror::Error;

/// Errors from the crypto primitive contracts (KEM, signature, AEAD, KDF).
#[derive(Debug, Error)]
pub enum CryptoError {
    /// KEM decapsulation failed.
    #[error("KEM decapsulation failed")]
    DecapFail,

    /// AEAD open failed (invalid tag or corrupted ciphertext/AAD).
    #[error("AEAD authentication failed")]
    AuthFail,

    /// Signature verification failed.
    #[error("signature verification failed")]
    VerifyFail,

    /// Key derivation failed (HKDF extract/expand).
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Requested suite id is not present in the registry.
    #[error("unknown suite id: {0}")]
    UnknownSuite(String),
}

/// Errors from frame encode/decode (spec section 4.3).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Magic byte did not match [`crate::core::constants::FRAME_MAGIC`].
    #[error("bad magic byte: {0:#04x}")]
    BadMagic(u8),

    /// Version byte is not a version this build understands.
    #[error("unsupported frame version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// Datagram shorter than header + minimum AEAD tag length.
    #[error("datagram too short: {len} bytes, need at least {min}")]
    TooShort {
        /// Observed datagram length.
        len: usize,
        /// Minimum required length.
        min: usize,
    },
}

/// Outcome of a replay window check (spec section 4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Sequence accepted; window state should be committed.
    Accept,
    /// Sequence already seen within the window.
    Replay,
    /// Sequence older than the window can represent.
    TooOld,
}

/// Handshake failure modes (spec section 4.5).
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Peer's declared protocol version does not match ours.
    #[error("protocol version mismatch: local {local}, peer {peer}")]
    VersionMismatch {
        /// This side's protocol version.
        local: u16,
        /// The peer's declared protocol version.
        peer: u16,
    },

    /// The requested suite id is not in the registry.
    #[error("unknown suite: {0}")]
    UnknownSuite(String),

    /// A signature over a handshake message failed to verify.
    #[error("signature invalid")]
    SignatureInvalid,

    /// KEM decapsulation of the client's ciphertext failed.
    #[error("decapsulation failed")]
    DecapsulationFailed,

    /// The `Finished` MAC did not match the locally computed transcript MAC.
    #[error("finished mismatch")]
    FinishedMismatch,

    /// The peer's signature fingerprint did not match the pre-provisioned one.
    #[error("peer identity fingerprint mismatch")]
    FingerprintMismatch,

    /// The handshake did not complete within `handshake_deadline_ms`.
    #[error("handshake timed out")]
    Timeout,

    /// Underlying I/O error on the handshake stream.
    #[error("handshake I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A handshake message failed to (de)serialize.
    #[error("handshake message encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Key derivation failed while computing the key schedule.
    #[error("key schedule error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Errors surfaced from the data-plane proxy loop (spec section 4.6/7).
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Underlying socket I/O error.
    #[error("proxy socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The status snapshot file could not be written atomically.
    #[error("status export failed: {0}")]
    StatusExport(std::io::Error),
}

/// Errors from the control channel (spec section 4.8).
#[derive(Debug, Error)]
pub enum ControlError {
    /// Underlying stream I/O error.
    #[error("control channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A control message failed to (de)serialize.
    #[error("control message encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Mutual challenge-response authentication failed at connect time.
    #[error("control channel authentication failed")]
    AuthFailed,

    /// The control channel was lost; both sides must terminate.
    #[error("control channel disconnected")]
    Disconnected,

    /// The peer reported a protocol-level error.
    #[error("peer reported error: {0}")]
    PeerError(String),
}

/// Errors from the rekey coordinator (spec section 4.7), which drives both
/// the control channel and the handshake engine.
#[derive(Debug, Error)]
pub enum RekeyError {
    /// The control channel failed or disconnected mid-run.
    #[error("control channel error during rekey: {0}")]
    Control(#[from] ControlError),

    /// A suite handshake (initial or rekey) failed.
    #[error("handshake error during rekey: {0}")]
    Handshake(#[from] HandshakeError),

    /// The peer sent a control message that made no sense in the current
    /// coordinator state.
    #[error("unexpected control message during rekey: {0}")]
    UnexpectedMessage(String),
}

/// Configuration loading/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file failed to parse as TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required field was missing or a value was out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Identity/trust errors (spec exit code 3).
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity file could not be read.
    #[error("failed to read identity file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The identity file contents were malformed.
    #[error("malformed identity material: {0}")]
    Malformed(String),

    /// The peer's declared signature fingerprint did not match the
    /// pre-provisioned public key on file.
    #[error("peer identity not trusted: fingerprint mismatch")]
    NotTrusted,
}

/// Top-level tunnel error, composing every layer's error type.
///
/// The binary entry points match on this to select an exit code per
/// spec section 6.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Configuration error (exit code 2).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Identity/trust error (exit code 3).
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Handshake failure, all suites exhausted (exit code 4).
    #[error("handshake failure: {0}")]
    Handshake(#[from] HandshakeError),

    /// Proxy loop error.
    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// Control channel / peer loss (exit code 5).
    #[error("control channel error: {0}")]
    Control(#[from] ControlError),

    /// Rekey coordinator failure (either a control-channel or handshake
    /// problem surfaced while rotating suites).
    #[error("rekey coordinator error: {0}")]
    Rekey(#[from] RekeyError),
}

impl TunnelError {
    /// Map this error to the process exit code defined in spec section 6.
    pub fn exit_code(&self) -> i32 {
        match self {
            TunnelError::Config(_) => 2,
            TunnelError::Identity(_) => 3,
            TunnelError::Handshake(_) => 4,
            TunnelError::Control(_) => 5,
            TunnelError::Proxy(_) => 1,
            TunnelError::Rekey(RekeyError::Control(_) | RekeyError::UnexpectedMessage(_)) => 5,
            TunnelError::Rekey(RekeyError::Handshake(_)) => 4,
        }
    }
}
