//! Protocol constants fixed by the wire format in spec section 6.
//!
//! These values MUST NOT change without bumping `PROTOCOL_VERSION`.

use std::time::Duration;

// =============================================================================
// FRAME WIRE FORMAT
// =============================================================================

/// Fixed magic byte identifying a data-plane frame.
pub const FRAME_MAGIC: u8 = 0x5C;

/// Current data-plane wire version.
pub const FRAME_VERSION: u8 = 0x01;

/// Frame header size: magic(1) + version(1) + suite_family(1) + epoch(4) + seq(8).
pub const FRAME_HEADER_SIZE: usize = 15;

/// Nonce direction byte for drone -> GCS frames.
pub const NONCE_DIR_D2G: u8 = 0x01;

/// Nonce direction byte for GCS -> drone frames.
pub const NONCE_DIR_G2D: u8 = 0x02;

// =============================================================================
// REPLAY WINDOW
// =============================================================================

/// Sliding replay window width in bits (design constant; see spec 9).
pub const REPLAY_WINDOW_BITS: u64 = 64;

// =============================================================================
// EPOCH
// =============================================================================

/// Epoch value reserved to mean "not yet established".
pub const EPOCH_UNESTABLISHED: u32 = 0;

/// First epoch assigned to the initial handshake.
pub const EPOCH_INITIAL: u32 = 1;

// =============================================================================
// DEFAULT CONFIGURATION VALUES (spec section 6)
// =============================================================================

/// Default handshake deadline.
pub const DEFAULT_HANDSHAKE_DEADLINE: Duration = Duration::from_millis(5000);

/// Default rekey grace window during which the previous epoch is still accepted.
pub const DEFAULT_REKEY_GRACE: Duration = Duration::from_millis(250);

/// Default bound on draining the proxy loop before a forced exit.
pub const DEFAULT_PROXY_SHUTDOWN_DEADLINE: Duration = Duration::from_millis(1000);

/// Default status snapshot write cadence.
pub const DEFAULT_STATUS_WRITE_INTERVAL: Duration = Duration::from_millis(500);

/// Default backoff before the coordinator tries the next suite after a
/// handshake failure.
pub const DEFAULT_SUITE_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound on the proxy loop's cooperative tick (status export, rate
/// limit refill).
pub const PROXY_TICK_INTERVAL: Duration = Duration::from_millis(5);

// =============================================================================
// DEFAULT PORTS (spec section 6)
// =============================================================================

/// GCS handshake/control TCP port.
pub const DEFAULT_GCS_CONTROL_PORT: u16 = 46000;

/// GCS encrypted-in UDP port.
pub const DEFAULT_GCS_ENCRYPTED_PORT: u16 = 46011;

/// Drone encrypted-in UDP port.
pub const DEFAULT_DRONE_ENCRYPTED_PORT: u16 = 46012;

/// GCS loopback plaintext transmit port.
pub const DEFAULT_GCS_PLAINTEXT_TX_PORT: u16 = 47001;

/// GCS loopback plaintext receive port.
pub const DEFAULT_GCS_PLAINTEXT_RX_PORT: u16 = 47002;

/// Drone loopback plaintext transmit port.
pub const DEFAULT_DRONE_PLAINTEXT_TX_PORT: u16 = 47003;

/// Drone loopback plaintext receive port.
pub const DEFAULT_DRONE_PLAINTEXT_RX_PORT: u16 = 47004;
