//! Tunnel configuration: the enumerated options from spec section 6.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::*;
use super::error::ConfigError;

/// Which side of the tunnel this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ground Control Station: listens for the handshake/control stream.
    Gcs,
    /// Drone companion computer: initiates the handshake/control stream.
    Drone,
}

/// Raw, serializable configuration as loaded from a TOML file.
///
/// All durations are milliseconds on the wire; [`TunnelConfig::from_raw`]
/// converts them to [`Duration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfig {
    /// This process's role.
    pub role: Role,
    /// The peer's control-channel address (GCS address, from either side).
    pub peer_address: SocketAddr,
    /// Local control-channel bind address (GCS only; drone connects out).
    #[serde(default)]
    pub control_bind: Option<SocketAddr>,
    /// Local encrypted-socket bind address.
    #[serde(default)]
    pub encrypted_bind: Option<SocketAddr>,
    /// Local loopback address the proxy reads outbound application datagrams from.
    #[serde(default)]
    pub plaintext_tx: Option<SocketAddr>,
    /// Local loopback plaintext receive address (delivers decrypted datagrams here).
    #[serde(default)]
    pub plaintext_rx: Option<SocketAddr>,
    /// Enforce that the observed source (ip, port) equals the pinned peer address.
    #[serde(default = "default_true")]
    pub strict_peer_match: bool,
    /// Handshake deadline in milliseconds.
    #[serde(default = "default_handshake_deadline_ms")]
    pub handshake_deadline_ms: u64,
    /// Rekey grace window in milliseconds.
    #[serde(default = "default_rekey_grace_ms")]
    pub rekey_grace_ms: u64,
    /// Proxy drain deadline on shutdown, in milliseconds.
    #[serde(default = "default_proxy_shutdown_deadline_ms")]
    pub proxy_shutdown_deadline_ms: u64,
    /// Outbound rate limit in packets per second; `None` means unlimited.
    #[serde(default)]
    pub outbound_rate_limit_pps: Option<u32>,
    /// Status snapshot write interval in milliseconds.
    #[serde(default = "default_status_write_interval_ms")]
    pub status_write_interval_ms: u64,
    /// Path to the identity directory (private signature key + peer public key).
    pub identity_path: PathBuf,
    /// Path to the per-suite benchmark JSON-lines record.
    #[serde(default = "default_suite_log_path")]
    pub suite_log_path: PathBuf,
    /// Path to the atomic status snapshot file.
    #[serde(default = "default_status_path")]
    pub status_path: PathBuf,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Structured-logging configuration (ambient, not named by the spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing-subscriber` `EnvFilter` directive, e.g. "info,secure_tunnel=debug".
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON-formatted log lines instead of human-readable ones.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_handshake_deadline_ms() -> u64 {
    DEFAULT_HANDSHAKE_DEADLINE.as_millis() as u64
}

fn default_rekey_grace_ms() -> u64 {
    DEFAULT_REKEY_GRACE.as_millis() as u64
}

fn default_proxy_shutdown_deadline_ms() -> u64 {
    DEFAULT_PROXY_SHUTDOWN_DEADLINE.as_millis() as u64
}

fn default_status_write_interval_ms() -> u64 {
    DEFAULT_STATUS_WRITE_INTERVAL.as_millis() as u64
}

fn default_suite_log_path() -> PathBuf {
    PathBuf::from("suite_runs.jsonl")
}

fn default_status_path() -> PathBuf {
    PathBuf::from("status.json")
}

/// Fully resolved tunnel configuration used by the rest of the crate.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// This process's role.
    pub role: Role,
    /// The peer's control-channel address.
    pub peer_address: SocketAddr,
    /// Local control-channel bind address (listen address for GCS).
    pub control_bind: SocketAddr,
    /// Local encrypted-socket bind address.
    pub encrypted_bind: SocketAddr,
    /// Local loopback address the proxy reads outbound application datagrams from.
    pub plaintext_tx: SocketAddr,
    /// Local loopback address the proxy delivers inbound plaintext datagrams to.
    pub plaintext_rx: SocketAddr,
    /// Enforce strict (ip, port) peer pinning.
    pub strict_peer_match: bool,
    /// Handshake deadline.
    pub handshake_deadline: Duration,
    /// Rekey grace window.
    pub rekey_grace: Duration,
    /// Proxy shutdown drain deadline.
    pub proxy_shutdown_deadline: Duration,
    /// Outbound rate limit in packets per second.
    pub outbound_rate_limit_pps: Option<u32>,
    /// Status snapshot write interval.
    pub status_write_interval: Duration,
    /// Identity directory.
    pub identity_path: PathBuf,
    /// Suite run record JSON-lines path.
    pub suite_log_path: PathBuf,
    /// Atomic status snapshot path.
    pub status_path: PathBuf,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl TunnelConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&text)?;
        Self::from_raw(raw)
    }

    /// Resolve defaults for any unset address and validate the result.
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let (control_bind, encrypted_bind, plaintext_tx, plaintext_rx) = match raw.role {
            Role::Gcs => (
                raw.control_bind
                    .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_GCS_CONTROL_PORT)),
                raw.encrypted_bind
                    .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_GCS_ENCRYPTED_PORT)),
                raw.plaintext_tx
                    .unwrap_or(SocketAddr::new(loopback, DEFAULT_GCS_PLAINTEXT_TX_PORT)),
                raw.plaintext_rx
                    .unwrap_or(SocketAddr::new(loopback, DEFAULT_GCS_PLAINTEXT_RX_PORT)),
            ),
            Role::Drone => (
                raw.control_bind.unwrap_or(raw.peer_address),
                raw.encrypted_bind
                    .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_DRONE_ENCRYPTED_PORT)),
                raw.plaintext_tx
                    .unwrap_or(SocketAddr::new(loopback, DEFAULT_DRONE_PLAINTEXT_TX_PORT)),
                raw.plaintext_rx
                    .unwrap_or(SocketAddr::new(loopback, DEFAULT_DRONE_PLAINTEXT_RX_PORT)),
            ),
        };

        if raw.handshake_deadline_ms == 0 {
            return Err(ConfigError::Invalid(
                "handshake_deadline_ms must be > 0".into(),
            ));
        }

        Ok(Self {
            role: raw.role,
            peer_address: raw.peer_address,
            control_bind,
            encrypted_bind,
            plaintext_tx,
            plaintext_rx,
            strict_peer_match: raw.strict_peer_match,
            handshake_deadline: Duration::from_millis(raw.handshake_deadline_ms),
            rekey_grace: Duration::from_millis(raw.rekey_grace_ms),
            proxy_shutdown_deadline: Duration::from_millis(raw.proxy_shutdown_deadline_ms),
            outbound_rate_limit_pps: raw.outbound_rate_limit_pps,
            status_write_interval: Duration::from_millis(raw.status_write_interval_ms),
            identity_path: raw.identity_path,
            suite_log_path: raw.suite_log_path,
            status_path: raw.status_path,
            logging: raw.logging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw(role: Role) -> RawConfig {
        RawConfig {
            role,
            peer_address: "127.0.0.1:46000".parse().unwrap(),
            control_bind: None,
            encrypted_bind: None,
            plaintext_tx: None,
            plaintext_rx: None,
            strict_peer_match: true,
            handshake_deadline_ms: 5000,
            rekey_grace_ms: 250,
            proxy_shutdown_deadline_ms: 1000,
            outbound_rate_limit_pps: None,
            status_write_interval_ms: 500,
            identity_path: PathBuf::from("/tmp/identity"),
            suite_log_path: default_suite_log_path(),
            status_path: default_status_path(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn gcs_defaults_resolve() {
        let cfg = TunnelConfig::from_raw(minimal_raw(Role::Gcs)).unwrap();
        assert_eq!(cfg.control_bind.port(), DEFAULT_GCS_CONTROL_PORT);
        assert_eq!(cfg.encrypted_bind.port(), DEFAULT_GCS_ENCRYPTED_PORT);
        assert!(cfg.strict_peer_match);
    }

    #[test]
    fn drone_defaults_resolve() {
        let cfg = TunnelConfig::from_raw(minimal_raw(Role::Drone)).unwrap();
        assert_eq!(cfg.encrypted_bind.port(), DEFAULT_DRONE_ENCRYPTED_PORT);
        assert_eq!(cfg.control_bind, cfg.peer_address);
    }

    #[test]
    fn zero_handshake_deadline_rejected() {
        let mut raw = minimal_raw(Role::Gcs);
        raw.handshake_deadline_ms = 0;
        assert!(matches!(
            TunnelConfig::from_raw(raw),
            Err(ConfigError::Invalid(_))
        ));
    }
}
