//! Core types shared across the tunnel: constants, configuration, and errors.

mod config;
mod constants;
mod error;

pub use config::{LoggingConfig, RawConfig, Role, TunnelConfig};
pub use constants::*;
pub use error::{
    ConfigError, ControlError, CryptoError, HandshakeError, HeaderError, IdentityError,
    ProxyError, RekeyError, ReplayOutcome, TunnelError,
};
