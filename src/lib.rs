//! Secure Tunnel: a bump-in-the-wire proxy that encapsulates MAVLink UDP
//! traffic between a ground control station and a drone companion computer
//! inside a hybrid post-quantum authenticated/encrypted transport.

pub mod control;
pub mod core;
pub mod crypto;
pub mod frame;
pub mod handshake;
pub mod proxy;
pub mod registry;
pub mod rekey;
pub mod status;
pub mod transcript;
pub mod wire;
