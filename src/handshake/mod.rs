//! Handshake Engine (C5): wire messages and the initiator/responder state
//! machine that turns a KEM + signature exchange into a keyed [`Session`].

mod engine;
mod messages;

pub use engine::HandshakeEngine;
pub use messages::{ClientHello, ClientKemCt, Finished, ServerHello, PROTOCOL_VERSION};
