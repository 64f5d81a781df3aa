//! Cryptographic layer: primitive contracts (C2), long-term identities,
//! the replay window (C4), and the per-epoch session (C6).

mod identity;
mod primitives;
mod replay;
mod session;

pub use identity::StaticIdentity;
pub use primitives::{
    aead_nonce_len, aead_open, aead_seal, construct_nonce, kdf_expand, kdf_extract,
    kem_decapsulate, kem_encapsulate, kem_keygen, sign, signature_keygen, verify, KemKeypair,
    SignatureKeypair, AEAD_KEY_LEN, AEAD_TAG_LEN,
};
pub use replay::ReplayWindow;
pub use session::{DirectionStats, Session};
