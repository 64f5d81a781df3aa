//! Static signature identity (C13): the long-term ML-DSA keypair a process
//! presents during the handshake and control-channel auth, plus the
//! pre-provisioned peer public key it trusts.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::core::IdentityError;
use crate::registry::SignatureAlgorithm;

use super::primitives::{sign, signature_keygen, verify};

/// A process's long-term signature identity: its own keypair, the
/// algorithm it was generated under, and the peer public key it trusts.
///
/// The secret key is zeroized on drop.
pub struct StaticIdentity {
    algorithm: SignatureAlgorithm,
    public_key: Vec<u8>,
    secret_key: Vec<u8>,
    peer_public_key: Vec<u8>,
}

impl StaticIdentity {
    /// Generate a fresh keypair under `algorithm`, pairing it with a
    /// pre-provisioned `peer_public_key`. Used by tests and by first-run
    /// provisioning tooling; production processes load from disk instead.
    pub fn generate(algorithm: SignatureAlgorithm, peer_public_key: Vec<u8>) -> Self {
        let kp = signature_keygen(algorithm);
        Self {
            algorithm,
            public_key: kp.public_key,
            secret_key: kp.secret_key,
            peer_public_key,
        }
    }

    /// Load an identity from a directory containing `secret_key.bin`,
    /// `public_key.bin`, `algorithm.txt`, and `peer_public_key.bin`.
    pub fn load(dir: &Path) -> Result<Self, IdentityError> {
        let read = |name: &str| -> Result<Vec<u8>, IdentityError> {
            let path = dir.join(name);
            fs::read(&path).map_err(|source| IdentityError::Read {
                path: path.display().to_string(),
                source,
            })
        };

        let algorithm_bytes = read("algorithm.txt")?;
        let algorithm_name = String::from_utf8(algorithm_bytes)
            .map_err(|_| IdentityError::Malformed("algorithm.txt is not valid UTF-8".into()))?;
        let algorithm = parse_algorithm(algorithm_name.trim())?;

        let secret_key = read("secret_key.bin")?;
        let public_key = read("public_key.bin")?;
        let peer_public_key = read("peer_public_key.bin")?;

        if secret_key.is_empty() || public_key.is_empty() || peer_public_key.is_empty() {
            return Err(IdentityError::Malformed(
                "identity key material must not be empty".into(),
            ));
        }

        Ok(Self {
            algorithm,
            public_key,
            secret_key,
            peer_public_key,
        })
    }

    /// Write this identity's material to `dir`, creating it if needed.
    /// Used by provisioning tooling and tests, not by the proxy at runtime.
    pub fn save(&self, dir: &Path) -> Result<(), IdentityError> {
        fs::create_dir_all(dir).map_err(|source| IdentityError::Read {
            path: dir.display().to_string(),
            source,
        })?;
        let write = |name: &str, bytes: &[u8]| -> Result<(), IdentityError> {
            fs::write(dir.join(name), bytes).map_err(|source| IdentityError::Read {
                path: dir.join(name).display().to_string(),
                source,
            })
        };
        write("algorithm.txt", algorithm_name(self.algorithm).as_bytes())?;
        write("secret_key.bin", &self.secret_key)?;
        write("public_key.bin", &self.public_key)?;
        write("peer_public_key.bin", &self.peer_public_key)?;
        Ok(())
    }

    /// This identity's signature algorithm.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// This identity's public key bytes.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The pre-provisioned peer public key this identity trusts.
    pub fn peer_public_key(&self) -> &[u8] {
        &self.peer_public_key
    }

    /// Sign `message` with the local secret key.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        sign(self.algorithm, &self.secret_key, message)
            .expect("local secret key material is always well-formed")
    }

    /// Verify `signature` over `message` as having come from the trusted
    /// peer. Returns [`IdentityError::NotTrusted`] on any mismatch.
    pub fn verify_peer(&self, message: &[u8], signature: &[u8]) -> Result<(), IdentityError> {
        verify(self.algorithm, &self.peer_public_key, message, signature)
            .map_err(|_| IdentityError::NotTrusted)
    }

    /// A short, human-displayable fingerprint of the local public key
    /// (first 16 hex chars of its SHA-256 digest).
    pub fn fingerprint(&self) -> String {
        hex::encode(self.fingerprint_bytes())
    }

    /// Fingerprint of the trusted peer public key.
    pub fn peer_fingerprint(&self) -> String {
        hex::encode(self.peer_fingerprint_bytes())
    }

    /// Raw fingerprint bytes of the local public key, as carried on the
    /// wire in `ServerHello.sig_pk_fingerprint`.
    pub fn fingerprint_bytes(&self) -> Vec<u8> {
        fingerprint_of(&self.public_key)
    }

    /// Raw fingerprint bytes of the trusted peer public key, compared
    /// byte-for-byte against a peer's declared fingerprint.
    pub fn peer_fingerprint_bytes(&self) -> Vec<u8> {
        fingerprint_of(&self.peer_public_key)
    }
}

impl Drop for StaticIdentity {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

fn fingerprint_of(public_key: &[u8]) -> Vec<u8> {
    Sha256::digest(public_key)[..8].to_vec()
}

fn algorithm_name(algorithm: SignatureAlgorithm) -> &'static str {
    match algorithm {
        SignatureAlgorithm::MlDsa44 => "ML-DSA-44",
        SignatureAlgorithm::MlDsa65 => "ML-DSA-65",
        SignatureAlgorithm::MlDsa87 => "ML-DSA-87",
    }
}

fn parse_algorithm(name: &str) -> Result<SignatureAlgorithm, IdentityError> {
    match name {
        "ML-DSA-44" => Ok(SignatureAlgorithm::MlDsa44),
        "ML-DSA-65" => Ok(SignatureAlgorithm::MlDsa65),
        "ML-DSA-87" => Ok(SignatureAlgorithm::MlDsa87),
        other => Err(IdentityError::Malformed(format!(
            "unknown signature algorithm: {other}"
        ))),
    }
}
