//! Crypto Primitives (C2): a thin contract over KEM, signature, AEAD, and
//! KDF, resolved per [`Suite`](crate::registry::Suite) rather than hard-wired
//! to one algorithm. No primitive panics on malformed input; every failure
//! is a typed [`CryptoError`].

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key as AesKey, Nonce as AesNonce};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use pqcrypto_mldsa::mldsa44;
use pqcrypto_mldsa::mldsa65;
use pqcrypto_mldsa::mldsa87;
use pqcrypto_mlkem::mlkem512;
use pqcrypto_mlkem::mlkem768;
use pqcrypto_mlkem::mlkem1024;
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as _PkTrait, SecretKey as _SkTrait,
};
use sha2::Sha256;

use crate::core::CryptoError;
use crate::registry::{AeadAlgorithm, KemAlgorithm, SignatureAlgorithm};

/// A KEM keypair, algorithm-tagged.
pub struct KemKeypair {
    /// Which KEM this keypair belongs to.
    pub algorithm: KemAlgorithm,
    /// Serialized public key bytes.
    pub public_key: Vec<u8>,
    /// Serialized secret key bytes.
    pub secret_key: Vec<u8>,
}

/// Generate a fresh KEM keypair for `algorithm`.
pub fn kem_keygen(algorithm: KemAlgorithm) -> KemKeypair {
    match algorithm {
        KemAlgorithm::MlKem512 => {
            let (pk, sk) = mlkem512::keypair();
            KemKeypair {
                algorithm,
                public_key: pk.as_bytes().to_vec(),
                secret_key: sk.as_bytes().to_vec(),
            }
        }
        KemAlgorithm::MlKem768 => {
            let (pk, sk) = mlkem768::keypair();
            KemKeypair {
                algorithm,
                public_key: pk.as_bytes().to_vec(),
                secret_key: sk.as_bytes().to_vec(),
            }
        }
        KemAlgorithm::MlKem1024 => {
            let (pk, sk) = mlkem1024::keypair();
            KemKeypair {
                algorithm,
                public_key: pk.as_bytes().to_vec(),
                secret_key: sk.as_bytes().to_vec(),
            }
        }
    }
}

/// Encapsulate against `public_key`, returning (ciphertext, shared secret).
pub fn kem_encapsulate(
    algorithm: KemAlgorithm,
    public_key: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    match algorithm {
        KemAlgorithm::MlKem512 => {
            let pk = mlkem512::PublicKey::from_bytes(public_key)
                .map_err(|_| CryptoError::DecapFail)?;
            let (ss, ct) = mlkem512::encapsulate(&pk);
            Ok((ct.as_bytes().to_vec(), ss.as_bytes().to_vec()))
        }
        KemAlgorithm::MlKem768 => {
            let pk = mlkem768::PublicKey::from_bytes(public_key)
                .map_err(|_| CryptoError::DecapFail)?;
            let (ss, ct) = mlkem768::encapsulate(&pk);
            Ok((ct.as_bytes().to_vec(), ss.as_bytes().to_vec()))
        }
        KemAlgorithm::MlKem1024 => {
            let pk = mlkem1024::PublicKey::from_bytes(public_key)
                .map_err(|_| CryptoError::DecapFail)?;
            let (ss, ct) = mlkem1024::encapsulate(&pk);
            Ok((ct.as_bytes().to_vec(), ss.as_bytes().to_vec()))
        }
    }
}

/// Decapsulate `ciphertext` with `secret_key`, returning the shared secret.
pub fn kem_decapsulate(
    algorithm: KemAlgorithm,
    secret_key: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    match algorithm {
        KemAlgorithm::MlKem512 => {
            let sk = mlkem512::SecretKey::from_bytes(secret_key)
                .map_err(|_| CryptoError::DecapFail)?;
            let ct = mlkem512::Ciphertext::from_bytes(ciphertext)
                .map_err(|_| CryptoError::DecapFail)?;
            Ok(mlkem512::decapsulate(&ct, &sk).as_bytes().to_vec())
        }
        KemAlgorithm::MlKem768 => {
            let sk = mlkem768::SecretKey::from_bytes(secret_key)
                .map_err(|_| CryptoError::DecapFail)?;
            let ct = mlkem768::Ciphertext::from_bytes(ciphertext)
                .map_err(|_| CryptoError::DecapFail)?;
            Ok(mlkem768::decapsulate(&ct, &sk).as_bytes().to_vec())
        }
        KemAlgorithm::MlKem1024 => {
            let sk = mlkem1024::SecretKey::from_bytes(secret_key)
                .map_err(|_| CryptoError::DecapFail)?;
            let ct = mlkem1024::Ciphertext::from_bytes(ciphertext)
                .map_err(|_| CryptoError::DecapFail)?;
            Ok(mlkem1024::decapsulate(&ct, &sk).as_bytes().to_vec())
        }
    }
}

/// A signature keypair, algorithm-tagged.
pub struct SignatureKeypair {
    /// Which signature scheme this keypair belongs to.
    pub algorithm: SignatureAlgorithm,
    /// Serialized public key bytes.
    pub public_key: Vec<u8>,
    /// Serialized secret key bytes.
    pub secret_key: Vec<u8>,
}

/// Generate a fresh long-term signature keypair for `algorithm`.
pub fn signature_keygen(algorithm: SignatureAlgorithm) -> SignatureKeypair {
    match algorithm {
        SignatureAlgorithm::MlDsa44 => {
            let (pk, sk) = mldsa44::keypair();
            SignatureKeypair {
                algorithm,
                public_key: pk.as_bytes().to_vec(),
                secret_key: sk.as_bytes().to_vec(),
            }
        }
        SignatureAlgorithm::MlDsa65 => {
            let (pk, sk) = mldsa65::keypair();
            SignatureKeypair {
                algorithm,
                public_key: pk.as_bytes().to_vec(),
                secret_key: sk.as_bytes().to_vec(),
            }
        }
        SignatureAlgorithm::MlDsa87 => {
            let (pk, sk) = mldsa87::keypair();
            SignatureKeypair {
                algorithm,
                public_key: pk.as_bytes().to_vec(),
                secret_key: sk.as_bytes().to_vec(),
            }
        }
    }
}

/// Sign `message` with `secret_key`, returning a detached signature.
pub fn sign(
    algorithm: SignatureAlgorithm,
    secret_key: &[u8],
    message: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    match algorithm {
        SignatureAlgorithm::MlDsa44 => {
            let sk = mldsa44::SecretKey::from_bytes(secret_key)
                .map_err(|_| CryptoError::VerifyFail)?;
            Ok(mldsa44::detached_sign(message, &sk).as_bytes().to_vec())
        }
        SignatureAlgorithm::MlDsa65 => {
            let sk = mldsa65::SecretKey::from_bytes(secret_key)
                .map_err(|_| CryptoError::VerifyFail)?;
            Ok(mldsa65::detached_sign(message, &sk).as_bytes().to_vec())
        }
        SignatureAlgorithm::MlDsa87 => {
            let sk = mldsa87::SecretKey::from_bytes(secret_key)
                .map_err(|_| CryptoError::VerifyFail)?;
            Ok(mldsa87::detached_sign(message, &sk).as_bytes().to_vec())
        }
    }
}

/// Verify `signature` over `message` under `public_key`.
pub fn verify(
    algorithm: SignatureAlgorithm,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let ok = match algorithm {
        SignatureAlgorithm::MlDsa44 => {
            let pk = mldsa44::PublicKey::from_bytes(public_key)
                .map_err(|_| CryptoError::VerifyFail)?;
            let sig = mldsa44::DetachedSignature::from_bytes(signature)
                .map_err(|_| CryptoError::VerifyFail)?;
            mldsa44::verify_detached_signature(&sig, message, &pk).is_ok()
        }
        SignatureAlgorithm::MlDsa65 => {
            let pk = mldsa65::PublicKey::from_bytes(public_key)
                .map_err(|_| CryptoError::VerifyFail)?;
            let sig = mldsa65::DetachedSignature::from_bytes(signature)
                .map_err(|_| CryptoError::VerifyFail)?;
            mldsa65::verify_detached_signature(&sig, message, &pk).is_ok()
        }
        SignatureAlgorithm::MlDsa87 => {
            let pk = mldsa87::PublicKey::from_bytes(public_key)
                .map_err(|_| CryptoError::VerifyFail)?;
            let sig = mldsa87::DetachedSignature::from_bytes(signature)
                .map_err(|_| CryptoError::VerifyFail)?;
            mldsa87::verify_detached_signature(&sig, message, &pk).is_ok()
        }
    };
    if ok {
        Ok(())
    } else {
        Err(CryptoError::VerifyFail)
    }
}

/// Fixed key length for every AEAD this registry supports.
pub const AEAD_KEY_LEN: usize = 32;

/// Tag length appended to every AEAD ciphertext.
pub const AEAD_TAG_LEN: usize = 16;

/// Nonce length required by a given AEAD.
pub fn aead_nonce_len(algorithm: AeadAlgorithm) -> usize {
    match algorithm {
        AeadAlgorithm::Aes256Gcm => 12,
        AeadAlgorithm::XChaCha20Poly1305 => 24,
    }
}

/// Build the per-frame nonce: `epoch(4) || sequence(8)`, left-padded to
/// `nonce_len` with `direction` repeated. The two directions already use
/// distinct keys (`k_d2g` / `k_g2d`), so the direction byte is a second,
/// redundant domain separator; for AEADs whose nonce is exactly 12 bytes
/// (no room to pad) it has no effect, which is fine since the key already
/// separates the two directions.
pub fn construct_nonce(epoch: u32, sequence: u64, nonce_len: usize, direction: u8) -> Vec<u8> {
    let mut core = Vec::with_capacity(12);
    core.extend_from_slice(&epoch.to_be_bytes());
    core.extend_from_slice(&sequence.to_be_bytes());
    debug_assert!(nonce_len >= core.len(), "nonce_len too short for epoch||sequence");
    let mut nonce = vec![direction; nonce_len - core.len()];
    nonce.extend_from_slice(&core);
    nonce
}

/// Seal `plaintext` under `key`/`nonce` with associated data `aad`,
/// returning `ciphertext || tag`.
pub fn aead_seal(
    algorithm: AeadAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let payload = Payload {
        msg: plaintext,
        aad,
    };
    match algorithm {
        AeadAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(key));
            let nonce = AesNonce::from_slice(nonce);
            cipher
                .encrypt(nonce, payload)
                .map_err(|_| CryptoError::AuthFail)
        }
        AeadAlgorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
            let nonce = XNonce::from_slice(nonce);
            cipher
                .encrypt(nonce, payload)
                .map_err(|_| CryptoError::AuthFail)
        }
    }
}

/// Open `ciphertext_and_tag` under `key`/`nonce` with associated data `aad`.
pub fn aead_open(
    algorithm: AeadAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext_and_tag: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let payload = Payload {
        msg: ciphertext_and_tag,
        aad,
    };
    match algorithm {
        AeadAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(key));
            let nonce = AesNonce::from_slice(nonce);
            cipher
                .decrypt(nonce, payload)
                .map_err(|_| CryptoError::AuthFail)
        }
        AeadAlgorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
            let nonce = XNonce::from_slice(nonce);
            cipher
                .decrypt(nonce, payload)
                .map_err(|_| CryptoError::AuthFail)
        }
    }
}

/// HKDF-SHA256 extract: `salt`, `ikm` -> pseudorandom key.
pub fn kdf_extract(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    let (prk, _hk) = Hkdf::<Sha256>::extract(Some(salt), ikm);
    prk.into()
}

/// HKDF-SHA256 expand: `prk`, `info` -> `len` bytes of output key material.
pub fn kdf_expand(prk: &[u8; 32], info: &[u8], len: usize) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::from_prk(prk).map_err(|_| CryptoError::KeyDerivationFailed)?;
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(okm)
}
