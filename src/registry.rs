//! Suite Registry (C1): a static, insertion-ordered catalog of cryptographic
//! suites. Suite ids are opaque strings; lookup is by id only, there is no
//! downgrade logic and no semantic parsing of the id.

use serde::{Deserialize, Serialize};

/// KEM algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KemAlgorithm {
    /// ML-KEM-512.
    MlKem512,
    /// ML-KEM-768.
    MlKem768,
    /// ML-KEM-1024.
    MlKem1024,
}

/// Signature algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// ML-DSA-44.
    MlDsa44,
    /// ML-DSA-65.
    MlDsa65,
    /// ML-DSA-87.
    MlDsa87,
}

/// AEAD algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeadAlgorithm {
    /// AES-256-GCM.
    Aes256Gcm,
    /// XChaCha20-Poly1305.
    XChaCha20Poly1305,
}

/// An immutable suite record: `suite_id`, component algorithms, NIST
/// security level, and the suite's position in the catalog's canonical
/// ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    /// Stable, opaque suite identifier as it appears on the wire.
    pub suite_id: String,
    /// KEM used by this suite.
    pub kem: KemAlgorithm,
    /// Signature scheme used by this suite.
    pub signature: SignatureAlgorithm,
    /// AEAD used by this suite's data plane.
    pub aead: AeadAlgorithm,
    /// NIST PQC security level (1, 3, or 5).
    pub nist_level: u8,
    /// Position in the catalog's insertion order.
    pub ordering_index: usize,
}

/// Error returned when a suite id is not present in the registry.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("suite not found: {0}")]
pub struct NotFound(pub String);

/// Static, insertion-ordered suite catalog.
#[derive(Debug, Clone)]
pub struct SuiteRegistry {
    suites: Vec<Suite>,
}

impl SuiteRegistry {
    /// Build the default catalog used for benchmarking, in the order the
    /// coordinator walks them by default.
    pub fn default_catalog() -> Self {
        let mut suites = vec![
            Suite {
                suite_id: "ML-KEM-768+ML-DSA-65+AES-256-GCM".to_string(),
                kem: KemAlgorithm::MlKem768,
                signature: SignatureAlgorithm::MlDsa65,
                aead: AeadAlgorithm::Aes256Gcm,
                nist_level: 3,
                ordering_index: 0,
            },
            Suite {
                suite_id: "ML-KEM-512+ML-DSA-44+AES-256-GCM".to_string(),
                kem: KemAlgorithm::MlKem512,
                signature: SignatureAlgorithm::MlDsa44,
                aead: AeadAlgorithm::Aes256Gcm,
                nist_level: 1,
                ordering_index: 1,
            },
            Suite {
                suite_id: "ML-KEM-1024+ML-DSA-87+XChaCha20-Poly1305".to_string(),
                kem: KemAlgorithm::MlKem1024,
                signature: SignatureAlgorithm::MlDsa87,
                aead: AeadAlgorithm::XChaCha20Poly1305,
                nist_level: 5,
                ordering_index: 2,
            },
            Suite {
                suite_id: "ML-KEM-768+ML-DSA-65+XChaCha20-Poly1305".to_string(),
                kem: KemAlgorithm::MlKem768,
                signature: SignatureAlgorithm::MlDsa65,
                aead: AeadAlgorithm::XChaCha20Poly1305,
                nist_level: 3,
                ordering_index: 3,
            },
        ];
        suites.sort_by_key(|s| s.ordering_index);
        Self { suites }
    }

    /// Build a registry from an explicit, already-ordered suite list (e.g.
    /// loaded from a benchmark catalog file).
    pub fn from_suites(suites: Vec<Suite>) -> Self {
        Self { suites }
    }

    /// Look up a suite by id.
    pub fn by_id(&self, id: &str) -> Result<&Suite, NotFound> {
        self.suites
            .iter()
            .find(|s| s.suite_id == id)
            .ok_or_else(|| NotFound(id.to_string()))
    }

    /// Iterate suites in catalog order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Suite> {
        self.suites.iter()
    }

    /// Number of suites in the catalog.
    pub fn len(&self) -> usize {
        self.suites.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}

impl Default for SuiteRegistry {
    fn default() -> Self {
        Self::default_catalog()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id_succeeds() {
        let registry = SuiteRegistry::default_catalog();
        let suite = registry.by_id("ML-KEM-768+ML-DSA-65+AES-256-GCM").unwrap();
        assert_eq!(suite.nist_level, 3);
    }

    #[test]
    fn lookup_unknown_id_fails() {
        let registry = SuiteRegistry::default_catalog();
        assert!(registry.by_id("does-not-exist").is_err());
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let registry = SuiteRegistry::default_catalog();
        let indices: Vec<usize> = registry.iter_ordered().map(|s| s.ordering_index).collect();
        let mut sorted = indices.clone();
        sorted.sort();
        assert_eq!(indices, sorted);
    }
}
