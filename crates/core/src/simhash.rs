//! Weighted SimHash fingerprints.
//!
//! Every term is hashed with BLAKE2b-512 and the digest, read as a big-endian
//! integer, is reduced to its low `size` bits. Each bit votes `+weight` when
//! set and `-weight` otherwise; output bit `i` is set only when its tally is
//! strictly positive.
//!
//! The textual form is the `size / 8` byte little-endian packing of the value,
//! base64 encoded with the standard alphabet. Stored fingerprints depend on
//! this exact byte order.

use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use blake2::{Blake2b512, Digest};

use crate::Error;

/// Default fingerprint width in bits.
pub const DEFAULT_SIMHASH_SIZE: usize = 256;

/// Normalized term -> occurrence count within one capture.
pub type FeatureSet = HashMap<String, u32>;

/// A fixed-width SimHash value.
///
/// Bytes are little-endian: byte `k` holds bits `8k..8k+8`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    bytes: Vec<u8>,
}

impl Fingerprint {
    /// Width in bits.
    pub fn size(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Value of bit `i`; bits past the width read as unset.
    pub fn bit(&self, i: usize) -> bool {
        self.bytes.get(i / 8).is_some_and(|b| (b >> (i % 8)) & 1 == 1)
    }

    /// Little-endian packed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of differing bits. A narrower fingerprint is zero-extended.
    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        let len = self.bytes.len().max(other.bytes.len());
        (0..len)
            .map(|k| {
                let a = self.bytes.get(k).copied().unwrap_or(0);
                let b = other.bytes.get(k).copied().unwrap_or(0);
                (a ^ b).count_ones()
            })
            .sum()
    }

    /// Base64 text form.
    pub fn encode(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Parse the base64 text form.
    pub fn decode(encoded: &str) -> Result<Self, Error> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Decode(format!("invalid simhash encoding: {e}")))?;
        if bytes.is_empty() {
            return Err(Error::Decode("empty simhash".into()));
        }
        Ok(Self { bytes })
    }
}

/// BLAKE2b-512 digest of a term.
fn term_digest(term: &str) -> [u8; 64] {
    let mut hasher = Blake2b512::new();
    hasher.update(term.as_bytes());
    let mut digest = [0u8; 64];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Bit `i` of a digest interpreted as a big-endian integer.
fn digest_bit(digest: &[u8; 64], i: usize) -> bool {
    match 63usize.checked_sub(i / 8) {
        Some(idx) => (digest[idx] >> (i % 8)) & 1 == 1,
        None => false,
    }
}

/// Compute the weighted SimHash of a feature set.
///
/// `size` must be a multiple of 8. Terms with a zero weight are ignored.
pub fn simhash(features: &FeatureSet, size: usize) -> Fingerprint {
    debug_assert!(size % 8 == 0, "simhash size must be a multiple of 8");

    let mut tally = vec![0i64; size];
    for (term, &weight) in features {
        if weight == 0 {
            continue;
        }
        let weight = i64::from(weight);
        let digest = term_digest(term);
        for (i, slot) in tally.iter_mut().enumerate() {
            if digest_bit(&digest, i) {
                *slot += weight;
            } else {
                *slot -= weight;
            }
        }
    }

    let mut bytes = vec![0u8; size / 8];
    for (i, &count) in tally.iter().enumerate() {
        if count > 0 {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }

    Fingerprint { bytes }
}

/// Compute and encode in one step.
pub fn encode_simhash(features: &FeatureSet, size: usize) -> String {
    simhash(features, size).encode()
}
