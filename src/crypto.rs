// SPDX-License-Identifier: MIT OR Apache-2.0

//! Digest plumbing and the abstract signature capability.
//!
//! The library never interprets key material; it only compares keys for
//! byte-equality (change detection) and hands them to the caller-supplied
//! [`Verifier`]. Signature algorithm identifiers travel on the wire in the
//! `CRYPTO_INFO` record and are equally opaque here.

use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq;

/// Size of every digest used by the library, on the wire and in memory.
pub const HASH_DIGEST_SIZE: usize = 32;

/// A fixed-size SHA-256 digest.
pub type Digest = [u8; HASH_DIGEST_SIZE];

/// Incremental digest over canonicalised NAL unit bytes.
#[derive(Clone)]
pub struct HashEngine(Sha256);

impl HashEngine {
    pub fn init() -> Self {
        HashEngine(Sha256::new())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> Digest {
        self.0.finalize().into()
    }
}

/// Digest of one NAL unit's hashable bytes (header + emulation-stripped
/// RBSP, stop bit excluded).
pub fn nalu_hash(hashable: &[u8]) -> Digest {
    let mut e = HashEngine::init();
    e.update(hashable);
    e.finalize()
}

/// Digest over the ordered concatenation of per-NALU digests; the GOP hash.
pub fn gop_hash<'a>(hashes: impl IntoIterator<Item = &'a Digest>) -> Digest {
    let mut e = HashEngine::init();
    for h in hashes {
        e.update(h);
    }
    e.finalize()
}

/// Constant-time digest comparison.
pub fn digests_equal(a: &Digest, b: &Digest) -> bool {
    a.ct_eq(b).into()
}

/// Constant-time comparison of variable-length key/signature material.
pub fn bytes_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Verifies a signed digest against a public key.
///
/// Implementations must be deterministic and side-effect-free. Key storage,
/// algorithm selection, and certificate handling all live behind this trait.
pub trait Verifier {
    fn verify(&self, public_key: &[u8], digest: &Digest, signature: &[u8]) -> bool;
}

/// Produces signatures on the signing side; the counterpart of [`Verifier`].
pub trait Signer {
    fn sign(&self, digest: &Digest) -> Vec<u8>;

    /// The public key to transmit in recurrent SEIs.
    fn public_key(&self) -> &[u8];
}
