// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test helpers: a deterministic signer/verifier pair, minimal NAL unit
//! builders, and a harness that feeds a stream through a validating
//! session while tallying verdicts.

use sha2::{Digest as _, Sha256};

use crate::authenticity::{Authenticity, ProductInfo};
use crate::crypto::{Digest, Signer, Verifier};
use crate::nal::UUID_LEN;
use crate::session::Session;
use crate::sign::SigningSession;
use crate::Codec;

/// Test signature scheme: `signature = SHA-256(public_key || digest)`.
/// Forgeable, deterministic, and entirely sufficient for exercising the
/// validation pipeline.
pub(crate) struct TestSigner {
    key: Vec<u8>,
}

impl TestSigner {
    pub fn new(key: &[u8]) -> Self {
        TestSigner { key: key.to_vec() }
    }
}

impl Signer for TestSigner {
    fn sign(&self, digest: &Digest) -> Vec<u8> {
        let mut h = Sha256::new();
        h.update(&self.key);
        h.update(digest);
        h.finalize().to_vec()
    }

    fn public_key(&self) -> &[u8] {
        &self.key
    }
}

/// Counterpart of [`TestSigner`].
pub(crate) struct TestVerifier;

impl Verifier for TestVerifier {
    fn verify(&self, public_key: &[u8], digest: &Digest, signature: &[u8]) -> bool {
        let mut h = Sha256::new();
        h.update(public_key);
        h.update(digest);
        h.finalize().as_slice() == signature
    }
}

/// Builds a minimal valid NAL unit of the requested flavor, with `id`
/// embedded so every unit hashes differently.
///
/// * `I`/`i`: primary / non-primary IDR (IRAP) slice
/// * `P`/`p`: primary / non-primary predicted slice
/// * `V`: parameter set
/// * `S`: a foreign (non-signed-video) SEI
/// * `X`: a NAL type outside the classified range
pub(crate) fn nalu(codec: Codec, flavor: char, id: u8) -> Vec<u8> {
    let mut v = vec![0, 0, 0, 1];
    match codec {
        Codec::H264 => match flavor {
            'I' => v.extend_from_slice(&[0x65, 0x88, id, 0x80]),
            'i' => v.extend_from_slice(&[0x65, 0x40, id, 0x80]),
            'P' => v.extend_from_slice(&[0x41, 0x9a, id, 0x80]),
            'p' => v.extend_from_slice(&[0x41, 0x40, id, 0x80]),
            'V' => v.extend_from_slice(&[0x67, 0x42, id, 0x80]),
            'S' => {
                v.push(0x06);
                v.push(0x05); // user_data_unregistered
                v.push(UUID_LEN as u8 + 2);
                v.extend_from_slice(&[0xAA; UUID_LEN]); // unknown uuid
                v.push(0x00); // reserved-ish filler
                v.push(id);
                v.push(0x80);
            }
            'X' => v.extend_from_slice(&[0x00, 0x42, id, 0x80]),
            _ => panic!("unknown nalu flavor {flavor:?}"),
        },
        Codec::H265 => match flavor {
            'I' => v.extend_from_slice(&[19 << 1, 0x01, 0x88, id, 0x80]),
            'i' => v.extend_from_slice(&[19 << 1, 0x01, 0x40, id, 0x80]),
            'P' => v.extend_from_slice(&[1 << 1, 0x01, 0x9a, id, 0x80]),
            'p' => v.extend_from_slice(&[1 << 1, 0x01, 0x40, id, 0x80]),
            'V' => v.extend_from_slice(&[32 << 1, 0x01, 0x42, id, 0x80]),
            'S' => {
                v.extend_from_slice(&[39 << 1, 0x01]);
                v.push(0x05);
                v.push(UUID_LEN as u8 + 2);
                v.extend_from_slice(&[0xAA; UUID_LEN]);
                v.push(0x00);
                v.push(id);
                v.push(0x80);
            }
            'X' => v.extend_from_slice(&[63 << 1, 0x01, 0x42, id, 0x80]),
            _ => panic!("unknown nalu flavor {flavor:?}"),
        },
    }
    v
}

pub(crate) fn test_product_info() -> ProductInfo {
    ProductInfo {
        hardware_id: "hw-id".into(),
        firmware_version: "fw-1.0".into(),
        serial_number: "0001".into(),
        manufacturer: "test".into(),
        address: "nowhere".into(),
    }
}

/// A fresh signing session with the default test key and product info.
pub(crate) fn signing_session(codec: Codec) -> SigningSession {
    let mut s = SigningSession::new(codec, Box::new(TestSigner::new(b"test-key-1")));
    s.set_product_info(test_product_info());
    s
}

/// Runs `pattern` (e.g. `"IPPIPPI"`) through a signing session, inserting
/// each produced SEI before the unit that triggered it. The result is the
/// wire-order list of NAL units, e.g. `"GIPPGIPPGI"`.
pub(crate) fn create_signed_nalus(signing: &mut SigningSession, codec: Codec, pattern: &str) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for (i, flavor) in pattern.chars().enumerate() {
        let unit = nalu(codec, flavor, i as u8);
        signing.add_nalu_for_signing(&unit).expect("signing add");
        while let Some(sei) = signing.take_sei_to_prepend() {
            out.push(sei.to_vec());
        }
        out.push(unit);
    }
    out
}

/// Verdict tallies over a whole stream, mirroring the counters the
/// original test suite asserts on.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ValidationStats {
    pub valid_gops: i32,
    pub valid_gops_with_missing_info: i32,
    pub invalid_gops: i32,
    pub unsigned_gops: i32,
    pub has_signature: i32,
    pub missed_nalus: i32,
    pub pending_nalus: i32,
    pub public_key_has_changed: bool,
}

/// Feeds every unit into `session`, accumulating report statistics.
pub(crate) fn validate_stream(session: &mut Session, nalus: &[Vec<u8>]) -> ValidationStats {
    let mut stats = ValidationStats::default();
    for unit in nalus {
        let report = session
            .add_nalu_and_authenticate(unit)
            .expect("add_nalu_and_authenticate");
        let Some(report) = report else { continue };
        let latest = &report.latest_validation;
        if latest.number_of_expected_picture_nalus >= 0 {
            stats.missed_nalus +=
                latest.number_of_expected_picture_nalus - latest.number_of_received_picture_nalus;
        }
        stats.pending_nalus += latest.number_of_pending_picture_nalus;
        match latest.authenticity {
            Authenticity::Ok => stats.valid_gops += 1,
            Authenticity::OkWithMissingInfo => stats.valid_gops_with_missing_info += 1,
            Authenticity::NotOk => stats.invalid_gops += 1,
            Authenticity::NotSigned => stats.unsigned_gops += 1,
            Authenticity::SignaturePresent => stats.has_signature += 1,
        }
        stats.public_key_has_changed |= latest.public_key_has_changed;
    }
    stats
}

/// A fresh validating session wired to the test verifier.
pub(crate) fn validating_session(codec: Codec) -> Session {
    Session::new(codec, Box::new(TestVerifier))
}
