// SPDX-License-Identifier: MIT OR Apache-2.0

//! The validating session: the single entry point
//! [`Session::add_nalu_and_authenticate`] and the report assembly around
//! the validation engine.

use log::debug;

use crate::authenticity::{AccumulatedValidation, AuthenticityReport, ProductInfo};
use crate::crypto::Verifier;
use crate::error::Error;
use crate::tlv::CryptoInfo;
use crate::validation::{Validation, ValidationOutcome};
use crate::vendor::axis::AxisAttestation;
use crate::{AuthenticityLevel, Codec};

/// A validating session. One per stream, strictly single-threaded: each
/// [`Session::add_nalu_and_authenticate`] call returns fully before the
/// next. Independent sessions own disjoint state and may run on different
/// threads.
pub struct Session {
    codec: Codec,
    level: AuthenticityLevel,
    verifier: Box<dyn Verifier>,
    validation: Validation,
    accumulated: AccumulatedValidation,
}

impl Session {
    pub fn new(codec: Codec, verifier: Box<dyn Verifier>) -> Self {
        Session {
            codec,
            level: AuthenticityLevel::Frame,
            verifier,
            validation: Validation::new(codec),
            accumulated: AccumulatedValidation::default(),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Stores the preferred authenticity level. The validator follows the
    /// stream itself (FRAME-level verdicts whenever a SEI carries a hash
    /// list), so this is informational, mirroring the signing-side knob.
    pub fn set_authenticity_level(&mut self, level: AuthenticityLevel) {
        self.level = level;
    }

    pub fn authenticity_level(&self) -> AuthenticityLevel {
        self.level
    }

    /// Adds one NAL unit, in arrival order, and returns a report if its
    /// arrival settled a GOP.
    ///
    /// A malformed NAL unit is not an error: it is carried through the
    /// pending list (`E`/`U`) and the call returns `Ok(None)`. Signature
    /// verification failure is a verdict in the report, not an error.
    pub fn add_nalu_and_authenticate(
        &mut self,
        nalu: &[u8],
    ) -> Result<Option<AuthenticityReport>, Error> {
        if nalu.is_empty() {
            return Err(Error::InvalidParameter("empty nalu"));
        }
        self.accumulated.number_of_received_nalus += 1;
        let outcome = self.validation.add_nalu(&*self.verifier, nalu)?;
        Ok(outcome.map(|o| self.assemble_report(o)))
    }

    /// Drops all pending state; accumulated counters, the active public
    /// key, and the latest product info survive. Use when jumping within a
    /// stream (fast forward, file export boundaries).
    pub fn reset(&mut self) {
        debug!("session reset");
        self.validation.reset();
    }

    /// Signature algorithm identification from the most recent
    /// `CRYPTO_INFO` record, if any has been received.
    pub fn crypto_info(&self) -> Option<&CryptoInfo> {
        self.validation.crypto_info.as_ref()
    }

    /// Most recently received `ARBITRARY_DATA` payload.
    pub fn arbitrary_data(&self) -> Option<&[u8]> {
        self.validation.arbitrary_data.as_deref()
    }

    /// Most recently received Axis attestation blob, echoed as-is.
    pub fn axis_attestation(&self) -> Option<&AxisAttestation> {
        self.validation.axis_attestation.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn set_max_pending_gops(&mut self, n: usize) {
        self.validation.set_max_pending_gops(n);
    }

    fn assemble_report(&mut self, outcome: ValidationOutcome) -> AuthenticityReport {
        self.accumulated.absorb(&outcome.latest);
        self.accumulated.number_of_validated_nalus += outcome.drained.validated;
        self.accumulated.number_of_unknown_nalus += outcome.drained.unknown;
        self.accumulated.number_of_invalid_nalus += outcome.drained.invalid;
        AuthenticityReport {
            latest_validation: outcome.latest,
            accumulated_validation: self.accumulated.clone(),
            product_info: self
                .validation
                .product_info
                .clone()
                .unwrap_or_else(ProductInfo::default),
            version_on_signing_side: self
                .validation
                .signing_version
                .clone()
                .unwrap_or_default(),
            this_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}
