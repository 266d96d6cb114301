// SPDX-License-Identifier: MIT OR Apache-2.0

//! The verdict surface returned to the caller after each settled GOP.

/// Authenticity verdict for one settled GOP (and, accumulated, for the
/// whole session so far).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Authenticity {
    /// Every covered NAL unit verified.
    Ok,
    /// Verified, but units were lost (identified via the per-frame hash
    /// list).
    OkWithMissingInfo,
    /// Verification failed.
    NotOk,
    /// No signed-video SEI has ever been observed.
    NotSigned,
    /// A signature exists but no GOP could be validated yet (mid-stream
    /// join, or the public key has not arrived).
    SignaturePresent,
}

impl Authenticity {
    /// Severity for accumulation; higher dominates.
    fn severity(self) -> u8 {
        match self {
            Authenticity::NotSigned => 0,
            Authenticity::SignaturePresent => 1,
            Authenticity::Ok => 2,
            Authenticity::OkWithMissingInfo => 3,
            Authenticity::NotOk => 4,
        }
    }

    pub(crate) fn worst(self, other: Authenticity) -> Authenticity {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// Per-item verdict, one character per NAL unit in the validation string.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValidationStatus {
    /// Registered, awaiting validation.
    Pending,
    /// Authenticity could not be determined (unparseable unit, or a SEI
    /// associated with units outside the validated segment).
    Unknown,
    /// Not part of the signature; no impact on authenticity.
    Ignored,
    /// Validated authentic.
    Ok,
    /// Validated not authentic.
    NotOk,
    /// One or more units are missing at this position.
    Missing,
    /// Validation could not run; treat as invalid.
    Error,
}

impl ValidationStatus {
    pub fn as_char(self) -> char {
        match self {
            ValidationStatus::Pending => 'P',
            ValidationStatus::Unknown => 'U',
            ValidationStatus::Ignored => '_',
            ValidationStatus::Ok => '.',
            ValidationStatus::NotOk => 'N',
            ValidationStatus::Missing => 'M',
            ValidationStatus::Error => 'E',
        }
    }
}

/// Device identity transmitted in the recurrent `PRODUCT_INFO` record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductInfo {
    pub hardware_id: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub manufacturer: String,
    pub address: String,
}

/// Result of the most recent GOP validation.
#[derive(Clone, Debug)]
pub struct LatestValidation {
    pub authenticity: Authenticity,
    /// The signing public key differs from the previously active one.
    pub public_key_has_changed: bool,
    /// Picture NAL units the SEI declared, or -1 when no declaration was
    /// available. `expected - received` may be negative (signer-side
    /// reset); it is surfaced as-is.
    pub number_of_expected_picture_nalus: i32,
    pub number_of_received_picture_nalus: i32,
    /// Items still pending after this validation (includes SEIs awaiting
    /// their GOP).
    pub number_of_pending_picture_nalus: i32,
    /// Positions (indices into `validation_str`) where units are missing.
    pub list_of_missing_nalus: Vec<usize>,
    /// Positions (indices into `validation_str`) of invalid units.
    pub list_of_invalid_nalus: Vec<usize>,
    /// Per-item verdict trail over the alphabet `P U _ . N M E`, covering
    /// every item known to the session at report time, in arrival order.
    pub validation_str: String,
}

/// Monotone counters over the whole session. Survives `reset`.
#[derive(Clone, Debug)]
pub struct AccumulatedValidation {
    /// Worst verdict seen so far.
    pub authenticity: Authenticity,
    pub public_key_has_changed: bool,
    /// Every NAL unit added to the session.
    pub number_of_received_nalus: u64,
    /// Units drained with a final (non-pending) verdict.
    pub number_of_validated_nalus: u64,
    /// Units still pending as of the latest report.
    pub number_of_pending_nalus: u64,
    pub number_of_unknown_nalus: u64,
    pub number_of_invalid_nalus: u64,
    /// Sum of `expected - received` over all reports that carried a
    /// declaration; may be negative.
    pub number_of_missing_nalus: i64,
}

impl Default for AccumulatedValidation {
    fn default() -> Self {
        AccumulatedValidation {
            authenticity: Authenticity::NotSigned,
            public_key_has_changed: false,
            number_of_received_nalus: 0,
            number_of_validated_nalus: 0,
            number_of_pending_nalus: 0,
            number_of_unknown_nalus: 0,
            number_of_invalid_nalus: 0,
            number_of_missing_nalus: 0,
        }
    }
}

impl AccumulatedValidation {
    pub(crate) fn absorb(&mut self, latest: &LatestValidation) {
        self.authenticity = self.authenticity.worst(latest.authenticity);
        self.public_key_has_changed |= latest.public_key_has_changed;
        self.number_of_pending_nalus = latest.number_of_pending_picture_nalus as u64;
        if latest.number_of_expected_picture_nalus >= 0 {
            self.number_of_missing_nalus += i64::from(
                latest.number_of_expected_picture_nalus - latest.number_of_received_picture_nalus,
            );
        }
    }
}

/// The full report handed to the caller. Ownership transfers; the session
/// keeps only its accumulated counters.
#[derive(Clone, Debug)]
pub struct AuthenticityReport {
    pub latest_validation: LatestValidation,
    pub accumulated_validation: AccumulatedValidation,
    /// From the most recently decoded `PRODUCT_INFO` record.
    pub product_info: ProductInfo,
    /// Library version of the signing side, from the `GENERAL` record.
    pub version_on_signing_side: String,
    /// This library's version.
    pub this_version: String,
}
