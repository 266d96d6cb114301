// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authenticity validation for signed H.264/H.265 video.
//!
//! Cameras that support signed video embed cryptographic SEI NAL units in
//! the stream, one per Group of Pictures: a digest over the GOP's NAL
//! units, optionally a per-frame hash list, and a signature, all inside a
//! user-data-unregistered SEI with a fixed UUID. This crate validates such
//! streams: feed NAL units in arrival order to a [`Session`] via
//! [`Session::add_nalu_and_authenticate`] and collect an
//! [`AuthenticityReport`] each time a GOP settles.
//!
//! The cryptography itself is abstracted: the caller supplies a
//! [`Verifier`] (and, on the signing side, a [`Signer`]); the library
//! handles NAL parsing, the TLV wire format, hash chaining, and verdict
//! bookkeeping, but never interprets key material.
//!
//! Verdicts use a single-character alphabet per NAL unit, stable across
//! versions: `P` pending, `U` unknown, `_` ignored, `.` authentic,
//! `N` not authentic, `M` missing, `E` error.

#![forbid(clippy::print_stderr, clippy::print_stdout)]

mod authenticity;
mod crypto;
mod error;
mod gop;
mod hex;
mod session;
mod sign;
mod validation;
pub mod vendor;

// Internal modules, `pub` for the benefit of fuzz testing.
#[doc(hidden)]
pub mod nal;
#[doc(hidden)]
pub mod tlv;

#[cfg(test)]
mod testutil;

pub use authenticity::{
    AccumulatedValidation, Authenticity, AuthenticityReport, LatestValidation, ProductInfo,
    ValidationStatus,
};
pub use crypto::{Digest, HashEngine, Signer, Verifier, HASH_DIGEST_SIZE};
pub use error::Error;
pub use gop::MAX_HASH_LIST;
pub use session::Session;
pub use sign::SigningSession;
pub use tlv::CryptoInfo;
pub use validation::MAX_PENDING_GOPS;

/// The codec a session parses NAL units as.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
}

/// Granularity of the authenticity verdict.
///
/// At GOP level each SEI carries only the digest over the whole GOP; a
/// single bad unit condemns the GOP. At FRAME level the SEI also carries
/// per-frame digests, letting the validator pinpoint modified units and
/// report losses as such. An over-long GOP silently falls back from FRAME
/// to GOP for that GOP (see [`MAX_HASH_LIST`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AuthenticityLevel {
    Gop,
    Frame,
}
