// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// Session-level failure of a `vigil` operation.
///
/// Per-NALU parse problems are *not* errors: an unparseable unit is recorded
/// in the pending list with status `E` (or `U`) and the add call still
/// succeeds. Cryptographic verification failure is a verdict, never an
/// error. These variants cover the remaining session-wide conditions.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller provided an invalid argument (empty input, zero size,
    /// mutually exclusive options).
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The operation is not supported in the session's current state,
    /// e.g. setting a field that has already been set.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// Allocation failure. Partial allocations have been unwound.
    #[error("out of memory")]
    Memory,

    /// A SEI or TLV record declares a format version newer than this
    /// implementation understands.
    #[error("incompatible version {0}")]
    IncompatibleVersion(u8),

    /// A TLV record overruns its container or leaves trailing bytes.
    #[error("decoding error: {0}")]
    DecodingError(&'static str),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Unknown(&'static str),
}
