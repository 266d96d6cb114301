// SPDX-License-Identifier: MIT OR Apache-2.0

//! H.265 NAL header classification.
//!
//! `nal_unit_header` as in T.REC H.265 section 7.3.1.2:
//!
//! ```text
//! 0                   1
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |F|tttttt|llllll|TTT|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! F: forbidden_zero_bit, must be 0.
//! t: unit_type, in [0, 63].
//! l: nuh_layer_id, in [0, 63].
//! T: nuh_temporal_id_plus1, in [1, 7].
//! ```

use super::NaluKind;

/// Maps the two H.265 header bytes onto a [`NaluKind`]. `None` when the
/// forbidden bit is set or `nuh_temporal_id_plus1` is zero.
pub(super) fn classify(header: [u8; 2]) -> Option<NaluKind> {
    if header[0] & 0b1000_0000 != 0 {
        return None;
    }
    if header[1] & 0b0000_0111 == 0 {
        return None;
    }
    let unit_type = (header[0] >> 1) & 0x3F;
    Some(match unit_type {
        // Non-IRAP VCL: TRAIL/TSA/STSA/RADL/RASL.
        0..=15 => NaluKind::P,
        // IRAP: BLA/IDR/CRA plus the reserved IRAP range.
        16..=23 => NaluKind::I,
        24..=31 => NaluKind::Other,
        32..=34 => NaluKind::Ps,
        39 | 40 => NaluKind::Sei,
        35..=47 => NaluKind::Other,
        _ => NaluKind::Undefined,
    })
}
