// SPDX-License-Identifier: MIT OR Apache-2.0

//! H.264 NAL header classification, via `h264-reader`.

use h264_reader::nal::{NalHeader, UnitType};

use super::NaluKind;

/// Maps the single H.264 header byte onto a [`NaluKind`]. `None` when the
/// forbidden bit is set.
pub(super) fn classify(header: u8) -> Option<NaluKind> {
    let hdr = NalHeader::new(header).ok()?;
    Some(match hdr.nal_unit_type() {
        UnitType::SliceLayerWithoutPartitioningIdr => NaluKind::I,
        UnitType::SliceLayerWithoutPartitioningNonIdr
        | UnitType::SliceDataPartitionALayer
        | UnitType::SliceDataPartitionBLayer
        | UnitType::SliceDataPartitionCLayer => NaluKind::P,
        UnitType::SeqParameterSet | UnitType::PicParameterSet => NaluKind::Ps,
        UnitType::SEI => NaluKind::Sei,
        UnitType::Unspecified(_) => NaluKind::Undefined,
        _ => NaluKind::Other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_types() {
        assert_eq!(classify(0x65), Some(NaluKind::I)); // IDR, nal_ref_idc 3
        assert_eq!(classify(0x41), Some(NaluKind::P)); // non-IDR, nal_ref_idc 2
        assert_eq!(classify(0x01), Some(NaluKind::P)); // non-IDR, disposable
        assert_eq!(classify(0x67), Some(NaluKind::Ps)); // SPS
        assert_eq!(classify(0x68), Some(NaluKind::Ps)); // PPS
        assert_eq!(classify(0x06), Some(NaluKind::Sei));
        assert_eq!(classify(0x09), Some(NaluKind::Other)); // AUD
        assert_eq!(classify(0x00), Some(NaluKind::Undefined));
        assert_eq!(classify(0x80), None); // forbidden bit
    }
}
