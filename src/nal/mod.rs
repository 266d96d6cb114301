// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte-exact NAL unit parsing for H.264 and H.265 streams.
//!
//! This is an internal module, `pub` only for the benefit of fuzz testing.
//!
//! The parser accepts one complete NAL unit per call, in either Annex-B form
//! (3- or 4-byte start code) or NAL-stream form (4-byte big-endian length
//! prefix), classifies it, and produces the canonicalised view the rest of
//! the library works from. It never mutates or retains caller memory: all
//! retained bytes are copied.

use bytes::Bytes;

use crate::crypto::{nalu_hash, Digest};
use crate::Codec;

mod h264;
mod h265;

/// Length of the UUID field of a user-data-unregistered SEI.
pub const UUID_LEN: usize = 16;

/// UUID identifying a signed-video SEI: ASCII `"Signed Video...0"`.
pub const UUID_SIGNED_VIDEO: [u8; UUID_LEN] = [
    0x53, 0x69, 0x67, 0x6e, 0x65, 0x64, 0x20, 0x56, 0x69, 0x64, 0x65, 0x6f, 0x2e, 0x2e, 0x2e, 0x30,
];

/// Frame type of a NAL unit, as the validation engine cares about it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NaluKind {
    /// Type is outside the range this library classifies.
    Undefined,
    /// Supplemental enhancement information.
    Sei,
    /// Intra-coded slice (IDR for H.264, any IRAP for H.265).
    I,
    /// Predicted slice.
    P,
    /// Parameter set: SPS, PPS, or VPS.
    Ps,
    /// Recognised but uninteresting (AUD, filler, end-of-sequence, ...).
    Other,
}

/// UUID classification of a SEI NAL unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UuidKind {
    Undefined,
    SignedVideo,
}

/// Whether a NAL unit could be parsed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// Recognisably malformed (bad start code, forbidden bit, empty payload).
    Invalid,
    /// Too short to even attempt parsing.
    Error,
}

/// Parsed view of one NAL unit.
#[derive(Clone)]
pub struct NaluInfo {
    /// The complete NAL unit as received, including start code or length
    /// prefix. Owned copy.
    pub data: Bytes,

    /// Header + RBSP with emulation-prevention bytes removed and the
    /// byte-aligned stop bit excluded. Empty when nothing is hashable.
    pub hashable_data: Bytes,

    pub kind: NaluKind,
    pub uuid_kind: UuidKind,
    pub validity: Validity,

    /// Whether this unit participates in hashing at all. True for I, P, PS,
    /// OTHER and for SEIs with a foreign UUID; false for malformed units and
    /// for signed-video SEIs (those are inputs to, not outputs of, the GOP
    /// hash).
    pub is_hashable: bool,

    /// First slice of its picture (`first_mb_in_slice == 0` for H.264,
    /// `first_slice_segment_in_pic_flag` for H.265).
    pub is_primary_slice: bool,

    /// First primary slice of an I picture: the unit that opens a GOP.
    pub is_first_nalu_in_gop: bool,

    /// A signed-video SEI (user-data-unregistered with the signed-video
    /// UUID).
    pub is_gop_sei: bool,

    /// Emulation-stripped TLV payload of a signed-video SEI.
    pub tlv: Option<Bytes>,

    /// First payload byte after the UUID of a signed-video SEI.
    pub reserved_byte: u8,

    /// The start code as read, or the unit size when length-prefixed.
    pub start_code: u32,

    /// Number of emulation-prevention bytes removed from the payload.
    pub emulation_prevention_bytes: usize,
}

impl std::fmt::Debug for NaluInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NaluInfo")
            .field("kind", &self.kind)
            .field("validity", &self.validity)
            .field("is_hashable", &self.is_hashable)
            .field("is_first_nalu_in_gop", &self.is_first_nalu_in_gop)
            .field("is_gop_sei", &self.is_gop_sei)
            .field("data", &crate::hex::HexPreview::new(&self.data, 32))
            .finish()
    }
}

impl NaluInfo {
    /// Digest of the hashable bytes. Meaningless (all zero input) for
    /// non-hashable units; callers gate on `is_hashable`/kind.
    pub fn hash(&self) -> Digest {
        nalu_hash(&self.hashable_data)
    }

    /// A unit whose digest belongs in the GOP hash: a valid picture-side
    /// unit. Foreign SEIs are hashable but, like the original
    /// implementation, excluded from GOP reconciliation.
    pub fn is_picture(&self) -> bool {
        self.validity == Validity::Valid
            && matches!(
                self.kind,
                NaluKind::I | NaluKind::P | NaluKind::Ps | NaluKind::Other
            )
    }

    fn invalid(data: &[u8]) -> Self {
        NaluInfo {
            data: Bytes::copy_from_slice(data),
            hashable_data: Bytes::new(),
            kind: NaluKind::Undefined,
            uuid_kind: UuidKind::Undefined,
            validity: Validity::Invalid,
            is_hashable: false,
            is_primary_slice: false,
            is_first_nalu_in_gop: false,
            is_gop_sei: false,
            tlv: None,
            reserved_byte: 0,
            start_code: 0,
            emulation_prevention_bytes: 0,
        }
    }

    fn error(data: &[u8]) -> Self {
        NaluInfo {
            validity: Validity::Error,
            ..NaluInfo::invalid(data)
        }
    }
}

/// Locates the NAL unit boundary: Annex-B start code or 4-byte length
/// prefix. Returns `(payload offset, start code value)`.
fn find_boundary(data: &[u8]) -> Option<(usize, u32)> {
    if data.len() >= 4 && data[..4] == [0, 0, 0, 1] {
        return Some((4, 0x0000_0001));
    }
    if data.len() >= 3 && data[..3] == [0, 0, 1] {
        return Some((3, 0x0000_01));
    }
    if data.len() >= 4 {
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if len as usize == data.len() - 4 {
            return Some((4, len));
        }
    }
    None
}

/// Removes emulation-prevention bytes (`00 00 03` -> `00 00`) from `rbsp`.
/// Returns the stripped bytes and the number of bytes removed.
pub fn strip_emulation_prevention(rbsp: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(rbsp.len());
    let mut zeros = 0usize;
    let mut removed = 0usize;
    for &b in rbsp {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            removed += 1;
            continue;
        }
        if b == 0x00 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(b);
    }
    (out, removed)
}

/// Drops trailing `cabac_zero_word`-style zeros and one byte-aligned stop
/// bit so the digest covers only RBSP content.
fn trim_rbsp_trailing(bytes: &mut Vec<u8>) {
    while bytes.last() == Some(&0x00) {
        bytes.pop();
    }
    if bytes.last() == Some(&0x80) {
        bytes.pop();
    }
}

/// Parses one NAL unit. Never fails: unparseable input yields
/// `validity == Error` and recognisably malformed input `Invalid`; callers
/// carry both forward as list items rather than surfacing an error.
pub fn parse_nalu_info(data: &[u8], codec: Codec) -> NaluInfo {
    let min_len = match codec {
        Codec::H264 => 3 + 1,
        Codec::H265 => 3 + 2,
    };
    if data.len() <= min_len {
        return NaluInfo::error(data);
    }
    let Some((off, start_code)) = find_boundary(data) else {
        return NaluInfo::invalid(data);
    };

    let (kind, header_len) = match codec {
        Codec::H264 => match h264::classify(data[off]) {
            Some(kind) => (kind, 1),
            None => return NaluInfo::invalid(data),
        },
        Codec::H265 => {
            if data.len() < off + 2 {
                return NaluInfo::error(data);
            }
            match h265::classify([data[off], data[off + 1]]) {
                Some(kind) => (kind, 2),
                None => return NaluInfo::invalid(data),
            }
        }
    };

    let header = &data[off..off + header_len];
    let payload = &data[off + header_len..];
    if payload.is_empty() && matches!(kind, NaluKind::I | NaluKind::P | NaluKind::Sei) {
        return NaluInfo::invalid(data);
    }

    let (stripped, emulation_prevention_bytes) = strip_emulation_prevention(payload);

    let is_primary_slice = matches!(kind, NaluKind::I | NaluKind::P)
        && payload.first().is_some_and(|b| b & 0x80 != 0);
    let is_first_nalu_in_gop = kind == NaluKind::I && is_primary_slice;

    let mut uuid_kind = UuidKind::Undefined;
    let mut is_gop_sei = false;
    let mut tlv = None;
    let mut reserved_byte = 0;
    if kind == NaluKind::Sei {
        match parse_user_data_unregistered(&stripped) {
            Some(sei) if sei.uuid == UUID_SIGNED_VIDEO => {
                uuid_kind = UuidKind::SignedVideo;
                is_gop_sei = true;
                reserved_byte = sei.reserved;
                tlv = Some(Bytes::copy_from_slice(sei.tlv));
            }
            Some(_) | None => {}
        }
    }

    let is_hashable = match kind {
        NaluKind::I | NaluKind::P | NaluKind::Ps | NaluKind::Other => true,
        NaluKind::Sei => !is_gop_sei,
        NaluKind::Undefined => false,
    };

    let hashable_data = if is_hashable {
        let mut bytes = Vec::with_capacity(header_len + stripped.len());
        bytes.extend_from_slice(header);
        bytes.extend_from_slice(&stripped);
        trim_rbsp_trailing(&mut bytes);
        Bytes::from(bytes)
    } else {
        Bytes::new()
    };

    NaluInfo {
        data: Bytes::copy_from_slice(data),
        hashable_data,
        kind,
        uuid_kind,
        validity: Validity::Valid,
        is_hashable,
        is_primary_slice,
        is_first_nalu_in_gop,
        is_gop_sei,
        tlv,
        reserved_byte,
        start_code,
        emulation_prevention_bytes,
    }
}

struct UserDataSei<'a> {
    uuid: [u8; UUID_LEN],
    reserved: u8,
    tlv: &'a [u8],
}

/// Parses the first SEI message of an (emulation-stripped) SEI RBSP,
/// returning its UUID and payload if it is of type `user_data_unregistered`
/// and long enough to carry a UUID plus the reserved byte.
fn parse_user_data_unregistered(rbsp: &[u8]) -> Option<UserDataSei<'_>> {
    let mut i = 0;
    let mut payload_type = 0usize;
    while *rbsp.get(i)? == 0xFF {
        payload_type += 255;
        i += 1;
    }
    payload_type += usize::from(*rbsp.get(i)?);
    i += 1;
    let mut payload_size = 0usize;
    while *rbsp.get(i)? == 0xFF {
        payload_size += 255;
        i += 1;
    }
    payload_size += usize::from(*rbsp.get(i)?);
    i += 1;

    // user_data_unregistered, with room for uuid + reserved.
    if payload_type != 5 || payload_size < UUID_LEN + 1 {
        return None;
    }
    let payload = rbsp.get(i..i + payload_size)?;
    let mut uuid = [0u8; UUID_LEN];
    uuid.copy_from_slice(&payload[..UUID_LEN]);
    Some(UserDataSei {
        uuid,
        reserved: payload[UUID_LEN],
        tlv: &payload[UUID_LEN + 1..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SC: [u8; 4] = [0, 0, 0, 1];

    fn h264_nalu(header: u8, payload: &[u8]) -> Vec<u8> {
        let mut v = SC.to_vec();
        v.push(header);
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn classifies_h264_idr() {
        let info = parse_nalu_info(&h264_nalu(0x65, &[0x88, 0x80]), Codec::H264);
        assert_eq!(info.kind, NaluKind::I);
        assert_eq!(info.validity, Validity::Valid);
        assert!(info.is_primary_slice);
        assert!(info.is_first_nalu_in_gop);
        assert!(info.is_hashable);
    }

    #[test]
    fn classifies_h264_non_primary_idr_slice() {
        // first_mb_in_slice > 0: leading Exp-Golomb bit is zero.
        let info = parse_nalu_info(&h264_nalu(0x65, &[0x40, 0x80]), Codec::H264);
        assert_eq!(info.kind, NaluKind::I);
        assert!(!info.is_primary_slice);
        assert!(!info.is_first_nalu_in_gop);
    }

    #[test]
    fn classifies_h264_p_and_ps() {
        let p = parse_nalu_info(&h264_nalu(0x41, &[0x9a, 0x80]), Codec::H264);
        assert_eq!(p.kind, NaluKind::P);
        assert!(!p.is_first_nalu_in_gop);
        let sps = parse_nalu_info(&h264_nalu(0x67, &[0x42, 0x80]), Codec::H264);
        assert_eq!(sps.kind, NaluKind::Ps);
        assert!(sps.is_hashable);
    }

    #[test]
    fn forbidden_bit_is_invalid() {
        let info = parse_nalu_info(&h264_nalu(0xFF, &[0x00]), Codec::H264);
        assert_eq!(info.validity, Validity::Invalid);
        assert!(!info.is_hashable);
    }

    #[test]
    fn too_short_is_error() {
        let info = parse_nalu_info(&[0, 0, 1], Codec::H264);
        assert_eq!(info.validity, Validity::Error);
    }

    #[test]
    fn length_prefixed_input() {
        let mut v = 3u32.to_be_bytes().to_vec();
        v.extend_from_slice(&[0x41, 0x9a, 0x80]);
        let info = parse_nalu_info(&v, Codec::H264);
        assert_eq!(info.validity, Validity::Valid);
        assert_eq!(info.kind, NaluKind::P);
        assert_eq!(info.start_code, 3);
    }

    #[test]
    fn classifies_h265_types() {
        // IDR_W_RADL (type 19), primary slice segment.
        let mut v = SC.to_vec();
        v.extend_from_slice(&[19 << 1, 0x01, 0x88, 0x80]);
        let info = parse_nalu_info(&v, Codec::H265);
        assert_eq!(info.kind, NaluKind::I);
        assert!(info.is_first_nalu_in_gop);

        // TRAIL_R (type 1).
        let mut v = SC.to_vec();
        v.extend_from_slice(&[1 << 1, 0x01, 0x9a, 0x80]);
        assert_eq!(parse_nalu_info(&v, Codec::H265).kind, NaluKind::P);

        // VPS (type 32).
        let mut v = SC.to_vec();
        v.extend_from_slice(&[32 << 1, 0x01, 0x42, 0x80]);
        assert_eq!(parse_nalu_info(&v, Codec::H265).kind, NaluKind::Ps);
    }

    #[test]
    fn emulation_strip() {
        let (out, n) = strip_emulation_prevention(&[0x00, 0x00, 0x03, 0x00, 0x01]);
        assert_eq!(out, vec![0x00, 0x00, 0x00, 0x01]);
        assert_eq!(n, 1);
        // 0x03 not preceded by two zeros stays.
        let (out, n) = strip_emulation_prevention(&[0x00, 0x03, 0x00]);
        assert_eq!(out, vec![0x00, 0x03, 0x00]);
        assert_eq!(n, 0);
        // Consecutive escapes.
        let (out, n) = strip_emulation_prevention(&[0, 0, 3, 0, 0, 3, 1]);
        assert_eq!(out, vec![0, 0, 0, 0, 1]);
        assert_eq!(n, 2);
    }

    #[test]
    fn hashable_excludes_stop_byte() {
        let with_stop = parse_nalu_info(&h264_nalu(0x41, &[0x9a, 0x42, 0x80]), Codec::H264);
        let bare = parse_nalu_info(&h264_nalu(0x41, &[0x9a, 0x42]), Codec::H264);
        assert_eq!(with_stop.hashable_data, bare.hashable_data);
    }

    #[test]
    fn foreign_sei_is_hashable_but_not_gop_sei() {
        // user_data_unregistered with an unknown uuid.
        let mut payload = vec![0x05, 17];
        payload.extend_from_slice(&[0xAB; UUID_LEN]);
        payload.push(0x00);
        payload.push(0x80);
        let info = parse_nalu_info(&h264_nalu(0x06, &payload), Codec::H264);
        assert_eq!(info.kind, NaluKind::Sei);
        assert!(info.is_hashable);
        assert!(!info.is_gop_sei);
        assert_eq!(info.uuid_kind, UuidKind::Undefined);
    }

    #[test]
    fn signed_video_sei_is_not_hashable() {
        let mut payload = vec![0x05, (UUID_LEN + 2) as u8];
        payload.extend_from_slice(&UUID_SIGNED_VIDEO);
        payload.push(0x80); // reserved
        payload.push(0xAA); // one tlv byte (not decoded here)
        payload.push(0x80); // stop bit
        let info = parse_nalu_info(&h264_nalu(0x06, &payload), Codec::H264);
        assert!(info.is_gop_sei);
        assert!(!info.is_hashable);
        assert_eq!(info.uuid_kind, UuidKind::SignedVideo);
        assert_eq!(info.reserved_byte, 0x80);
        assert_eq!(info.tlv.as_deref(), Some(&[0xAA][..]));
    }
}
