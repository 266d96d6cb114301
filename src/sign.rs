// SPDX-License-Identifier: MIT OR Apache-2.0

//! The signing side: turns a stream of NAL units into signed-video SEIs to
//! prepend at each GOP boundary.
//!
//! Key generation and algorithm selection stay outside the library; the
//! caller supplies a [`Signer`]. The SEI for a closing GOP is generated
//! when the first NAL unit of the next GOP arrives, and the caller inserts
//! it into the stream *before* that unit.

use std::collections::VecDeque;

use bytes::Bytes;
use log::{debug, trace};

use crate::authenticity::ProductInfo;
use crate::crypto::Signer;
use crate::error::Error;
use crate::gop::{GopState, MAX_HASH_LIST};
use crate::nal::{parse_nalu_info, Validity, UUID_SIGNED_VIDEO};
use crate::tlv::{CryptoInfo, EmulationWriter, SeiBuilder};
use crate::vendor::axis::AxisAttestation;
use crate::{AuthenticityLevel, Codec};

/// Value of the reserved byte between the UUID and the TLV records.
const RESERVED_BYTE: u8 = 0x80;

/// A signing session. One per stream; not thread-safe.
pub struct SigningSession {
    codec: Codec,
    signer: Box<dyn Signer>,
    level: AuthenticityLevel,
    gop_state: GopState,
    gop_counter: u32,
    recurrence: u32,
    recurrence_offset: u32,
    product_info: Option<ProductInfo>,
    crypto_info: Option<CryptoInfo>,
    arbitrary_data: Option<Vec<u8>>,
    axis_attestation: Option<AxisAttestation>,
    seis_to_prepend: VecDeque<Bytes>,
}

impl SigningSession {
    pub fn new(codec: Codec, signer: Box<dyn Signer>) -> Self {
        SigningSession {
            codec,
            signer,
            level: AuthenticityLevel::Frame,
            gop_state: GopState::new(MAX_HASH_LIST),
            gop_counter: 0,
            recurrence: 1,
            recurrence_offset: 0,
            product_info: None,
            crypto_info: None,
            arbitrary_data: None,
            axis_attestation: None,
            seis_to_prepend: VecDeque::new(),
        }
    }

    /// GOP level carries only the GOP hash; FRAME level adds per-frame
    /// hashes so the validator can pinpoint modified and missing units.
    pub fn set_authenticity_level(&mut self, level: AuthenticityLevel) {
        self.level = level;
    }

    /// Heavy recurrent records (public key, product info, vendor blobs)
    /// are transmitted every `r`-th GOP.
    pub fn set_recurrence_interval(&mut self, r: u32) -> Result<(), Error> {
        if r == 0 {
            return Err(Error::InvalidParameter("recurrence interval must be >= 1"));
        }
        self.recurrence = r;
        Ok(())
    }

    /// Phase offset of the recurrence: recurrent records go out when
    /// `(gop_counter + offset) % r == 0`.
    pub fn set_recurrence_offset(&mut self, offset: u32) {
        self.recurrence_offset = offset;
    }

    pub fn set_product_info(&mut self, info: ProductInfo) {
        self.product_info = Some(info);
    }

    pub fn set_crypto_info(&mut self, info: CryptoInfo) {
        self.crypto_info = Some(info);
    }

    pub fn add_arbitrary_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Err(Error::InvalidParameter("empty arbitrary data"));
        }
        self.arbitrary_data = Some(data.to_vec());
        Ok(())
    }

    /// Attaches an Axis attestation report and/or certificate chain. May be
    /// set once; both pieces are stored or neither.
    pub fn set_axis_attestation_report(
        &mut self,
        attestation: Option<&[u8]>,
        certificate_chain: Option<&str>,
    ) -> Result<(), Error> {
        if self.axis_attestation.is_some() {
            return Err(Error::NotSupported("attestation report already set"));
        }
        self.axis_attestation = Some(AxisAttestation::new(attestation, certificate_chain)?);
        Ok(())
    }

    /// Feeds one NAL unit. A GOP boundary queues the closing GOP's SEI for
    /// [`SigningSession::take_sei_to_prepend`]. Unparseable units are
    /// skipped silently, mirroring the validating side.
    pub fn add_nalu_for_signing(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Err(Error::InvalidParameter("empty nalu"));
        }
        let info = parse_nalu_info(data, self.codec);
        if info.validity != Validity::Valid {
            trace!("skipping unparseable nalu on signing side");
            return Ok(());
        }
        if info.is_first_nalu_in_gop {
            // Chained hash: the unit closing this GOP opens the next one.
            let closer_hash = info.hash();
            self.gop_state.add_picture_hash(closer_hash);
            let sei = self.generate_sei();
            debug!(
                "gop {} closed with {} unit(s); sei of {} bytes queued",
                self.gop_counter,
                self.gop_state.num_nalus_in_gop,
                sei.len()
            );
            self.seis_to_prepend.push_back(sei);
            self.gop_counter += 1;
            self.gop_state.reset();
            self.gop_state.add_picture_hash(closer_hash);
        } else if info.is_picture() {
            self.gop_state.add_picture_hash(info.hash());
        }
        Ok(())
    }

    /// The next SEI to insert into the stream, if any. Each belongs
    /// immediately before the NAL unit whose arrival produced it.
    pub fn take_sei_to_prepend(&mut self) -> Option<Bytes> {
        self.seis_to_prepend.pop_front()
    }

    fn generate_sei(&self) -> Bytes {
        let recurrent = (self.gop_counter + self.recurrence_offset) % self.recurrence == 0;
        let hash_list = match self.level {
            AuthenticityLevel::Frame if !self.gop_state.frame_hashes_unavailable => {
                Some(&self.gop_state.hash_list[..])
            }
            _ => None,
        };
        let tlv = SeiBuilder {
            gop_counter: self.gop_counter,
            num_nalus_in_gop: self.gop_state.num_nalus_in_gop,
            gop_hash: self.gop_state.finalize_gop_hash(),
            code_version: env!("CARGO_PKG_VERSION"),
            hash_list,
            public_key: recurrent.then(|| self.signer.public_key()),
            product_info: if recurrent {
                self.product_info.as_ref()
            } else {
                None
            },
            crypto_info: if recurrent {
                self.crypto_info.as_ref()
            } else {
                None
            },
            arbitrary_data: if recurrent {
                self.arbitrary_data.as_deref()
            } else {
                None
            },
            axis_attestation: if recurrent {
                self.axis_attestation.as_ref()
            } else {
                None
            },
        }
        .encode(RESERVED_BYTE, &*self.signer);
        assemble_sei_nalu(self.codec, &tlv)
    }
}

/// Wraps a TLV payload into a complete user-data-unregistered SEI NAL unit
/// (Annex-B, 4-byte start code), applying emulation prevention.
fn assemble_sei_nalu(codec: Codec, tlv: &[u8]) -> Bytes {
    // RBSP: payload type, ff-coded payload size, uuid, reserved, records,
    // then the stop bit.
    let payload_size = UUID_SIGNED_VIDEO.len() + 1 + tlv.len();
    let mut rbsp = Vec::with_capacity(payload_size + 8);
    rbsp.push(0x05); // user_data_unregistered
    let mut size = payload_size;
    while size >= 255 {
        rbsp.push(0xFF);
        size -= 255;
    }
    rbsp.push(size as u8);
    rbsp.extend_from_slice(&UUID_SIGNED_VIDEO);
    rbsp.push(RESERVED_BYTE);
    rbsp.extend_from_slice(tlv);
    rbsp.push(0x80); // rbsp_trailing_bits

    let mut nalu = vec![0, 0, 0, 1];
    match codec {
        Codec::H264 => nalu.push(0x06),
        Codec::H265 => nalu.extend_from_slice(&[39 << 1, 0x01]),
    }
    let mut w = EmulationWriter::new(&mut nalu);
    w.write_all(&rbsp);
    Bytes::from(nalu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::HASH_DIGEST_SIZE;
    use crate::nal::{parse_nalu_info, NaluKind};
    use crate::testutil::{nalu, TestSigner};
    use crate::tlv;

    fn session(codec: Codec) -> SigningSession {
        SigningSession::new(codec, Box::new(TestSigner::new(b"sign-test-key")))
    }

    #[test]
    fn sei_emitted_at_gop_boundary_only() {
        let mut s = session(Codec::H264);
        s.add_nalu_for_signing(&nalu(Codec::H264, 'I', 0)).unwrap();
        assert!(s.take_sei_to_prepend().is_some());
        assert!(s.take_sei_to_prepend().is_none());
        s.add_nalu_for_signing(&nalu(Codec::H264, 'P', 1)).unwrap();
        s.add_nalu_for_signing(&nalu(Codec::H264, 'P', 2)).unwrap();
        assert!(s.take_sei_to_prepend().is_none());
        s.add_nalu_for_signing(&nalu(Codec::H264, 'I', 3)).unwrap();
        assert!(s.take_sei_to_prepend().is_some());
    }

    #[test]
    fn sei_parses_as_signed_video_sei() {
        for codec in [Codec::H264, Codec::H265] {
            let mut s = session(codec);
            s.add_nalu_for_signing(&nalu(codec, 'I', 0)).unwrap();
            let sei = s.take_sei_to_prepend().unwrap();
            let info = parse_nalu_info(&sei, codec);
            assert_eq!(info.kind, NaluKind::Sei);
            assert!(info.is_gop_sei);
            assert!(!info.is_hashable);
        }
    }

    #[test]
    fn declaration_covers_members_and_chained_closer() {
        let mut s = session(Codec::H264);
        let units: Vec<_> = "IPPI"
            .chars()
            .enumerate()
            .map(|(i, c)| nalu(Codec::H264, c, i as u8))
            .collect();
        for u in &units {
            s.add_nalu_for_signing(u).unwrap();
        }
        let _first = s.take_sei_to_prepend().unwrap();
        let second = s.take_sei_to_prepend().unwrap();
        let info = parse_nalu_info(&second, Codec::H264);
        let contents = tlv::decode(info.tlv.as_ref().unwrap(), info.reserved_byte).unwrap();
        assert_eq!(contents.gop_counter, 1);
        assert_eq!(contents.num_nalus_in_gop, 4); // I P P + chained I
        let hashes: Vec<_> = units
            .iter()
            .map(|u| parse_nalu_info(u, Codec::H264).hash())
            .collect();
        assert_eq!(contents.hash_list.as_deref(), Some(&hashes[..]));
        assert_eq!(
            contents.gop_hash,
            crate::crypto::gop_hash(hashes.iter())
        );
    }

    #[test]
    fn gop_level_omits_hash_list() {
        let mut s = session(Codec::H264);
        s.set_authenticity_level(AuthenticityLevel::Gop);
        s.add_nalu_for_signing(&nalu(Codec::H264, 'I', 0)).unwrap();
        let sei = s.take_sei_to_prepend().unwrap();
        let info = parse_nalu_info(&sei, Codec::H264);
        let contents = tlv::decode(info.tlv.as_ref().unwrap(), info.reserved_byte).unwrap();
        assert!(contents.hash_list.is_none());
    }

    #[test]
    fn recurrence_gates_heavy_records() {
        let mut s = session(Codec::H264);
        s.set_recurrence_interval(2).unwrap();
        s.set_product_info(ProductInfo {
            hardware_id: "hw".into(),
            ..Default::default()
        });
        let mut keys = Vec::new();
        for i in 0..6u8 {
            s.add_nalu_for_signing(&nalu(Codec::H264, 'I', i)).unwrap();
            let sei = s.take_sei_to_prepend().unwrap();
            let info = parse_nalu_info(&sei, Codec::H264);
            let contents = tlv::decode(info.tlv.as_ref().unwrap(), info.reserved_byte).unwrap();
            keys.push(contents.public_key.is_some());
            assert_eq!(contents.public_key.is_some(), contents.product_info.is_some());
        }
        assert_eq!(keys, vec![true, false, true, false, true, false]);

        // A phase offset shifts the anchors.
        let mut s = session(Codec::H264);
        s.set_recurrence_interval(2).unwrap();
        s.set_recurrence_offset(1);
        s.add_nalu_for_signing(&nalu(Codec::H264, 'I', 0)).unwrap();
        let sei = s.take_sei_to_prepend().unwrap();
        let info = parse_nalu_info(&sei, Codec::H264);
        let contents = tlv::decode(info.tlv.as_ref().unwrap(), info.reserved_byte).unwrap();
        assert!(contents.public_key.is_none());
    }

    #[test]
    fn sei_roundtrips_byte_exactly() {
        // Counter bytes full of zeros force emulation-prevention on the
        // wire; the decode/encode cycle must still be byte-exact.
        let signer = TestSigner::new(b"roundtrip-key");
        let mut s = SigningSession::new(Codec::H264, Box::new(signer));
        s.set_product_info(ProductInfo {
            hardware_id: "B8A44F".into(),
            firmware_version: "11.4".into(),
            serial_number: "0042".into(),
            manufacturer: "Axis".into(),
            address: "Lund".into(),
        });
        s.add_nalu_for_signing(&nalu(Codec::H264, 'I', 0)).unwrap();
        let sei = s.take_sei_to_prepend().unwrap();

        let info = parse_nalu_info(&sei, Codec::H264);
        assert!(info.emulation_prevention_bytes > 0);
        let contents = tlv::decode(info.tlv.as_ref().unwrap(), info.reserved_byte).unwrap();

        // Re-encode from the decoded contents with the same signer.
        let reencoded_tlv = SeiBuilder {
            gop_counter: contents.gop_counter,
            num_nalus_in_gop: contents.num_nalus_in_gop,
            gop_hash: contents.gop_hash,
            code_version: &contents.code_version,
            hash_list: contents.hash_list.as_deref(),
            public_key: contents.public_key.as_deref(),
            product_info: contents.product_info.as_ref(),
            crypto_info: contents.crypto_info.as_ref(),
            arbitrary_data: contents.arbitrary_data.as_deref(),
            axis_attestation: contents.axis_attestation.as_ref(),
        }
        .encode(info.reserved_byte, &TestSigner::new(b"roundtrip-key"));
        assert_eq!(
            assemble_sei_nalu(Codec::H264, &reencoded_tlv),
            sei
        );
    }

    #[test]
    fn long_gop_falls_back_to_gop_level() {
        let mut s = session(Codec::H264);
        s.add_nalu_for_signing(&nalu(Codec::H264, 'I', 0)).unwrap();
        let _ = s.take_sei_to_prepend();
        for i in 0..=MAX_HASH_LIST as u8 {
            s.add_nalu_for_signing(&nalu(Codec::H264, 'P', i)).unwrap();
        }
        s.add_nalu_for_signing(&nalu(Codec::H264, 'I', 255)).unwrap();
        let sei = s.take_sei_to_prepend().unwrap();
        let info = parse_nalu_info(&sei, Codec::H264);
        let contents = tlv::decode(info.tlv.as_ref().unwrap(), info.reserved_byte).unwrap();
        assert!(contents.hash_list.is_none());
        assert_eq!(
            usize::from(contents.num_nalus_in_gop),
            MAX_HASH_LIST + 3
        );
        assert_ne!(contents.gop_hash, [0; HASH_DIGEST_SIZE]);
    }

    #[test]
    fn attestation_set_once() {
        let mut s = session(Codec::H264);
        s.set_axis_attestation_report(Some(&[1, 2]), Some("chain"))
            .unwrap();
        assert!(matches!(
            s.set_axis_attestation_report(Some(&[1]), None),
            Err(Error::NotSupported(_))
        ));
    }
}
