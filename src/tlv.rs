// SPDX-License-Identifier: MIT OR Apache-2.0

//! The SEI payload: a sequence of `tag(1) || length(2, BE) || value` records.
//!
//! Records come in two classes. *Per-SEI* records (`GENERAL`, `HASH_LIST`,
//! `SIGNATURE`) appear in every signed-video SEI; *recurrent* records
//! (product info, public key, crypto info, arbitrary data, vendor blobs)
//! are only emitted every R-th GOP. `SIGNATURE` is always the final record
//! and signs the digest of everything before it, so the validator can
//! recompute the signed digest from the raw record bytes without
//! re-serialising.
//!
//! Lengths are written before emulation prevention is applied; the
//! emulation pass ([`EmulationWriter`]) runs over the fully assembled
//! payload when the SEI NAL unit is put on the wire.

use crate::authenticity::ProductInfo;
use crate::crypto::{Digest, HashEngine, Signer, HASH_DIGEST_SIZE};
use crate::error::Error;
use crate::nal::UUID_SIGNED_VIDEO;
use crate::vendor::axis::AxisAttestation;

/// Format version of the `GENERAL` record.
const GENERAL_VERSION: u8 = 1;
/// Format version of the `CRYPTO_INFO` record.
const CRYPTO_INFO_VERSION: u8 = 1;

/// TLV record tags. Unknown tags are length-skipped without error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    General = 0x01,
    ProductInfo = 0x02,
    ArbitraryData = 0x03,
    PublicKey = 0x04,
    HashList = 0x05,
    Signature = 0x06,
    CryptoInfo = 0x07,
    VendorAxisCommunications = 0x08,
}

impl Tag {
    pub fn from_u8(b: u8) -> Option<Tag> {
        Some(match b {
            0x01 => Tag::General,
            0x02 => Tag::ProductInfo,
            0x03 => Tag::ArbitraryData,
            0x04 => Tag::PublicKey,
            0x05 => Tag::HashList,
            0x06 => Tag::Signature,
            0x07 => Tag::CryptoInfo,
            0x08 => Tag::VendorAxisCommunications,
            _ => return None,
        })
    }

    /// Whether the tag is only transmitted every R-th SEI.
    pub fn is_recurrent(self) -> bool {
        matches!(
            self,
            Tag::ProductInfo
                | Tag::ArbitraryData
                | Tag::PublicKey
                | Tag::CryptoInfo
                | Tag::VendorAxisCommunications
        )
    }
}

/// Signature algorithm identifier, opaque to the core; the `Verifier`
/// interprets it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CryptoInfo {
    pub algorithm: String,
}

/// Everything a signed-video SEI declares, decoded exactly once per SEI.
#[derive(Clone, Debug)]
pub struct SeiContents {
    pub format_version: u8,
    pub gop_counter: u32,
    /// Picture NAL units covered by `gop_hash`: the GOP's members plus the
    /// chained first unit of the following GOP.
    pub num_nalus_in_gop: u16,
    pub gop_hash: Digest,
    /// Library version on the signing side.
    pub code_version: String,
    /// Per-frame digests, present at FRAME authenticity level when the GOP
    /// fit the hash-list cap.
    pub hash_list: Option<Vec<Digest>>,
    pub signature: Vec<u8>,
    /// Digest the signature covers: `uuid || reserved || records before
    /// SIGNATURE`, computed over the emulation-stripped payload.
    pub signed_digest: Digest,
    pub public_key: Option<Vec<u8>>,
    pub product_info: Option<ProductInfo>,
    pub crypto_info: Option<CryptoInfo>,
    pub arbitrary_data: Option<Vec<u8>>,
    pub axis_attestation: Option<AxisAttestation>,
}

/// Decodes an emulation-stripped TLV payload. `reserved` is the byte
/// between the UUID and the first record; it participates in the signed
/// digest.
pub fn decode(tlv: &[u8], reserved: u8) -> Result<SeiContents, Error> {
    let mut general = None;
    let mut hash_list = None;
    let mut public_key = None;
    let mut product_info = None;
    let mut crypto_info = None;
    let mut arbitrary_data = None;
    let mut axis_attestation = None;

    let mut i = 0;
    while i < tlv.len() {
        if i + 3 > tlv.len() {
            return Err(Error::DecodingError("truncated record header"));
        }
        let tag = tlv[i];
        let len = usize::from(u16::from_be_bytes([tlv[i + 1], tlv[i + 2]]));
        let value = tlv
            .get(i + 3..i + 3 + len)
            .ok_or(Error::DecodingError("record length overrun"))?;
        match Tag::from_u8(tag) {
            Some(Tag::General) => general = Some(decode_general(value)?),
            Some(Tag::ProductInfo) => product_info = Some(decode_product_info(value)?),
            Some(Tag::ArbitraryData) => arbitrary_data = Some(value.to_vec()),
            Some(Tag::PublicKey) => {
                if value.is_empty() {
                    return Err(Error::DecodingError("empty public key"));
                }
                public_key = Some(value.to_vec());
            }
            Some(Tag::HashList) => hash_list = Some(decode_hash_list(value)?),
            Some(Tag::CryptoInfo) => crypto_info = Some(decode_crypto_info(value)?),
            Some(Tag::VendorAxisCommunications) => {
                axis_attestation = Some(AxisAttestation::decode_value(value)?)
            }
            Some(Tag::Signature) => {
                if i + 3 + len != tlv.len() {
                    return Err(Error::DecodingError("bytes after signature record"));
                }
                let (format_version, gop_counter, num_nalus_in_gop, gop_hash, code_version) =
                    general.ok_or(Error::DecodingError("signature before general record"))?;
                return Ok(SeiContents {
                    format_version,
                    gop_counter,
                    num_nalus_in_gop,
                    gop_hash,
                    code_version,
                    hash_list,
                    signature: value.to_vec(),
                    signed_digest: signed_digest(reserved, &tlv[..i]),
                    public_key,
                    product_info,
                    crypto_info,
                    arbitrary_data,
                    axis_attestation,
                });
            }
            None => {} // unknown tag: skip
        }
        i += 3 + len;
    }
    Err(Error::DecodingError("no signature record"))
}

/// The digest the SEI's signature covers.
fn signed_digest(reserved: u8, records_before_signature: &[u8]) -> Digest {
    let mut e = HashEngine::init();
    e.update(&UUID_SIGNED_VIDEO);
    e.update(&[reserved]);
    e.update(records_before_signature);
    e.finalize()
}

fn decode_general(value: &[u8]) -> Result<(u8, u32, u16, Digest, String), Error> {
    let version = *value
        .first()
        .ok_or(Error::DecodingError("empty general record"))?;
    if version == 0 || version > GENERAL_VERSION {
        return Err(Error::IncompatibleVersion(version));
    }
    let rest = &value[1..];
    if rest.len() < 4 + 2 + HASH_DIGEST_SIZE + 1 {
        return Err(Error::DecodingError("general record truncated"));
    }
    let gop_counter = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
    let num_nalus_in_gop = u16::from_be_bytes([rest[4], rest[5]]);
    let mut gop_hash = [0u8; HASH_DIGEST_SIZE];
    gop_hash.copy_from_slice(&rest[6..6 + HASH_DIGEST_SIZE]);
    let mut i = 6 + HASH_DIGEST_SIZE;
    let ver_len = usize::from(rest[i]);
    i += 1;
    let code_version = rest
        .get(i..i + ver_len)
        .ok_or(Error::DecodingError("code version overrun"))?;
    if i + ver_len != rest.len() {
        return Err(Error::DecodingError("trailing bytes in general record"));
    }
    let code_version = std::str::from_utf8(code_version)
        .map_err(|_| Error::DecodingError("code version is not UTF-8"))?
        .to_owned();
    Ok((version, gop_counter, num_nalus_in_gop, gop_hash, code_version))
}

fn decode_hash_list(value: &[u8]) -> Result<Vec<Digest>, Error> {
    if value.len() % HASH_DIGEST_SIZE != 0 {
        return Err(Error::DecodingError("ragged hash list"));
    }
    Ok(value
        .chunks_exact(HASH_DIGEST_SIZE)
        .map(|c| {
            let mut d = [0u8; HASH_DIGEST_SIZE];
            d.copy_from_slice(c);
            d
        })
        .collect())
}

fn decode_product_info(value: &[u8]) -> Result<ProductInfo, Error> {
    let mut fields: [String; 5] = Default::default();
    let mut i = 0;
    for f in &mut fields {
        let len = usize::from(
            *value
                .get(i)
                .ok_or(Error::DecodingError("product info truncated"))?,
        );
        i += 1;
        let s = value
            .get(i..i + len)
            .ok_or(Error::DecodingError("product info field overrun"))?;
        *f = std::str::from_utf8(s)
            .map_err(|_| Error::DecodingError("product info field is not UTF-8"))?
            .to_owned();
        i += len;
    }
    if i != value.len() {
        return Err(Error::DecodingError("trailing bytes in product info"));
    }
    let [hardware_id, firmware_version, serial_number, manufacturer, address] = fields;
    Ok(ProductInfo {
        hardware_id,
        firmware_version,
        serial_number,
        manufacturer,
        address,
    })
}

fn decode_crypto_info(value: &[u8]) -> Result<CryptoInfo, Error> {
    let version = *value
        .first()
        .ok_or(Error::DecodingError("empty crypto info"))?;
    if version == 0 || version > CRYPTO_INFO_VERSION {
        return Err(Error::IncompatibleVersion(version));
    }
    let len = usize::from(*value.get(1).ok_or(Error::DecodingError("crypto info truncated"))?);
    let algo = value
        .get(2..2 + len)
        .ok_or(Error::DecodingError("crypto info overrun"))?;
    if 2 + len != value.len() {
        return Err(Error::DecodingError("trailing bytes in crypto info"));
    }
    let algorithm = std::str::from_utf8(algo)
        .map_err(|_| Error::DecodingError("crypto algorithm id is not ASCII"))?
        .to_owned();
    Ok(CryptoInfo { algorithm })
}

/// Inputs for one SEI's TLV payload on the signing side. Recurrent fields
/// are `None` on non-anchor GOPs.
pub(crate) struct SeiBuilder<'a> {
    pub gop_counter: u32,
    pub num_nalus_in_gop: u16,
    pub gop_hash: Digest,
    pub code_version: &'a str,
    pub hash_list: Option<&'a [Digest]>,
    pub public_key: Option<&'a [u8]>,
    pub product_info: Option<&'a ProductInfo>,
    pub crypto_info: Option<&'a CryptoInfo>,
    pub arbitrary_data: Option<&'a [u8]>,
    pub axis_attestation: Option<&'a AxisAttestation>,
}

impl SeiBuilder<'_> {
    /// Serialises the records and signs them. Returns the complete TLV
    /// payload (without emulation prevention; see [`EmulationWriter`]).
    pub fn encode(&self, reserved: u8, signer: &dyn Signer) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        let mut general = Vec::with_capacity(64);
        general.push(GENERAL_VERSION);
        general.extend_from_slice(&self.gop_counter.to_be_bytes());
        general.extend_from_slice(&self.num_nalus_in_gop.to_be_bytes());
        general.extend_from_slice(&self.gop_hash);
        general.push(self.code_version.len() as u8);
        general.extend_from_slice(self.code_version.as_bytes());
        write_record(&mut out, Tag::General, &general);

        if let Some(pi) = self.product_info {
            let mut v = Vec::new();
            for f in [
                &pi.hardware_id,
                &pi.firmware_version,
                &pi.serial_number,
                &pi.manufacturer,
                &pi.address,
            ] {
                v.push(f.len() as u8);
                v.extend_from_slice(f.as_bytes());
            }
            write_record(&mut out, Tag::ProductInfo, &v);
        }
        if let Some(data) = self.arbitrary_data {
            write_record(&mut out, Tag::ArbitraryData, data);
        }
        if let Some(key) = self.public_key {
            write_record(&mut out, Tag::PublicKey, key);
        }
        if let Some(ci) = self.crypto_info {
            let mut v = Vec::with_capacity(2 + ci.algorithm.len());
            v.push(CRYPTO_INFO_VERSION);
            v.push(ci.algorithm.len() as u8);
            v.extend_from_slice(ci.algorithm.as_bytes());
            write_record(&mut out, Tag::CryptoInfo, &v);
        }
        if let Some(axis) = self.axis_attestation {
            let mut v = Vec::new();
            axis.encode_value(&mut v);
            write_record(&mut out, Tag::VendorAxisCommunications, &v);
        }
        if let Some(hashes) = self.hash_list {
            let mut v = Vec::with_capacity(hashes.len() * HASH_DIGEST_SIZE);
            for h in hashes {
                v.extend_from_slice(h);
            }
            write_record(&mut out, Tag::HashList, &v);
        }

        let signature = signer.sign(&signed_digest(reserved, &out));
        write_record(&mut out, Tag::Signature, &signature);
        out
    }
}

fn write_record(out: &mut Vec<u8>, tag: Tag, value: &[u8]) {
    debug_assert!(value.len() <= usize::from(u16::MAX));
    out.push(tag as u8);
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
}

/// Byte writer that inserts emulation-prevention bytes (`03` after `00 00`
/// when the next byte is `00`..`03`), tracking the last two bytes written.
pub struct EmulationWriter<'a> {
    out: &'a mut Vec<u8>,
    last_two: u16,
}

impl<'a> EmulationWriter<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        EmulationWriter {
            out,
            last_two: 0xFFFF,
        }
    }

    pub fn write_byte(&mut self, b: u8) {
        if self.last_two == 0x0000 && b <= 0x03 {
            self.out.push(0x03);
            self.last_two = 0x0003;
        }
        self.out.push(b);
        self.last_two = (self.last_two << 8) | u16::from(b);
    }

    pub fn write_all(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::strip_emulation_prevention;

    struct NullSigner;
    impl Signer for NullSigner {
        fn sign(&self, digest: &Digest) -> Vec<u8> {
            digest.to_vec()
        }
        fn public_key(&self) -> &[u8] {
            b"null"
        }
    }

    fn minimal_builder() -> SeiBuilder<'static> {
        SeiBuilder {
            gop_counter: 7,
            num_nalus_in_gop: 4,
            gop_hash: [0x42; HASH_DIGEST_SIZE],
            code_version: "0.1.0",
            hash_list: None,
            public_key: None,
            product_info: None,
            crypto_info: None,
            arbitrary_data: None,
            axis_attestation: None,
        }
    }

    #[test]
    fn decode_matches_encode() {
        let tlv = minimal_builder().encode(0x80, &NullSigner);
        let sei = decode(&tlv, 0x80).unwrap();
        assert_eq!(sei.gop_counter, 7);
        assert_eq!(sei.num_nalus_in_gop, 4);
        assert_eq!(sei.gop_hash, [0x42; HASH_DIGEST_SIZE]);
        assert_eq!(sei.code_version, "0.1.0");
        assert!(sei.hash_list.is_none());
        // NullSigner signs with the digest itself, so the decoder must
        // recompute the identical digest.
        assert_eq!(sei.signature, sei.signed_digest.to_vec());
    }

    #[test]
    fn recurrent_records_roundtrip() {
        let pi = ProductInfo {
            hardware_id: "hw".into(),
            firmware_version: "fw 1.2".into(),
            serial_number: "1234".into(),
            manufacturer: "acme".into(),
            address: "lund".into(),
        };
        let ci = CryptoInfo {
            algorithm: "ecdsa-p256".into(),
        };
        let axis = AxisAttestation::new(Some(&[0xAA, 0xBB]), Some("chain")).unwrap();
        let hashes = [[1u8; HASH_DIGEST_SIZE], [2u8; HASH_DIGEST_SIZE]];
        let tlv = SeiBuilder {
            axis_attestation: Some(&axis),
            hash_list: Some(&hashes),
            public_key: Some(b"key-bytes"),
            product_info: Some(&pi),
            crypto_info: Some(&ci),
            arbitrary_data: Some(b"user data"),
            ..minimal_builder()
        }
        .encode(0x80, &NullSigner);
        let sei = decode(&tlv, 0x80).unwrap();
        assert_eq!(sei.product_info.as_ref(), Some(&pi));
        assert_eq!(sei.crypto_info.as_ref(), Some(&ci));
        assert_eq!(sei.public_key.as_deref(), Some(&b"key-bytes"[..]));
        assert_eq!(sei.arbitrary_data.as_deref(), Some(&b"user data"[..]));
        assert_eq!(sei.axis_attestation.as_ref(), Some(&axis));
        assert_eq!(sei.hash_list.as_deref(), Some(&hashes[..]));
    }

    #[test]
    fn unknown_tag_is_skipped() {
        let mut tlv = Vec::new();
        write_record(&mut tlv, Tag::General, &{
            let b = minimal_builder();
            let mut g = vec![1u8];
            g.extend_from_slice(&b.gop_counter.to_be_bytes());
            g.extend_from_slice(&b.num_nalus_in_gop.to_be_bytes());
            g.extend_from_slice(&b.gop_hash);
            g.push(0);
            g
        });
        // Unknown tag 0x7F in the middle.
        tlv.push(0x7F);
        tlv.extend_from_slice(&3u16.to_be_bytes());
        tlv.extend_from_slice(&[9, 9, 9]);
        let presig = tlv.clone();
        write_record(&mut tlv, Tag::Signature, b"sig");
        let sei = decode(&tlv, 0x80).unwrap();
        assert_eq!(sei.gop_counter, 7);
        assert_eq!(sei.signed_digest, signed_digest(0x80, &presig));
    }

    #[test]
    fn decode_errors() {
        // Length overrun.
        let mut tlv = vec![Tag::General as u8];
        tlv.extend_from_slice(&200u16.to_be_bytes());
        tlv.push(1);
        assert!(matches!(
            decode(&tlv, 0x80),
            Err(Error::DecodingError("record length overrun"))
        ));

        // Trailing bytes after the signature record.
        let mut tlv = minimal_builder().encode(0x80, &NullSigner);
        tlv.push(0);
        assert!(matches!(decode(&tlv, 0x80), Err(Error::DecodingError(_))));

        // No signature at all.
        let tlv: Vec<u8> = Vec::new();
        assert!(matches!(
            decode(&tlv, 0x80),
            Err(Error::DecodingError("no signature record"))
        ));
    }

    #[test]
    fn incompatible_general_version() {
        let mut tlv = minimal_builder().encode(0x80, &NullSigner);
        // The version byte is the first value byte of the first record.
        tlv[3] = 2;
        assert!(matches!(
            decode(&tlv, 0x80),
            Err(Error::IncompatibleVersion(2))
        ));
    }

    #[test]
    fn emulation_writer_inverts_strip() {
        let payload = [0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x02, 0xFF, 0x00, 0x00];
        let mut wire = Vec::new();
        EmulationWriter::new(&mut wire).write_all(&payload);
        assert!(wire.len() > payload.len());
        let (stripped, removed) = strip_emulation_prevention(&wire);
        assert_eq!(stripped, payload);
        assert_eq!(removed, wire.len() - payload.len());
    }

    #[test]
    fn emulation_writer_escapes_exactly_when_needed() {
        let mut wire = Vec::new();
        let mut w = EmulationWriter::new(&mut wire);
        w.write_all(&[0x00, 0x00, 0x03]);
        assert_eq!(wire, vec![0x00, 0x00, 0x03, 0x03]);

        let mut wire = Vec::new();
        let mut w = EmulationWriter::new(&mut wire);
        w.write_all(&[0x00, 0x00, 0x04]);
        assert_eq!(wire, vec![0x00, 0x00, 0x04]);
    }
}
