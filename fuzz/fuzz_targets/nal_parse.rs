// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parsing must never panic, regardless of codec.
    let _ = vigil::nal::parse_nalu_info(data, vigil::Codec::H264);
    let _ = vigil::nal::parse_nalu_info(data, vigil::Codec::H265);
});
