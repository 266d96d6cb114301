// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded hex rendering for NAL unit bytes.
//!
//! Raw units run to kilobytes; `Debug` output and trace logs only ever
//! want a short prefix with a note about what was cut.

use pretty_hex::{HexConfig, PrettyHex};

pub(crate) struct HexPreview<'a> {
    shown: &'a [u8],
    omitted: usize,
}

impl<'a> HexPreview<'a> {
    pub fn new(bytes: &'a [u8], limit: usize) -> Self {
        let cut = bytes.len().min(limit);
        HexPreview {
            shown: &bytes[..cut],
            omitted: bytes.len() - cut,
        }
    }
}

impl std::fmt::Debug for HexPreview<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cfg = HexConfig {
            title: false,
            group: 8,
            ..Default::default()
        };
        write!(
            f,
            "[{}] {:?}",
            self.shown.len() + self.omitted,
            self.shown.hex_conf(cfg)
        )?;
        if self.omitted > 0 {
            write!(f, " (+{} more)", self.omitted)?;
        }
        Ok(())
    }
}
