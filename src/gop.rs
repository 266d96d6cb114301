// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-GOP scratch state, shared by the signing and validating sides.

use log::debug;

use crate::crypto::{Digest, HashEngine};

/// Per-frame digests kept per GOP before falling back from FRAME to GOP
/// authenticity level.
pub const MAX_HASH_LIST: usize = 60;

/// Running state of the GOP currently being collected.
#[derive(Clone)]
pub(crate) struct GopState {
    /// Running digest over the member hashes; becomes the GOP hash.
    engine: HashEngine,

    /// Per-frame hashes, bounded by `hash_list_cap`.
    pub hash_list: Vec<Digest>,
    hash_list_cap: usize,

    /// The hash list overflowed; only the GOP hash is carried for this GOP.
    pub frame_hashes_unavailable: bool,

    /// Picture NAL units hashed into this GOP so far.
    pub num_nalus_in_gop: u16,

    /// A signed-video SEI was observed during this GOP.
    pub has_sei_in_gop: bool,

    /// A GOP transition occurred before any SEI covering it was seen.
    pub no_gop_end_before_sei: bool,

    /// A GOP-counter discontinuity was detected while this GOP was open.
    pub gop_transition_is_lost: bool,
}

impl std::fmt::Debug for GopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GopState")
            .field("num_nalus_in_gop", &self.num_nalus_in_gop)
            .field("hash_list_len", &self.hash_list.len())
            .field("frame_hashes_unavailable", &self.frame_hashes_unavailable)
            .field("has_sei_in_gop", &self.has_sei_in_gop)
            .field("no_gop_end_before_sei", &self.no_gop_end_before_sei)
            .field("gop_transition_is_lost", &self.gop_transition_is_lost)
            .finish()
    }
}

impl GopState {
    pub fn new(hash_list_cap: usize) -> Self {
        GopState {
            engine: HashEngine::init(),
            hash_list: Vec::new(),
            hash_list_cap,
            frame_hashes_unavailable: false,
            num_nalus_in_gop: 0,
            has_sei_in_gop: false,
            no_gop_end_before_sei: false,
            gop_transition_is_lost: false,
        }
    }

    /// Starts a fresh GOP, keeping the configured hash-list cap.
    pub fn reset(&mut self) {
        *self = GopState::new(self.hash_list_cap);
    }

    /// Folds one picture NAL unit's digest into the GOP.
    pub fn add_picture_hash(&mut self, hash: Digest) {
        self.engine.update(&hash);
        self.num_nalus_in_gop = self.num_nalus_in_gop.saturating_add(1);
        if self.frame_hashes_unavailable {
            return;
        }
        if self.hash_list.len() >= self.hash_list_cap {
            debug!(
                "hash list exceeded {} entries; falling back to GOP level",
                self.hash_list_cap
            );
            self.hash_list.clear();
            self.frame_hashes_unavailable = true;
        } else {
            self.hash_list.push(hash);
        }
    }

    /// The GOP hash over everything folded in so far.
    pub fn finalize_gop_hash(&self) -> Digest {
        self.engine.clone().finalize()
    }
}

/// What the validator believes about the current GOP from picture
/// observations alone.
#[derive(Clone, Default)]
pub(crate) struct GopInfoDetected {
    /// Picture NAL units seen since the last transition.
    pub num_pictures: u32,
    /// Primary slices among them.
    pub num_primary_slices: u32,
    /// The GOP-opening unit has been seen.
    pub has_first_nalu_in_gop: bool,
    /// Absolute list position of the SEI observed in this GOP, if any.
    pub sei_position: Option<u64>,
}

impl std::fmt::Debug for GopInfoDetected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GopInfoDetected")
            .field("num_pictures", &self.num_pictures)
            .field("num_primary_slices", &self.num_primary_slices)
            .field("has_first_nalu_in_gop", &self.has_first_nalu_in_gop)
            .field("sei_position", &self.sei_position)
            .finish()
    }
}

impl GopInfoDetected {
    pub fn reset(&mut self) {
        *self = GopInfoDetected::default();
    }
}
