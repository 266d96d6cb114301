// SPDX-License-Identifier: MIT OR Apache-2.0

//! The validation engine: an append-only pending list of NAL units, settled
//! window by window as signed-video SEIs complete their GOPs.
//!
//! A *window* runs from the list head through the unit that closes a GOP
//! (the first primary I slice of the next one). The SEI covering the window
//! declares the unit count and GOP hash over the window's picture units,
//! chained closer included. The closer itself stays pending: it belongs to
//! the next GOP too and is drained with it.

use std::collections::VecDeque;

use log::{debug, trace, warn};

use crate::authenticity::{Authenticity, LatestValidation, ProductInfo, ValidationStatus};
use crate::crypto::{bytes_equal, digests_equal, gop_hash, Digest, Verifier};
use crate::error::Error;
use crate::gop::{GopInfoDetected, GopState, MAX_HASH_LIST};
use crate::nal::{parse_nalu_info, NaluInfo, Validity};
use crate::tlv::{self, SeiContents};
use crate::vendor::axis::AxisAttestation;
use crate::Codec;

/// Snapshots retained while the public key has not arrived. Bounded; the
/// oldest snapshot is discarded on overflow and its units become `U`.
pub const MAX_PENDING_GOPS: usize = 120;

/// One entry in the pending list.
pub(crate) struct NaluListItem {
    pub nalu: NaluInfo,
    pub status: ValidationStatus,

    /// Digest of the unit's hashable bytes; all zero for non-hashable
    /// units.
    pub hash: Digest,

    /// Digest consumed by the *closing* pass when this unit participates in
    /// two adjacent GOPs.
    pub second_hash: Option<Digest>,

    /// Missing units detected immediately before this one (FRAME level);
    /// rendered as `M` in the validation string.
    pub missing_before: usize,

    pub needs_second_verification: bool,
    /// First (chained) verification failed; the second pass may not report
    /// this unit authentic.
    pub first_verification_not_authentic: bool,
    /// SEI payload has been decoded; decoding twice is forbidden.
    pub has_been_decoded: bool,
    pub used_in_gop_hash: bool,

    /// Decoded payload of a signed-video SEI.
    pub sei: Option<SeiContents>,
    /// The SEI has been consumed by (or queued for) a validation.
    pub sei_used: bool,
}

impl NaluListItem {
    fn new(nalu: NaluInfo) -> Self {
        let status = match nalu.validity {
            Validity::Valid => ValidationStatus::Pending,
            Validity::Invalid => ValidationStatus::Unknown,
            Validity::Error => ValidationStatus::Error,
        };
        let hash = if nalu.is_hashable {
            nalu.hash()
        } else {
            [0; crate::crypto::HASH_DIGEST_SIZE]
        };
        NaluListItem {
            nalu,
            status,
            hash,
            second_hash: None,
            missing_before: 0,
            needs_second_verification: false,
            first_verification_not_authentic: false,
            has_been_decoded: false,
            used_in_gop_hash: false,
            sei: None,
            sei_used: false,
        }
    }

    fn is_picture(&self) -> bool {
        self.nalu.is_picture()
    }
}

/// Arrival-order pending list: append at the tail, release from the head
/// once verdicts are final. Positions are absolute (stable across drains).
pub(crate) struct NaluList {
    items: VecDeque<NaluListItem>,
    drained: u64,
}

impl NaluList {
    fn new() -> Self {
        NaluList {
            items: VecDeque::new(),
            drained: 0,
        }
    }

    fn push(&mut self, item: NaluListItem) -> u64 {
        self.items.push_back(item);
        self.drained + self.items.len() as u64 - 1
    }

    fn rel(&self, abs: u64) -> usize {
        (abs - self.drained) as usize
    }

    fn get(&self, abs: u64) -> &NaluListItem {
        &self.items[self.rel(abs)]
    }

    fn get_mut(&mut self, abs: u64) -> &mut NaluListItem {
        let i = self.rel(abs);
        &mut self.items[i]
    }

    fn iter(&self) -> impl Iterator<Item = &NaluListItem> {
        self.items.iter()
    }

    /// Absolute positions of the items in `0..=closer` (head through the
    /// window closer, inclusive).
    fn window(&self, closer: u64) -> std::ops::RangeInclusive<u64> {
        self.drained..=closer
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Totals from draining settled items off the head of the list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct DrainStats {
    pub validated: u64,
    pub unknown: u64,
    pub invalid: u64,
}

/// One report's worth of output from the engine.
pub(crate) struct ValidationOutcome {
    pub latest: LatestValidation,
    pub drained: DrainStats,
}

/// Deferred validation of one GOP, awaiting the public key: the GOP-time
/// scratch state plus the decoded SEI and the window boundary.
struct PendingGop {
    #[allow(dead_code)] // retained for parity with the wire-time state
    gop_state: GopState,
    #[allow(dead_code)]
    detected: GopInfoDetected,
    closer: Option<u64>,
    sei: u64,
    contents: SeiContents,
}

/// Observable engine state. Derived; the engine itself keys off
/// `pending_closer` and the ring. (Validation proper is a transient step
/// inside one add call and is never observable from outside.)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum GopValidationState {
    Collecting,
    AwaitingSei,
    AwaitingPublicKey,
}

pub(crate) struct Validation {
    codec: Codec,
    list: NaluList,

    gop_state: GopState,
    detected: GopInfoDetected,

    /// Closer of a GOP transition that happened before its SEI was seen.
    pending_closer: Option<u64>,
    /// Most recent transition closer, whether or not it has been validated.
    last_closer: Option<u64>,

    /// GOP counter the next SEI is expected to declare.
    expected_counter: Option<u32>,

    public_key: Option<Vec<u8>>,
    /// Key rotation observed but not yet surfaced in a report.
    key_changed_latch: bool,

    pending_gops: VecDeque<PendingGop>,
    max_pending_gops: usize,

    has_validated: bool,
    seen_sei: bool,
    unsigned_transitions: u32,

    // Most recent recurrent payloads, surfaced through reports.
    pub product_info: Option<ProductInfo>,
    pub signing_version: Option<String>,
    pub crypto_info: Option<tlv::CryptoInfo>,
    pub arbitrary_data: Option<Vec<u8>>,
    pub axis_attestation: Option<AxisAttestation>,
}

/// What `verify_and_mark` concluded about one window.
struct WindowVerdict {
    authenticity: Authenticity,
    expected: i32,
    received: i32,
}

impl Validation {
    pub fn new(codec: Codec) -> Self {
        Validation {
            codec,
            list: NaluList::new(),
            gop_state: GopState::new(MAX_HASH_LIST),
            detected: GopInfoDetected::default(),
            pending_closer: None,
            last_closer: None,
            expected_counter: None,
            public_key: None,
            key_changed_latch: false,
            pending_gops: VecDeque::new(),
            max_pending_gops: MAX_PENDING_GOPS,
            has_validated: false,
            seen_sei: false,
            unsigned_transitions: 0,
            product_info: None,
            signing_version: None,
            crypto_info: None,
            arbitrary_data: None,
            axis_attestation: None,
        }
    }

    #[cfg(test)]
    pub fn set_max_pending_gops(&mut self, n: usize) {
        self.max_pending_gops = n;
    }

    pub fn state(&self) -> GopValidationState {
        if !self.pending_gops.is_empty() {
            GopValidationState::AwaitingPublicKey
        } else if self.pending_closer.is_some() {
            GopValidationState::AwaitingSei
        } else {
            GopValidationState::Collecting
        }
    }

    /// Clears everything except the active public key (and the recurrent
    /// payloads, which describe the peer rather than the stream position).
    pub fn reset(&mut self) {
        self.list = NaluList::new();
        self.gop_state.reset();
        self.detected.reset();
        self.pending_closer = None;
        self.last_closer = None;
        self.expected_counter = None;
        self.key_changed_latch = false;
        self.pending_gops.clear();
        self.has_validated = false;
        self.seen_sei = false;
        self.unsigned_transitions = 0;
    }

    /// Registers one NAL unit and runs any validation it triggers.
    ///
    /// An unparseable or invalid unit is carried in the list (`E`/`U`) and
    /// is not an error. A TLV decoding failure inside a signed-video SEI is
    /// surfaced as an error after the item has been recorded as `E`.
    pub fn add_nalu(
        &mut self,
        verifier: &dyn Verifier,
        data: &[u8],
    ) -> Result<Option<ValidationOutcome>, Error> {
        let info = parse_nalu_info(data, self.codec);
        trace!("add nalu: {:?}", info);
        let mut item = NaluListItem::new(info);

        let mut decode_err = None;
        let mut decoded = false;
        if item.nalu.validity == Validity::Valid && item.nalu.is_gop_sei {
            debug_assert!(!item.has_been_decoded);
            let tlv_bytes = item.nalu.tlv.clone().unwrap_or_default();
            match tlv::decode(&tlv_bytes, item.nalu.reserved_byte) {
                Ok(contents) => {
                    item.has_been_decoded = true;
                    item.sei = Some(contents);
                    decoded = true;
                }
                Err(e) => {
                    item.status = ValidationStatus::Error;
                    decode_err = Some(e);
                }
            }
        }

        let is_picture = item.is_picture();
        let is_primary = item.nalu.is_primary_slice;
        let is_transition = item.nalu.validity == Validity::Valid && item.nalu.is_first_nalu_in_gop;
        let abs = self.list.push(item);

        if is_picture {
            self.detected.num_pictures += 1;
            if is_primary {
                self.detected.num_primary_slices += 1;
            }
        }

        let outcome = if decoded {
            self.seen_sei = true;
            self.gop_state.has_sei_in_gop = true;
            self.detected.sei_position = Some(abs);
            self.stash_recurrent(abs);
            self.on_sei_decoded(verifier, abs)
        } else if is_transition {
            self.on_transition(verifier, abs)
        } else {
            None
        };

        match decode_err {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    fn stash_recurrent(&mut self, sei_abs: u64) {
        let contents = self.list.get(sei_abs).sei.as_ref().expect("decoded sei");
        if let Some(pi) = &contents.product_info {
            self.product_info = Some(pi.clone());
        }
        if let Some(ci) = &contents.crypto_info {
            self.crypto_info = Some(ci.clone());
        }
        if let Some(a) = &contents.arbitrary_data {
            self.arbitrary_data = Some(a.clone());
        }
        if let Some(axis) = &contents.axis_attestation {
            self.axis_attestation = Some(axis.clone());
        }
        self.signing_version = Some(contents.code_version.clone());
    }

    /// A new GOP just opened at `closer`; the previous one is complete and
    /// may now be validated.
    fn on_transition(
        &mut self,
        verifier: &dyn Verifier,
        closer: u64,
    ) -> Option<ValidationOutcome> {
        debug!(
            "gop transition at item {closer} ({:?}); closing {:?} {:?}",
            self.state(),
            self.gop_state,
            self.detected
        );
        let outcome = if !self.seen_sei {
            self.unsigned_transitions += 1;
            self.gop_state.no_gop_end_before_sei = true;
            // The GOP may still turn out to be signed by a late SEI.
            self.pending_closer = Some(closer);
            if self.unsigned_transitions >= 2 {
                let received = match self.last_closer {
                    Some(prev) => self.mark_gap(prev, ValidationStatus::Unknown),
                    None => 0,
                };
                Some(self.emit(Authenticity::NotSigned, None, received, false))
            } else {
                None
            }
        } else {
            match self.find_unused_sei() {
                Some(sei_abs) => self.validate_trigger(verifier, Some(closer), sei_abs, false),
                None => {
                    self.gop_state.no_gop_end_before_sei = true;
                    match self.pending_closer.replace(closer) {
                        Some(old) => {
                            // Two transitions with no SEI between them: the
                            // older GOP is unverifiable.
                            let received = self.mark_gap(old, ValidationStatus::NotOk);
                            self.list.get_mut(old).first_verification_not_authentic = true;
                            Some(self.emit(Authenticity::NotOk, None, received, false))
                        }
                        None => None,
                    }
                }
            }
        };
        self.last_closer = Some(closer);
        self.detected.reset();
        self.detected.has_first_nalu_in_gop = true;
        self.detected.num_pictures = 1;
        self.detected.num_primary_slices = 1;
        self.gop_state.reset();
        outcome
    }

    /// A signed-video SEI finished decoding at `sei_abs`.
    fn on_sei_decoded(
        &mut self,
        verifier: &dyn Verifier,
        sei_abs: u64,
    ) -> Option<ValidationOutcome> {
        // A newly arrived key settles everything the ring buffered.
        let flushed = self.flush_pending_gops(verifier, sei_abs);
        if let Some(outcome) = flushed {
            return Some(outcome);
        }
        match self.pending_closer {
            // Late SEI: its GOP already closed.
            Some(closer) => self.validate_trigger(verifier, Some(closer), sei_abs, true),
            None => {
                // An older unconsumed SEI means its GOP ended without a
                // visible transition: the opening unit of the next GOP was
                // lost along with the chained closer. Settle it without
                // one.
                match self.find_unused_sei() {
                    Some(older) if older != sei_abs => {
                        debug!("sei at {older} has no closing unit; validating without one");
                        self.validate_trigger(verifier, None, older, false)
                    }
                    _ => None, // early SEI; waits for its transition
                }
            }
        }
    }

    /// First decoded-but-unconsumed SEI in arrival order.
    fn find_unused_sei(&self) -> Option<u64> {
        self.list
            .iter()
            .position(|i| i.sei.is_some() && !i.sei_used)
            .map(|rel| self.list.drained + rel as u64)
    }

    /// Validates the window ending at `closer` against the SEI at
    /// `sei_abs`, after reconciling the GOP counter. `late` marks the
    /// late-SEI trigger (the SEI decoded after its GOP closed); a `None`
    /// closer means the chained unit itself was lost.
    fn validate_trigger(
        &mut self,
        verifier: &dyn Verifier,
        closer: Option<u64>,
        sei_abs: u64,
        late: bool,
    ) -> Option<ValidationOutcome> {
        let contents = self
            .list
            .get(sei_abs)
            .sei
            .clone()
            .expect("validate_trigger on decoded sei");

        let jump = match self.expected_counter {
            Some(expected) if contents.gop_counter > expected => {
                self.gop_state.gop_transition_is_lost = true;
                debug!(
                    "gop counter jumped to {} (expected {expected})",
                    contents.gop_counter
                );
                contents.gop_counter - expected
            }
            Some(expected) if contents.gop_counter < expected => {
                // Signer-side reset. Validate against the new declaration
                // anyway; the mismatch surfaces as a failed window with
                // negative `missed`.
                debug!(
                    "gop counter went backwards ({} after {expected}): signer-side reset",
                    contents.gop_counter
                );
                0
            }
            _ => 0,
        };

        if let (true, Some(c), 1..) = (late, closer, jump) {
            // Does this SEI actually sign the pending window? A matching
            // GOP hash means the jump only reflects older, already-settled
            // losses, and validation proceeds normally below.
            let window_pictures: Vec<u64> = self
                .list
                .window(c)
                .filter(|&a| {
                    let item = self.list.get(a);
                    item.status == ValidationStatus::Pending && item.is_picture()
                })
                .collect();
            let computed = gop_hash(window_pictures.iter().map(|&a| &self.list.get(a).hash));
            if !digests_equal(&computed, &contents.gop_hash) {
                // The SEI covers a GOP *after* the pending closer; what
                // sits before the closer can never be verified. One lost
                // SEI is a verifiable failure; a longer jump is a
                // fast-forward and can only be reported, not judged.
                let (status, verdict) = if jump == 1 {
                    (ValidationStatus::NotOk, Authenticity::NotOk)
                } else {
                    (ValidationStatus::Unknown, Authenticity::SignaturePresent)
                };
                let received = self.mark_gap(c, status);
                if jump == 1 {
                    self.list.get_mut(c).first_verification_not_authentic = true;
                }
                self.expected_counter = Some(contents.gop_counter);
                self.pending_closer = None;
                // The SEI stays unconsumed: it covers the GOP that the
                // current closer opens.
                return Some(self.emit(verdict, None, received, false));
            }
        }

        // Key rotation: a key carried by this SEI takes effect now.
        let mut key_changed = false;
        if let Some(key) = &contents.public_key {
            if let Some(active) = &self.public_key {
                if !bytes_equal(key, active) {
                    warn!("signing public key changed");
                    key_changed = true;
                }
            }
            self.public_key = Some(key.clone());
        }
        if self.public_key.is_none() {
            return Some(self.defer(closer, sei_abs, contents));
        }

        self.mark_sei_consumed(sei_abs);
        self.pending_closer = None;
        // A forward jump at a regular transition means the units at hand
        // span the fast-forward; judge them leniently.
        let v = self.verify_and_mark(verifier, closer, sei_abs, &contents, jump >= 2);
        Some(self.emit(v.authenticity, Some(v.expected), v.received, key_changed))
    }

    /// No public key yet: snapshot the window into the ring and report that
    /// a signature exists.
    fn defer(
        &mut self,
        closer: Option<u64>,
        sei_abs: u64,
        contents: SeiContents,
    ) -> ValidationOutcome {
        debug!("no public key yet; deferring gop {}", contents.gop_counter);
        if self.pending_gops.len() >= self.max_pending_gops {
            let old = self.pending_gops.pop_front().expect("ring non-empty");
            warn!("pending-gop ring overflow; oldest snapshot dropped");
            self.mark_window_unknown(old.closer.unwrap_or(old.sei), old.sei);
        }
        self.expected_counter = Some(contents.gop_counter + 1);
        self.mark_sei_consumed(sei_abs);
        self.pending_closer = None;
        self.pending_gops.push_back(PendingGop {
            gop_state: self.gop_state.clone(),
            detected: self.detected.clone(),
            closer,
            sei: sei_abs,
            contents,
        });
        self.emit(Authenticity::SignaturePresent, None, 0, false)
    }

    /// Settles every buffered GOP once a key is available. Returns the
    /// single catch-up report covering all of them.
    fn flush_pending_gops(
        &mut self,
        verifier: &dyn Verifier,
        sei_abs: u64,
    ) -> Option<ValidationOutcome> {
        if self.pending_gops.is_empty() {
            return None;
        }
        let carried = self
            .list
            .get(sei_abs)
            .sei
            .as_ref()
            .and_then(|c| c.public_key.clone());
        let Some(key) = carried.or_else(|| self.public_key.clone()) else {
            return None;
        };
        if let Some(active) = &self.public_key {
            if !bytes_equal(&key, active) {
                self.key_changed_latch = true;
            }
        }
        self.public_key = Some(key);
        debug!(
            "public key arrived; validating {} buffered gop(s)",
            self.pending_gops.len()
        );

        let mut verdict = Authenticity::SignaturePresent;
        let mut expected_sum = 0i32;
        let mut received_sum = 0i32;
        while let Some(pg) = self.pending_gops.pop_front() {
            let v = self.verify_and_mark(verifier, pg.closer, pg.sei, &pg.contents, false);
            verdict = verdict.worst(v.authenticity);
            expected_sum += v.expected;
            received_sum += v.received;
        }
        Some(self.emit(verdict, Some(expected_sum), received_sum, false))
    }

    fn mark_sei_consumed(&mut self, sei_abs: u64) {
        self.list.get_mut(sei_abs).sei_used = true;
    }

    /// Core verification of one window. The SEI has been consumed and a key
    /// is active; counter reconciliation already happened. With `lenient`,
    /// a hash mismatch yields `U`/`SIGNATURE_PRESENT` instead of
    /// `N`/`NOT_OK` (mid-stream join, fast-forward).
    fn verify_and_mark(
        &mut self,
        verifier: &dyn Verifier,
        closer: Option<u64>,
        sei_abs: u64,
        contents: &SeiContents,
        lenient: bool,
    ) -> WindowVerdict {
        trace!("validating window closed by {closer:?} against sei {sei_abs}");
        let key = self.public_key.clone().expect("key active");
        let sig_ok = verifier.verify(&key, &contents.signed_digest, &contents.signature);
        let lenient = lenient || !self.has_validated;
        self.has_validated = true;
        self.expected_counter = Some(contents.gop_counter + 1);

        // Pending picture units of the window, closer (if any) included.
        let end = closer.unwrap_or(sei_abs);
        let pictures: Vec<u64> = self
            .list
            .window(end)
            .filter(|&a| {
                let item = self.list.get(a);
                item.status == ValidationStatus::Pending && item.is_picture()
            })
            .collect();
        let received = pictures.len() as i32;
        let expected = i32::from(contents.num_nalus_in_gop);

        // The closer participates in two GOPs. This closing pass consumes
        // `second_hash`; the unit's own GOP later consumes `hash`.
        if let Some(c) = closer {
            let closer_item = self.list.get_mut(c);
            if closer_item.is_picture() {
                closer_item.needs_second_verification = true;
                closer_item.second_hash = Some(closer_item.hash);
            }
        }

        let authenticity = if !sig_ok {
            debug!("signature verification failed");
            for &a in &pictures {
                if Some(a) == closer {
                    self.list.get_mut(a).first_verification_not_authentic = true;
                } else {
                    self.list.get_mut(a).status = ValidationStatus::NotOk;
                }
            }
            self.list.get_mut(sei_abs).status = ValidationStatus::NotOk;
            Authenticity::NotOk
        } else {
            let computed = gop_hash(pictures.iter().map(|&a| {
                let item = self.list.get(a);
                if Some(a) == closer {
                    item.second_hash.as_ref().unwrap_or(&item.hash)
                } else {
                    &item.hash
                }
            }));
            let whole_gop_ok = digests_equal(&computed, &contents.gop_hash);
            for &a in &pictures {
                self.list.get_mut(a).used_in_gop_hash = true;
            }
            if lenient && !whole_gop_ok {
                // Mid-stream join or fast-forward: the declaration covers
                // units this session never saw. Benefit of the doubt.
                debug!("window cannot cover the declared gop; signature present");
                for &a in &pictures {
                    if Some(a) != closer {
                        self.list.get_mut(a).status = ValidationStatus::Unknown;
                    }
                }
                self.list.get_mut(sei_abs).status = ValidationStatus::Unknown;
                Authenticity::SignaturePresent
            } else if let Some(hash_list) = &contents.hash_list {
                let v = self.mark_frame_level(&pictures, closer, hash_list);
                self.list.get_mut(sei_abs).status = ValidationStatus::Ok;
                v
            } else {
                self.mark_gop_level(&pictures, closer, whole_gop_ok, sei_abs)
            }
        };

        self.mark_non_pictures(end);
        WindowVerdict {
            authenticity,
            expected,
            received,
        }
    }

    /// GOP-level marking: one verdict for the whole window.
    fn mark_gop_level(
        &mut self,
        pictures: &[u64],
        closer: Option<u64>,
        whole_gop_ok: bool,
        sei_abs: u64,
    ) -> Authenticity {
        let mut any_not_ok = false;
        if whole_gop_ok {
            for &a in pictures {
                if Some(a) == closer {
                    continue;
                }
                let item = self.list.get_mut(a);
                item.needs_second_verification = false;
                if item.first_verification_not_authentic {
                    item.status = ValidationStatus::NotOk;
                    any_not_ok = true;
                } else {
                    item.status = ValidationStatus::Ok;
                }
            }
            self.list.get_mut(sei_abs).status = ValidationStatus::Ok;
            if any_not_ok {
                Authenticity::NotOk
            } else {
                Authenticity::Ok
            }
        } else {
            debug!("gop hash mismatch");
            for &a in pictures {
                if Some(a) == closer {
                    self.list.get_mut(a).first_verification_not_authentic = true;
                } else {
                    self.list.get_mut(a).status = ValidationStatus::NotOk;
                }
            }
            self.list.get_mut(sei_abs).status = ValidationStatus::Ok;
            Authenticity::NotOk
        }
    }

    /// FRAME-level marking: align received digests against the declared
    /// hash list, identifying exactly which units are modified or missing.
    /// The window closer always corresponds to the *final* declared hash
    /// (it is the chained unit the declaration ends with).
    fn mark_frame_level(
        &mut self,
        pictures: &[u64],
        closer: Option<u64>,
        expected_hashes: &[Digest],
    ) -> Authenticity {
        let mut any_not_ok = false;
        let mut own_closer_failure = false;
        let mut missing_total = 0usize;

        let (members, member_hashes) =
            match (closer, pictures.split_last(), expected_hashes.split_last()) {
                (Some(c), Some((&last, members)), Some((closer_hash, member_hashes)))
                    if last == c =>
                {
                    let item = self.list.get(last);
                    let hash = item.second_hash.unwrap_or(item.hash);
                    if !digests_equal(&hash, closer_hash) {
                        self.list.get_mut(last).first_verification_not_authentic = true;
                        own_closer_failure = true;
                    }
                    (members, member_hashes)
                }
                (None, _, Some((_, member_hashes))) => {
                    // The declared chained closer never arrived.
                    missing_total += 1;
                    (pictures, member_hashes)
                }
                _ => (pictures, expected_hashes),
            };

        let mut e = 0usize;
        for &a in members {
            let (hash, latched) = {
                let item = self.list.get(a);
                (item.hash, item.first_verification_not_authentic)
            };
            if e >= member_hashes.len() {
                // More units than declared: extras or reordered units.
                self.list.get_mut(a).status = ValidationStatus::NotOk;
                any_not_ok = true;
                continue;
            }
            let matched = if digests_equal(&hash, &member_hashes[e]) {
                e += 1;
                true
            } else if let Some(ahead) = member_hashes[e + 1..]
                .iter()
                .position(|x| digests_equal(&hash, x))
            {
                // Hole: the declared units between `e` and the match never
                // arrived.
                let lost = ahead + 1;
                missing_total += lost;
                self.list.get_mut(a).missing_before += lost;
                e += lost + 1;
                true
            } else {
                e += 1;
                false
            };
            let item = self.list.get_mut(a);
            item.needs_second_verification = false;
            if !matched || latched {
                item.status = ValidationStatus::NotOk;
                any_not_ok = true;
            } else {
                item.status = ValidationStatus::Ok;
            }
        }
        if e < member_hashes.len() {
            // Units lost at the end of the GOP, right before the closer.
            let lost = member_hashes.len() - e;
            missing_total += lost;
            if let Some(c) = closer {
                self.list.get_mut(c).missing_before += lost;
            }
        }

        if any_not_ok || own_closer_failure {
            Authenticity::NotOk
        } else if missing_total > 0 {
            debug!("gop verified with {missing_total} missing unit(s)");
            Authenticity::OkWithMissingInfo
        } else {
            Authenticity::Ok
        }
    }

    /// Ignorable units of the settled window: foreign SEIs, undefined
    /// types, anything that carries no picture data.
    fn mark_non_pictures(&mut self, closer: u64) {
        for a in self.list.window(closer) {
            let item = self.list.get_mut(a);
            if item.status != ValidationStatus::Pending || item.is_picture() {
                continue;
            }
            if item.sei.is_some() {
                continue; // an unconsumed signed-video SEI stays pending
            }
            item.status = ValidationStatus::Ignored;
        }
    }

    /// Marks the still-pending units strictly before `end` when their GOP
    /// cannot be verified. Returns how many pictures were affected.
    fn mark_gap(&mut self, end: u64, status: ValidationStatus) -> i32 {
        let mut pictures = 0;
        for a in self.list.window(end) {
            if a == end {
                break;
            }
            let item = self.list.get_mut(a);
            if item.status != ValidationStatus::Pending {
                continue;
            }
            if item.is_picture() {
                item.status = status;
                pictures += 1;
            } else if item.sei.is_some() {
                item.status = ValidationStatus::Unknown;
                item.sei_used = true;
            } else {
                item.status = ValidationStatus::Ignored;
            }
        }
        pictures
    }

    /// Ring overflow: the discarded snapshot's window can never be
    /// validated.
    fn mark_window_unknown(&mut self, closer: u64, sei_abs: u64) {
        for a in self.list.window(closer) {
            let item = self.list.get_mut(a);
            if item.status == ValidationStatus::Pending {
                item.status = ValidationStatus::Unknown;
            }
        }
        let sei = self.list.get_mut(sei_abs);
        if sei.status == ValidationStatus::Pending {
            sei.status = ValidationStatus::Unknown;
        }
    }

    /// Builds the per-report view and drains settled items off the head.
    fn emit(
        &mut self,
        authenticity: Authenticity,
        expected: Option<i32>,
        received: i32,
        key_changed: bool,
    ) -> ValidationOutcome {
        let mut validation_str = String::with_capacity(self.list.len());
        let mut list_of_missing_nalus = Vec::new();
        let mut list_of_invalid_nalus = Vec::new();
        let mut pending = 0i32;
        for item in self.list.iter() {
            for _ in 0..item.missing_before {
                list_of_missing_nalus.push(validation_str.len());
                validation_str.push(ValidationStatus::Missing.as_char());
            }
            match item.status {
                ValidationStatus::Pending => pending += 1,
                ValidationStatus::NotOk | ValidationStatus::Error => {
                    list_of_invalid_nalus.push(validation_str.len())
                }
                _ => {}
            }
            validation_str.push(item.status.as_char());
        }

        let public_key_has_changed = key_changed || self.key_changed_latch;
        self.key_changed_latch = false;

        let latest = LatestValidation {
            authenticity,
            public_key_has_changed,
            number_of_expected_picture_nalus: expected.unwrap_or(-1),
            number_of_received_picture_nalus: received,
            number_of_pending_picture_nalus: pending,
            list_of_missing_nalus,
            list_of_invalid_nalus,
            validation_str,
        };
        debug!(
            "report: {:?} \"{}\"",
            latest.authenticity, latest.validation_str
        );

        let mut drained = DrainStats::default();
        while let Some(front) = self.list.items.front() {
            if front.status == ValidationStatus::Pending {
                break;
            }
            let item = self.list.items.pop_front().expect("front exists");
            self.list.drained += 1;
            match item.status {
                ValidationStatus::Unknown => drained.unknown += 1,
                ValidationStatus::NotOk | ValidationStatus::Error => drained.invalid += 1,
                _ => {}
            }
            drained.validated += 1;
        }

        ValidationOutcome { latest, drained }
    }
}
