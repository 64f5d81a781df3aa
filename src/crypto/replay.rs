//! Replay Window (C4): a 64-bit sliding bitmap keyed by `(epoch, sequence)`.
//!
//! The check is split from the commit: callers must verify the AEAD tag
//! before calling [`ReplayWindow::commit`], so a forged datagram can never
//! consume a legitimate sequence number's slot.

use crate::core::{ReplayOutcome, REPLAY_WINDOW_BITS};

/// Sliding-window anti-replay state for one direction of one session.
///
/// Scoped to a single epoch: [`ReplayWindow::check`] resets the window
/// whenever it observes a new epoch, since sequence numbers restart at
/// zero on every rekey.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    epoch: u32,
    highest: u64,
    bitmap: u64,
    initialized: bool,
}

impl ReplayWindow {
    /// A fresh window with no epoch established yet.
    pub fn new() -> Self {
        Self {
            epoch: 0,
            highest: 0,
            bitmap: 0,
            initialized: false,
        }
    }

    /// Check whether `(epoch, seq)` would be accepted, without mutating
    /// state. Callers must follow an [`ReplayOutcome::Accept`] with
    /// [`Self::commit`] only after the frame's AEAD tag has verified.
    pub fn check(&self, epoch: u32, seq: u64) -> ReplayOutcome {
        if !self.initialized || epoch != self.epoch {
            return ReplayOutcome::Accept;
        }
        if seq > self.highest {
            return ReplayOutcome::Accept;
        }
        let diff = self.highest - seq;
        if diff >= REPLAY_WINDOW_BITS {
            return ReplayOutcome::TooOld;
        }
        if self.bitmap & (1u64 << diff) != 0 {
            ReplayOutcome::Replay
        } else {
            ReplayOutcome::Accept
        }
    }

    /// Record `(epoch, seq)` as seen. Must only be called after the
    /// corresponding frame's AEAD tag has verified; calling it on a
    /// forged datagram would let an attacker burn legitimate sequence
    /// slots.
    pub fn commit(&mut self, epoch: u32, seq: u64) {
        if !self.initialized || epoch != self.epoch {
            self.epoch = epoch;
            self.highest = seq;
            self.bitmap = 1;
            self.initialized = true;
            return;
        }
        if seq > self.highest {
            let shift = seq - self.highest;
            self.bitmap = if shift >= REPLAY_WINDOW_BITS {
                0
            } else {
                self.bitmap << shift
            };
            self.bitmap |= 1;
            self.highest = seq;
            return;
        }
        let diff = self.highest - seq;
        if diff < REPLAY_WINDOW_BITS {
            self.bitmap |= 1u64 << diff;
        }
    }

    /// Convenience: check, and if accepted, commit immediately. Only safe
    /// to use when the caller has no authenticated-decryption step to
    /// interleave between check and commit (e.g. tests).
    pub fn check_and_update(&mut self, epoch: u32, seq: u64) -> ReplayOutcome {
        let outcome = self.check(epoch, seq);
        if outcome == ReplayOutcome::Accept {
            self.commit(epoch, seq);
        }
        outcome
    }

    /// The epoch this window is currently tracking, if any.
    pub fn epoch(&self) -> Option<u32> {
        self.initialized.then_some(self.epoch)
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sequence_in_an_epoch_is_accepted() {
        let mut w = ReplayWindow::new();
        assert_eq!(w.check_and_update(1, 0), ReplayOutcome::Accept);
    }

    #[test]
    fn exact_replay_is_rejected() {
        let mut w = ReplayWindow::new();
        assert_eq!(w.check_and_update(1, 10), ReplayOutcome::Accept);
        assert_eq!(w.check_and_update(1, 10), ReplayOutcome::Replay);
    }

    #[test]
    fn out_of_order_within_window_is_accepted_once() {
        let mut w = ReplayWindow::new();
        assert_eq!(w.check_and_update(1, 10), ReplayOutcome::Accept);
        assert_eq!(w.check_and_update(1, 5), ReplayOutcome::Accept);
        assert_eq!(w.check_and_update(1, 8), ReplayOutcome::Accept);
        assert_eq!(w.check_and_update(1, 5), ReplayOutcome::Replay);
        assert_eq!(w.check_and_update(1, 8), ReplayOutcome::Replay);
    }

    #[test]
    fn sequence_far_below_window_is_too_old() {
        let mut w = ReplayWindow::new();
        assert_eq!(w.check_and_update(1, 1000), ReplayOutcome::Accept);
        assert_eq!(w.check_and_update(1, 1000 - REPLAY_WINDOW_BITS), ReplayOutcome::TooOld);
    }

    #[test]
    fn large_forward_jump_resets_bitmap() {
        let mut w = ReplayWindow::new();
        for seq in 0..50 {
            assert_eq!(w.check_and_update(1, seq), ReplayOutcome::Accept);
        }
        assert_eq!(w.check_and_update(1, 50 + REPLAY_WINDOW_BITS), ReplayOutcome::Accept);
        for seq in 0..50 {
            assert_eq!(w.check_and_update(1, seq), ReplayOutcome::TooOld);
        }
    }

    #[test]
    fn epoch_change_resets_window_even_to_a_lower_sequence() {
        let mut w = ReplayWindow::new();
        assert_eq!(w.check_and_update(1, 500), ReplayOutcome::Accept);
        assert_eq!(w.check_and_update(2, 0), ReplayOutcome::Accept);
        assert_eq!(w.epoch(), Some(2));
    }

    #[test]
    fn check_does_not_mutate_state() {
        let mut w = ReplayWindow::new();
        w.commit(1, 10);
        assert_eq!(w.check(1, 10), ReplayOutcome::Replay);
        assert_eq!(w.check(1, 10), ReplayOutcome::Replay);
    }

    use proptest::prelude::*;

    proptest! {
        /// A strictly increasing sequence within one epoch is always
        /// accepted, in any order it's generated (monotonic delivery is the
        /// easy case the window must never reject).
        #[test]
        fn strictly_increasing_sequence_is_always_accepted(
            steps in prop::collection::vec(1u64..100, 1..64)
        ) {
            let mut w = ReplayWindow::new();
            let mut seq = 0u64;
            for step in steps {
                prop_assert_eq!(w.check_and_update(1, seq), ReplayOutcome::Accept);
                seq += step;
            }
        }

        /// Replaying any already-committed sequence is rejected no matter
        /// how many other sequences were accepted in between.
        #[test]
        fn any_committed_sequence_is_rejected_on_replay(
            seqs in prop::collection::vec(0u64..REPLAY_WINDOW_BITS, 1..64)
        ) {
            let mut w = ReplayWindow::new();
            let mut seen = std::collections::HashSet::new();
            for seq in seqs {
                let outcome = w.check_and_update(1, seq);
                if seen.contains(&seq) {
                    prop_assert_eq!(outcome, ReplayOutcome::Replay);
                } else {
                    prop_assert_eq!(outcome, ReplayOutcome::Accept);
                    seen.insert(seq);
                }
            }
        }
    }
}
