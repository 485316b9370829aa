//! Per-session playout timing.
//!
//! Maps each packet's RTP timestamp onto the shared output clock, and
//! decides when a stream has drifted far enough to need resynchronising.

use crate::{constants::*, ring::SamplePos};

/// What to do with a packet once its target position is known.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Action {
    /// Discard without mixing or advancing.
    Drop,
    /// Mix at the target position.
    Play,
    /// Resynchronise timing, then mix at the new position.
    Resync,
}

/// Outcome of checking a target position against the read cursor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Verdict {
    pub(crate) late: bool,
    pub(crate) early: bool,
    pub(crate) action: Action,
}

#[derive(Clone, Debug)]
pub(crate) struct Playout {
    next_seq: u16,
    start_timestamp: u32,
    timestamp_upper: i64,
    start_cursor: SamplePos,
    delay: SamplePos,
    write_cursor: SamplePos,
    late_score: u32,
    consecutive_early: u32,
}

impl Playout {
    /// Baselines timing on a stream's first packet.
    pub(crate) fn new(
        first_seq: u16,
        first_timestamp: u32,
        read_cursor: SamplePos,
        delay: SamplePos,
    ) -> Self {
        Self {
            next_seq: first_seq,
            start_timestamp: first_timestamp,
            timestamp_upper: 0,
            start_cursor: read_cursor,
            delay,
            write_cursor: read_cursor + delay,
            late_score: 0,
            consecutive_early: 0,
        }
    }

    /// Records `seq` as received, returning whether it was the expected
    /// next packet.
    ///
    /// Timestamps of in-sequence packets extend the unwrapped timeline
    /// across 32-bit wraparound.
    pub(crate) fn check_sequence(&mut self, seq: u16, timestamp: u32) -> bool {
        let in_sequence = seq == self.next_seq;

        if in_sequence {
            while self.timestamp_upper + self.offset(timestamp) < 0 {
                self.timestamp_upper += 1 << 32;
            }
        }

        self.next_seq = seq.wrapping_add(1);

        in_sequence
    }

    /// Restarts the timeline at `timestamp`, to be played `delay` after
    /// the current read cursor.
    pub(crate) fn resync(&mut self, read_cursor: SamplePos, timestamp: u32, delay: SamplePos) {
        self.start_cursor = read_cursor;
        self.start_timestamp = timestamp;
        self.timestamp_upper = 0;
        self.delay = delay;
        self.write_cursor = read_cursor + delay;
    }

    fn offset(&self, timestamp: u32) -> i64 {
        i64::from(timestamp.wrapping_sub(self.start_timestamp) as i32)
    }

    /// Output position for a packet stamped `timestamp`, given `ratio`
    /// output samples per RTP tick.
    pub(crate) fn target(&self, timestamp: u32, ratio: u32) -> SamplePos {
        self.start_cursor
            + i64::from(ratio) * (self.timestamp_upper + self.offset(timestamp))
            + self.delay
    }

    /// Moves the write cursor to `target`, applying the late and early
    /// policies against `read_cursor`.
    ///
    /// Occasional late packets are dropped, but a burst (more than two in
    /// roughly ten packets) means the stream has fallen behind and must
    /// resync. Early packets are dropped unless several arrive in a row,
    /// which signals a jump in the sender's clock.
    pub(crate) fn judge(
        &mut self,
        target: SamplePos,
        read_cursor: SamplePos,
        ring_len: usize,
    ) -> Verdict {
        let mut verdict = Verdict {
            late: false,
            early: false,
            action: Action::Play,
        };

        self.write_cursor = target;

        if target < read_cursor {
            verdict.late = true;
            self.late_score += LATE_PENALTY;
            if self.late_score < LATE_RESET_THRESHOLD {
                verdict.action = Action::Drop;
                return verdict;
            }
            self.late_score = 0;
            verdict.action = Action::Resync;
        }

        self.late_score = self.late_score.saturating_sub(1);

        if target > read_cursor + (ring_len / 2) as SamplePos {
            verdict.early = true;
            self.consecutive_early += 1;
            if self.consecutive_early < EARLY_RESET_COUNT {
                verdict.action = Action::Drop;
                return verdict;
            }
            verdict.action = Action::Resync;
        }

        self.consecutive_early = 0;

        verdict
    }

    pub(crate) fn write_cursor(&self) -> SamplePos {
        self.write_cursor
    }

    /// Moves past `samples` output samples of mixed audio.
    pub(crate) fn advance(&mut self, samples: SamplePos) {
        self.write_cursor += samples;
    }

    #[cfg(test)]
    pub(crate) fn late_score(&self) -> u32 {
        self.late_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEN: usize = 1 << 10;

    fn playout() -> Playout {
        Playout::new(100, 1_000, 0, 50)
    }

    #[test]
    fn target_follows_timestamp() {
        let p = playout();

        assert_eq!(p.target(1_000, 1), 50);
        assert_eq!(p.target(1_960, 1), 1_010);
        assert_eq!(p.target(1_010, 6), 110);
    }

    #[test]
    fn gaps_are_reported_once() {
        let mut p = playout();

        assert!(p.check_sequence(100, 1_000));
        assert!(!p.check_sequence(102, 1_020));
        assert!(p.check_sequence(103, 1_030));
    }

    #[test]
    fn sequence_wraps() {
        let mut p = Playout::new(u16::MAX, 0, 0, 0);

        assert!(p.check_sequence(u16::MAX, 0));
        assert!(p.check_sequence(0, 10));
    }

    #[test]
    fn timestamps_unwrap_while_in_sequence() {
        let mut p = Playout::new(1, 0, 0, 0);
        let half = 1u32 << 31;

        assert!(p.check_sequence(1, half));
        assert_eq!(p.target(half, 1), 1 << 31);

        assert!(p.check_sequence(2, half + 960));
        assert_eq!(p.target(half + 960, 1), (1 << 31) + 960);
    }

    #[test]
    fn timestamps_cross_the_32_bit_boundary() {
        let mut p = Playout::new(1, u32::MAX - 479, 0, 0);

        assert!(p.check_sequence(1, u32::MAX - 479));
        assert!(p.check_sequence(2, 480));
        assert_eq!(p.target(480, 1), 960);
    }

    #[test]
    fn out_of_sequence_timestamps_are_not_unwrapped() {
        let mut p = Playout::new(1, 0, 0, 0);

        assert!(!p.check_sequence(9, 1 << 31));
        assert_eq!(p.target(1 << 31, 1), -(1 << 31));
    }

    #[test]
    fn resync_restarts_at_playout_delay() {
        let mut p = playout();
        p.advance(4_000);

        p.resync(700, 5_000, 80);

        assert_eq!(p.write_cursor(), 780);
        assert_eq!(p.target(5_000, 1), 780);
        assert_eq!(p.target(5_100, 2), 980);
    }

    #[test]
    fn isolated_lates_drop_then_reset() {
        let mut p = playout();
        let read = 1_000;
        let late = read - 10;
        let ok = read + 10;

        let v = p.judge(late, read, LEN);
        assert!(v.late);
        assert_eq!(v.action, Action::Drop);

        assert_eq!(p.judge(ok, read, LEN).action, Action::Play);

        let v = p.judge(late, read, LEN);
        assert!(v.late);
        assert_eq!(v.action, Action::Drop);

        assert_eq!(p.judge(ok, read, LEN).action, Action::Play);

        let v = p.judge(late, read, LEN);
        assert!(v.late);
        assert_eq!(v.action, Action::Resync);
        assert_eq!(p.late_score(), 0);
    }

    #[test]
    fn back_to_back_lates_reset_on_second() {
        let mut p = playout();

        assert_eq!(p.judge(0, 10, LEN).action, Action::Drop);
        assert_eq!(p.judge(0, 10, LEN).action, Action::Resync);
    }

    #[test]
    fn late_score_decays() {
        let mut p = playout();

        p.judge(0, 10, LEN);
        for _ in 0..10 {
            p.judge(20, 10, LEN);
        }
        assert_eq!(p.late_score(), 0);

        // Fully decayed, so the next late is dropped again.
        assert_eq!(p.judge(0, 10, LEN).action, Action::Drop);
    }

    #[test]
    fn three_consecutive_earlies_reset() {
        let mut p = playout();
        let far = (LEN as SamplePos) / 2 + 1;

        for _ in 0..2 {
            let v = p.judge(far, 0, LEN);
            assert!(v.early);
            assert_eq!(v.action, Action::Drop);
        }

        let v = p.judge(far, 0, LEN);
        assert!(v.early);
        assert_eq!(v.action, Action::Resync);
    }

    #[test]
    fn interleaved_earlies_never_reset() {
        let mut p = playout();
        let far = (LEN as SamplePos) / 2 + 1;

        for _ in 0..10 {
            assert_eq!(p.judge(far, 0, LEN).action, Action::Drop);
            assert_eq!(p.judge(far, 0, LEN).action, Action::Drop);
            assert_eq!(p.judge(5, 0, LEN).action, Action::Play);
        }
    }

    #[test]
    fn exactly_half_a_ring_ahead_is_playable() {
        let mut p = playout();
        let edge = (LEN as SamplePos) / 2;

        assert_eq!(p.judge(edge, 0, LEN).action, Action::Play);
        assert_eq!(p.write_cursor(), edge);
    }
}
