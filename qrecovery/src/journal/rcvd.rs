use std::time::{Duration, Instant};

use qbase::{
    frame::{AckFrame, BeFrame},
    util::RangeSet,
};

/// Records of the packets received in one packet number space.
///
/// Received packet numbers are kept as ranges until an ACK frame carrying them
/// is itself acknowledged by the peer, then they are pruned. Packet numbers
/// below the pruned threshold are still reported as duplicates, a late packet
/// there is dropped and the peer will retransmit its frames.
///
/// The journal also decides when an ACK frame must be sent: immediately after
/// `ack_eliciting_threshold` ack-eliciting packets or a reordered one, at the
/// latest `max_ack_delay` after the first unacknowledged ack-eliciting packet.
#[derive(Debug)]
pub struct RcvdJournal {
    rcvd: RangeSet,
    pruned_below: u64,
    largest: Option<(u64, Instant)>,
    // ack-eliciting packets since the last ACK frame was sent
    unacked_eliciting: u64,
    has_new: bool,
    ack_at: Option<Instant>,
    range_cap: usize,
    max_ack_delay: Duration,
    ack_eliciting_threshold: u64,
}

impl RcvdJournal {
    pub fn new(range_cap: usize, max_ack_delay: Duration, ack_eliciting_threshold: u64) -> Self {
        Self {
            rcvd: RangeSet::new(),
            pruned_below: 0,
            largest: None,
            unacked_eliciting: 0,
            has_new: false,
            ack_at: None,
            range_cap: range_cap.max(1),
            max_ack_delay,
            ack_eliciting_threshold: ack_eliciting_threshold.max(1),
        }
    }

    /// The largest packet number received so far.
    pub fn largest(&self) -> Option<u64> {
        self.largest.map(|(pn, _)| pn)
    }

    /// The packet number expected next, used to decode truncated packet numbers.
    pub fn expected_pn(&self) -> u64 {
        self.largest.map_or(0, |(pn, _)| pn + 1)
    }

    /// Whether `pn` was already received, or is too old to be told apart.
    pub fn is_duplicate(&self, pn: u64) -> bool {
        pn < self.pruned_below || self.rcvd.contains(pn)
    }

    /// Record a received packet, returning whether it is a duplicate.
    ///
    /// Duplicates are not an error; an ack-eliciting duplicate asks for an
    /// immediate ACK, the previous one was probably lost.
    pub fn record_received(&mut self, pn: u64, is_ack_eliciting: bool, now: Instant) -> bool {
        if self.is_duplicate(pn) {
            tracing::trace!(pn, "duplicate packet");
            if is_ack_eliciting {
                self.ack_at = Some(now);
            }
            return true;
        }

        let in_order = self.largest.is_none_or(|(largest, _)| pn == largest + 1);
        let had_gap = self.rcvd.len() > 1;
        self.rcvd.insert_one(pn);
        if self.largest.is_none_or(|(largest, _)| pn > largest) {
            self.largest = Some((pn, now));
        }
        self.has_new = true;

        if self.rcvd.len() > self.range_cap * 2 {
            // keep the oldest ranges bounded; anything below is treated as seen
            self.rcvd.truncate_oldest(self.range_cap);
            if let Some(min) = self.rcvd.min() {
                self.pruned_below = self.pruned_below.max(min);
            }
        }

        if is_ack_eliciting {
            self.unacked_eliciting += 1;
            if !in_order || had_gap || self.unacked_eliciting >= self.ack_eliciting_threshold {
                self.ack_at = Some(now);
            } else if self.ack_at.is_none() {
                self.ack_at = Some(now + self.max_ack_delay);
            }
        }
        false
    }

    /// The time an ACK frame must be sent, if any is owed.
    pub fn ack_deadline(&self) -> Option<Instant> {
        self.ack_at
    }

    /// Whether packets arrived since the last ACK frame, worth piggybacking.
    pub fn has_unacked(&self) -> bool {
        self.has_new
    }

    /// Generate an ACK frame covering the received packets, newest first,
    /// encoded in at most `capacity` bytes.
    ///
    /// At most `range_cap` ranges are carried, the oldest are left out, more
    /// if the frame would not fit. Returns `None` without touching the pending
    /// ACK deadline if nothing fits.
    pub fn gen_ack_frame(&mut self, now: Instant, capacity: usize) -> Option<AckFrame> {
        let (_, rcvd_time) = self.largest?;
        let delay = now.saturating_duration_since(rcvd_time);
        let mut ranges = self
            .rcvd
            .iter_newest_first()
            .take(self.range_cap)
            .collect::<Vec<_>>();
        let frame = loop {
            let frame = AckFrame::from_ranges(ranges.iter(), delay, None)?;
            if frame.encoding_size() <= capacity {
                break frame;
            }
            ranges.pop();
        };
        self.unacked_eliciting = 0;
        self.has_new = false;
        self.ack_at = None;
        Some(frame)
    }

    /// An ACK frame we sent, with `largest` as its largest acknowledged, was
    /// acknowledged: the packets it covered no longer need to be acknowledged.
    pub fn on_ack_acked(&mut self, largest: u64) {
        if largest < self.pruned_below {
            return;
        }
        self.rcvd.remove_below(largest + 1);
        self.pruned_below = largest + 1;
        tracing::trace!(below = self.pruned_below, "pruned acknowledged packet numbers");
    }
}
