use std::{collections::VecDeque, time::Instant};

/// Metadata of a sent packet, the frames it carried live in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub pn: u64,
    pub time_sent: Instant,
    pub ack_eliciting: bool,
    /// Counted in bytes in flight.
    pub in_flight: bool,
    pub sent_bytes: usize,
}

/// Sent packets of one packet number space, ordered by packet number.
#[derive(Debug, Default)]
pub(crate) struct SentPackets {
    packets: VecDeque<SentPacket>,
    ack_eliciting_in_flight: usize,
}

impl SentPackets {
    pub(crate) fn push(&mut self, packet: SentPacket) {
        debug_assert!(self.packets.back().is_none_or(|last| last.pn < packet.pn));
        if packet.in_flight && packet.ack_eliciting {
            self.ack_eliciting_in_flight += 1;
        }
        self.packets.push_back(packet);
    }

    fn forget(&mut self, packet: &SentPacket) {
        if packet.in_flight && packet.ack_eliciting {
            self.ack_eliciting_in_flight -= 1;
        }
    }

    /// Remove the packets in `start..=end`.
    pub(crate) fn remove_range(&mut self, start: u64, end: u64) -> Vec<SentPacket> {
        let from = self.packets.partition_point(|p| p.pn < start);
        let to = self.packets.partition_point(|p| p.pn <= end);
        let removed = self.packets.drain(from..to).collect::<Vec<_>>();
        removed.iter().for_each(|p| self.forget(p));
        removed
    }

    /// Remove the packets for which `is_lost` holds, among those with a
    /// packet number not above `largest_acked`.
    pub(crate) fn remove_lost(
        &mut self,
        largest_acked: u64,
        mut is_lost: impl FnMut(&SentPacket) -> bool,
    ) -> Vec<SentPacket> {
        let mut lost = Vec::new();
        let mut index = 0;
        while let Some(packet) = self.packets.get(index) {
            if packet.pn > largest_acked {
                break;
            }
            if !is_lost(packet) {
                index += 1;
                continue;
            }
            if let Some(packet) = self.packets.remove(index) {
                self.forget(&packet);
                lost.push(packet);
            }
        }
        lost
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = SentPacket> + '_ {
        self.ack_eliciting_in_flight = 0;
        self.packets.drain(..)
    }

    pub(crate) fn has_ack_eliciting_in_flight(&self) -> bool {
        self.ack_eliciting_in_flight > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packets(now: Instant) -> SentPackets {
        let mut sent = SentPackets::default();
        for pn in 0..6 {
            sent.push(SentPacket {
                pn,
                time_sent: now,
                ack_eliciting: pn % 2 == 0,
                in_flight: true,
                sent_bytes: 100,
            });
        }
        sent
    }

    #[test]
    fn test_remove_range() {
        let mut sent = packets(Instant::now());
        let acked = sent.remove_range(1, 3);
        assert_eq!(acked.iter().map(|p| p.pn).collect::<Vec<_>>(), [1, 2, 3]);
        assert!(sent.remove_range(2, 3).is_empty());
        assert_eq!(sent.remove_range(0, 9).len(), 3);
        assert!(!sent.has_ack_eliciting_in_flight());
    }

    #[test]
    fn test_remove_lost() {
        let mut sent = packets(Instant::now());
        let lost = sent.remove_lost(4, |p| p.pn % 3 == 0);
        assert_eq!(lost.iter().map(|p| p.pn).collect::<Vec<_>>(), [0, 3]);
        assert!(sent.has_ack_eliciting_in_flight());
        assert_eq!(sent.drain().count(), 4);
        assert!(!sent.has_ack_eliciting_in_flight());
    }
}
