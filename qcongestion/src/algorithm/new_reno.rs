use std::time::Instant;

use crate::{algorithm::Algorithm, packets::SentPacket};

const INFINITE_SSTHRESH: usize = usize::MAX;

/// NewReno congestion control, see
/// [Appendix B](https://www.rfc-editor.org/rfc/rfc9002.html#name-congestion-control-pseudoco)
/// of RFC 9002.
#[derive(Debug)]
pub struct NewReno {
    max_datagram_size: usize,
    congestion_window: usize,
    ssthresh: usize,
    // acked bytes counted toward the next increase in congestion avoidance
    bytes_acked: usize,
    congestion_recovery_start_time: Option<Instant>,
}

impl NewReno {
    /// B.3. Initialization
    pub fn new(max_datagram_size: usize) -> Self {
        NewReno {
            max_datagram_size,
            // The upper bound for the initial window will be
            // min (10*MSS, max (2*MSS, 14600))
            // See https://datatracker.ietf.org/doc/html/rfc6928#autoid-3
            congestion_window: 10 * max_datagram_size,
            ssthresh: INFINITE_SSTHRESH,
            bytes_acked: 0,
            congestion_recovery_start_time: None,
        }
    }

    fn minimum_window(&self) -> usize {
        2 * self.max_datagram_size
    }

    pub fn ssthresh(&self) -> usize {
        self.ssthresh
    }

    /// InCongestionRecovery(sent_time):
    ///   return sent_time <= congestion_recovery_start_time
    fn in_congestion_recovery(&self, sent_time: Instant) -> bool {
        self.congestion_recovery_start_time
            .is_some_and(|recovery_start_time| sent_time <= recovery_start_time)
    }
}

impl Algorithm for NewReno {
    /// B.5. On Packet Acknowledgment
    ///
    /// Slow start grows the window by the acked bytes, congestion avoidance
    /// by one max datagram size per window of acked bytes.
    fn on_packet_acked(&mut self, packet: &SentPacket, _now: Instant) {
        if !packet.in_flight || self.in_congestion_recovery(packet.time_sent) {
            return;
        }
        if self.congestion_window < self.ssthresh {
            self.congestion_window += packet.sent_bytes;
            return;
        }
        self.bytes_acked += packet.sent_bytes;
        if self.bytes_acked >= self.congestion_window {
            self.bytes_acked -= self.congestion_window;
            self.congestion_window += self.max_datagram_size;
        }
    }

    /// B.6. On New Congestion Event
    /// OnCongestionEvent(sent_time):
    ///   // No reaction if already in a recovery period.
    ///   if (InCongestionRecovery(sent_time)):
    ///     return
    ///   // Enter recovery period.
    ///   congestion_recovery_start_time = now()
    ///   ssthresh = congestion_window * kLossReductionFactor
    ///   congestion_window = max(ssthresh, kMinimumWindow)
    fn on_congestion_event(&mut self, sent_time: Instant, now: Instant) {
        if self.in_congestion_recovery(sent_time) {
            return;
        }
        self.congestion_recovery_start_time = Some(now);
        self.congestion_window = (self.congestion_window / 2).max(self.minimum_window());
        self.ssthresh = self.congestion_window;
        self.bytes_acked = 0;
        tracing::debug!(
            cwnd = self.congestion_window,
            ssthresh = self.ssthresh,
            "enter congestion recovery"
        );
    }

    fn cwnd(&self) -> usize {
        self.congestion_window
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const MSS: usize = 1200;

    fn packet(pn: u64, time_sent: Instant) -> SentPacket {
        SentPacket {
            pn,
            time_sent,
            ack_eliciting: true,
            in_flight: true,
            sent_bytes: MSS,
        }
    }

    #[test]
    fn test_slow_start() {
        let now = Instant::now();
        let mut reno = NewReno::new(MSS);
        assert_eq!(reno.cwnd(), 10 * MSS);
        for pn in 0..5 {
            reno.on_packet_acked(&packet(pn, now), now);
        }
        assert_eq!(reno.cwnd(), 15 * MSS);
    }

    #[test]
    fn test_congestion_event_once_per_round() {
        let start = Instant::now();
        let mut reno = NewReno::new(MSS);
        let now = start + Duration::from_millis(100);
        reno.on_congestion_event(start, now);
        assert_eq!(reno.cwnd(), 5 * MSS);
        assert_eq!(reno.ssthresh(), 5 * MSS);

        // sent before recovery started
        reno.on_congestion_event(start + Duration::from_millis(50), now);
        assert_eq!(reno.cwnd(), 5 * MSS);
        // acks of those packets do not grow the window either
        reno.on_packet_acked(&packet(0, start), now);
        assert_eq!(reno.cwnd(), 5 * MSS);

        let later = now + Duration::from_millis(100);
        reno.on_congestion_event(now + Duration::from_millis(1), later);
        assert_eq!(reno.cwnd(), 2 * MSS + MSS / 2);
        reno.on_congestion_event(
            later + Duration::from_millis(1),
            later + Duration::from_millis(10),
        );
        assert_eq!(reno.cwnd(), 2 * MSS);
    }

    #[test]
    fn test_congestion_avoidance() {
        let start = Instant::now();
        let mut reno = NewReno::new(MSS);
        let now = start + Duration::from_millis(10);
        reno.on_congestion_event(start, now);
        assert_eq!(reno.cwnd(), 5 * MSS);

        let sent = now + Duration::from_millis(1);
        for pn in 0..4 {
            reno.on_packet_acked(&packet(pn, sent), sent);
        }
        assert_eq!(reno.cwnd(), 5 * MSS);
        reno.on_packet_acked(&packet(4, sent), sent);
        assert_eq!(reno.cwnd(), 6 * MSS);
    }
}
