use std::time::{Duration, Instant};

use qbase::{config::Config, epoch::Epoch, frame::AckFrame};

use crate::{
    algorithm::{Algorithm, NewReno},
    packets::{SentPacket, SentPackets},
    rtt::Rtt,
};

/// Packets newly acknowledged and declared lost by one ACK frame.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AckOutcome {
    pub acked: Vec<u64>,
    pub lost: Vec<u64>,
}

/// What the loss detection timer asks for when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timeout {
    /// Packets of the space declared lost by the time threshold.
    Lost(Epoch, Vec<u64>),
    /// Send one ack-eliciting probe in the space, ignoring the congestion window.
    Probe(Epoch),
}

#[derive(Debug, Default)]
struct Space {
    sent_packets: SentPackets,
    largest_acked: Option<u64>,
    loss_time: Option<Instant>,
    time_of_last_ack_eliciting: Option<Instant>,
    discarded: bool,
}

/// Loss detection and congestion control of one connection, following
/// [Appendix A](https://www.rfc-editor.org/rfc/rfc9002.html#name-loss-recovery-pseudocode)
/// of RFC 9002.
///
/// The controller only tracks packet metadata; the frames of acknowledged or
/// lost packets are looked up by packet number in the sent journal.
#[derive(Debug)]
pub struct CongestionController {
    algorithm: Box<dyn Algorithm>,
    rtt: Rtt,
    packet_threshold: u64,
    spaces: [Space; 3],
    bytes_in_flight: usize,
    pto_count: u32,
    loss_detection_timer: Option<Instant>,
    handshake_confirmed: bool,
}

impl CongestionController {
    /// A controller with the reference [`NewReno`] algorithm.
    pub fn new(config: &Config) -> Self {
        Self::with_algorithm(config, Box::new(NewReno::new(config.max_datagram_size())))
    }

    pub fn with_algorithm(config: &Config, algorithm: Box<dyn Algorithm>) -> Self {
        Self {
            algorithm,
            rtt: Rtt::new(
                config.initial_rtt(),
                config.max_ack_delay(),
                config.time_threshold(),
            ),
            packet_threshold: config.packet_threshold(),
            spaces: Default::default(),
            bytes_in_flight: 0,
            pto_count: 0,
            loss_detection_timer: None,
            handshake_confirmed: false,
        }
    }

    pub fn rtt(&self) -> &Rtt {
        &self.rtt
    }

    /// The peer's max_ack_delay, known from its transport parameters.
    pub fn set_max_ack_delay(&mut self, max_ack_delay: Duration) {
        self.rtt.set_max_ack_delay(max_ack_delay);
    }

    pub fn on_handshake_confirmed(&mut self, now: Instant) {
        self.handshake_confirmed = true;
        self.set_loss_detection_timer(now);
    }

    pub fn bytes_in_flight(&self) -> usize {
        self.bytes_in_flight
    }

    pub fn cwnd(&self) -> usize {
        self.algorithm.cwnd()
    }

    /// Bytes of new in-flight packets the congestion window still admits.
    pub fn send_quota(&self) -> usize {
        self.cwnd().saturating_sub(self.bytes_in_flight)
    }

    pub fn pto_count(&self) -> u32 {
        self.pto_count
    }

    /// One probe timeout in the application space, without backoff.
    pub fn pto_duration(&self) -> Duration {
        self.rtt.pto_base_duration(0) + self.rtt.max_ack_delay()
    }

    /// When [`Self::on_timeout`] has to be called next.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.loss_detection_timer
    }

    /// A.5. On Sending a Packet
    pub fn on_packet_sent(
        &mut self,
        epoch: Epoch,
        pn: u64,
        ack_eliciting: bool,
        in_flight: bool,
        sent_bytes: usize,
        now: Instant,
    ) {
        let space = &mut self.spaces[epoch];
        if space.discarded {
            return;
        }
        let packet = SentPacket {
            pn,
            time_sent: now,
            ack_eliciting,
            in_flight,
            sent_bytes,
        };
        if in_flight {
            if ack_eliciting {
                space.time_of_last_ack_eliciting = Some(now);
            }
            self.bytes_in_flight += sent_bytes;
            self.algorithm.on_packet_sent(&packet);
        }
        space.sent_packets.push(packet);
        self.set_loss_detection_timer(now);
    }

    /// A.7. On Receiving an Acknowledgment
    ///
    /// The frame must already be validated against the packets sent in the space.
    pub fn on_ack_received(&mut self, epoch: Epoch, ack: &AckFrame, now: Instant) -> AckOutcome {
        let space = &mut self.spaces[epoch];
        if space.discarded {
            return AckOutcome::default();
        }
        let largest_acked = ack.largest();
        space.largest_acked = Some(space.largest_acked.map_or(largest_acked, |l| l.max(largest_acked)));

        let newly_acked = ack
            .iter()
            .flat_map(|range| space.sent_packets.remove_range(*range.start(), *range.end()))
            .collect::<Vec<_>>();
        if newly_acked.is_empty() {
            return AckOutcome::default();
        }

        // Only the largest acknowledged being newly acked, along with any
        // ack-eliciting packet, gives an RTT sample.
        let largest = newly_acked.iter().find(|p| p.pn == largest_acked);
        if let Some(largest) = largest
            && newly_acked.iter().any(|p| p.ack_eliciting)
        {
            let latest_rtt = now.saturating_duration_since(largest.time_sent);
            // the peer reports no delay worth subtracting before the application space
            let ack_delay = match epoch {
                Epoch::Data => ack.delay(),
                _ => Duration::ZERO,
            };
            self.rtt.update(latest_rtt, ack_delay, self.handshake_confirmed);
            tracing::trace!(
                %epoch,
                latest = ?latest_rtt,
                smoothed = ?self.rtt.smoothed_rtt(),
                "rtt sample"
            );
        }

        let lost = self.detect_and_remove_lost_packets(epoch, now);
        self.on_packets_lost(epoch, &lost, now);
        for packet in newly_acked.iter().filter(|p| p.in_flight) {
            self.bytes_in_flight -= packet.sent_bytes;
            self.algorithm.on_packet_acked(packet, now);
        }

        self.pto_count = 0;
        self.set_loss_detection_timer(now);
        AckOutcome {
            acked: newly_acked.iter().map(|p| p.pn).collect(),
            lost: lost.iter().map(|p| p.pn).collect(),
        }
    }

    /// A.10. Detecting Lost Packets
    fn detect_and_remove_lost_packets(&mut self, epoch: Epoch, now: Instant) -> Vec<SentPacket> {
        let loss_delay = self.rtt.loss_delay();
        let packet_threshold = self.packet_threshold;
        let space = &mut self.spaces[epoch];
        space.loss_time = None;
        let Some(largest_acked) = space.largest_acked else {
            return Vec::new();
        };

        // Packets sent before this time are deemed lost.
        let lost_send_time = now.checked_sub(loss_delay);
        let mut loss_time: Option<Instant> = None;
        let lost = space.sent_packets.remove_lost(largest_acked, |packet| {
            let too_old = lost_send_time.is_some_and(|t| packet.time_sent <= t);
            if too_old || largest_acked >= packet.pn + packet_threshold {
                return true;
            }
            let time = packet.time_sent + loss_delay;
            loss_time = Some(loss_time.map_or(time, |t| t.min(time)));
            false
        });
        space.loss_time = loss_time;
        lost
    }

    /// A.11. On Packets Lost
    fn on_packets_lost(&mut self, epoch: Epoch, lost: &[SentPacket], now: Instant) {
        if lost.is_empty() {
            return;
        }
        let mut newest_lost = None;
        for packet in lost.iter().filter(|p| p.in_flight) {
            self.bytes_in_flight -= packet.sent_bytes;
            newest_lost = newest_lost.max(Some(packet.time_sent));
        }
        tracing::debug!(%epoch, count = lost.len(), "packets lost");
        if let Some(sent_time) = newest_lost {
            self.algorithm.on_congestion_event(sent_time, now);
        }
    }

    fn earliest_loss_time(&self) -> Option<(Instant, Epoch)> {
        Epoch::iter()
            .filter_map(|&epoch| self.spaces[epoch].loss_time.map(|t| (t, epoch)))
            .min()
    }

    fn no_ack_eliciting_in_flight(&self) -> bool {
        self.spaces
            .iter()
            .all(|space| !space.sent_packets.has_ack_eliciting_in_flight())
    }

    /// A.8. Setting the Loss Detection Timer, GetPtoTimeAndSpace
    fn pto_time_and_space(&self) -> Option<(Instant, Epoch)> {
        let backoff = 1u32 << self.pto_count.min(16);
        let duration = self.rtt.pto_base_duration(self.pto_count);
        Epoch::iter()
            .filter_map(|&epoch| {
                let space = &self.spaces[epoch];
                if !space.sent_packets.has_ack_eliciting_in_flight() {
                    return None;
                }
                let mut duration = duration;
                if epoch == Epoch::Data {
                    duration += self.rtt.max_ack_delay() * backoff;
                }
                space
                    .time_of_last_ack_eliciting
                    .map(|time| (time + duration, epoch))
            })
            .min()
    }

    fn set_loss_detection_timer(&mut self, _now: Instant) {
        if let Some((loss_time, _)) = self.earliest_loss_time() {
            // Time threshold loss detection.
            self.loss_detection_timer = Some(loss_time);
            return;
        }
        if self.no_ack_eliciting_in_flight() {
            self.loss_detection_timer = None;
            return;
        }
        self.loss_detection_timer = self.pto_time_and_space().map(|(time, _)| time);
    }

    /// A.9. On Timeout
    ///
    /// Returns `None` if the timer is not armed or has not expired yet.
    pub fn on_timeout(&mut self, now: Instant) -> Option<Timeout> {
        if self.loss_detection_timer.is_none_or(|timer| timer > now) {
            return None;
        }

        if let Some((_, epoch)) = self.earliest_loss_time() {
            let lost = self.detect_and_remove_lost_packets(epoch, now);
            self.on_packets_lost(epoch, &lost, now);
            self.set_loss_detection_timer(now);
            return Some(Timeout::Lost(epoch, lost.iter().map(|p| p.pn).collect()));
        }

        let Some((_, epoch)) = self.pto_time_and_space() else {
            self.loss_detection_timer = None;
            return None;
        };
        self.pto_count += 1;
        tracing::debug!(%epoch, pto_count = self.pto_count, "probe timeout");
        self.set_loss_detection_timer(now);
        Some(Timeout::Probe(epoch))
    }

    /// A.6. On Receiving 1-RTT Keys, discarding the keys of a space
    ///
    /// Its packets are forgotten, neither acknowledged nor lost.
    pub fn discard_space(&mut self, epoch: Epoch, now: Instant) {
        let space = &mut self.spaces[epoch];
        if space.discarded {
            return;
        }
        let discarded = space
            .sent_packets
            .drain()
            .filter(|p| p.in_flight)
            .map(|p| p.sent_bytes)
            .sum::<usize>();
        *space = Space {
            discarded: true,
            ..Space::default()
        };
        self.bytes_in_flight -= discarded;
        self.pto_count = 0;
        tracing::debug!(%epoch, discarded, "packet number space discarded");
        self.set_loss_detection_timer(now);
    }
}
