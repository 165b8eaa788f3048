use std::{fmt, time::Instant};

use crate::packets::SentPacket;

mod new_reno;
pub use new_reno::NewReno;

/// A congestion control algorithm.
///
/// The controller owns loss detection and in-flight accounting, the
/// algorithm only decides how large the congestion window is.
pub trait Algorithm: fmt::Debug + Send {
    /// An in-flight packet was sent.
    fn on_packet_sent(&mut self, _packet: &SentPacket) {}

    /// An in-flight packet was acknowledged.
    fn on_packet_acked(&mut self, packet: &SentPacket, now: Instant);

    /// Packets were declared lost, `sent_time` is the time the newest of
    /// them was sent.
    fn on_congestion_event(&mut self, sent_time: Instant, now: Instant);

    /// The congestion window in bytes.
    fn cwnd(&self) -> usize;
}
