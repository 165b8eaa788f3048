//! Loss detection and congestion control.
//!
//! [`CongestionController`] estimates the RTT, declares packets lost by the
//! packet and time thresholds, arms the probe timeout and admits new data
//! within the congestion window of a pluggable [`Algorithm`].

mod algorithm;
mod congestion;
mod packets;
mod rtt;

pub use algorithm::{Algorithm, NewReno};
pub use congestion::{AckOutcome, CongestionController, Timeout};
pub use packets::SentPacket;
pub use rtt::Rtt;
