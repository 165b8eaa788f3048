//! The packet number space: records of sent and received packets.
use qbase::config::Config;

mod rcvd;
pub use rcvd::*;
mod sent;
pub use sent::*;

/// The bundle of sent packet records and received packet records of one
/// encryption level.
///
/// The generic `T` is the frame type recorded for each sent packet, see
/// [`SentJournal`] and [`RcvdJournal`] for more.
#[derive(Debug)]
pub struct Journal<T> {
    sent: SentJournal<T>,
    rcvd: RcvdJournal,
}

impl<T> Journal<T> {
    /// Create an empty space using the ACK settings of `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            sent: SentJournal::with_capacity(16),
            rcvd: RcvdJournal::new(
                config.ack_range_cap(),
                config.max_ack_delay(),
                config.ack_eliciting_threshold(),
            ),
        }
    }

    pub fn sent(&self) -> &SentJournal<T> {
        &self.sent
    }

    pub fn sent_mut(&mut self) -> &mut SentJournal<T> {
        &mut self.sent
    }

    pub fn rcvd(&self) -> &RcvdJournal {
        &self.rcvd
    }

    pub fn rcvd_mut(&mut self) -> &mut RcvdJournal {
        &mut self.rcvd
    }
}
