use qbase::{
    config::Config,
    epoch::Epoch,
    frame::{ReliableFrame, StreamFrame},
};
use qrecovery::journal::Journal;

/// What a sent packet carried that matters once it is acknowledged or lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentFrame {
    /// An ACK frame, with its largest acknowledged packet number.
    Ack(u64),
    Ping,
    Reliable(ReliableFrame),
    Stream(StreamFrame),
}

/// The packet number space of one encryption level.
#[derive(Debug)]
pub struct Space {
    epoch: Epoch,
    journal: Journal<SentFrame>,
    discarded: bool,
    // an ack-eliciting probe was requested by the probe timeout
    probe: bool,
}

impl Space {
    pub fn new(epoch: Epoch, config: &Config) -> Self {
        Self {
            epoch,
            journal: Journal::new(config),
            discarded: false,
            probe: false,
        }
    }

    pub fn journal(&self) -> &Journal<SentFrame> {
        &self.journal
    }

    pub fn journal_mut(&mut self) -> &mut Journal<SentFrame> {
        &mut self.journal
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    /// Forget the keys of this level, along with every packet in flight.
    pub fn discard(&mut self) -> usize {
        self.discarded = true;
        self.probe = false;
        let dropped = self.journal.sent_mut().drain().len();
        tracing::debug!(epoch = %self.epoch, dropped, "space discarded");
        dropped
    }

    pub fn request_probe(&mut self) {
        self.probe = !self.discarded;
    }

    /// Whether the next packet must carry an ack-eliciting frame, either a
    /// probe or the first packet sent at this level.
    pub fn needs_ping(&self, can_open: bool) -> bool {
        self.probe || (can_open && self.journal.sent().next_pn() == 0)
    }

    pub fn take_probe(&mut self) -> bool {
        std::mem::take(&mut self.probe)
    }
}
