use std::time::{Duration, Instant};

use qbase::{
    epoch::Epoch,
    error::{ErrorKind, QuicError},
    frame::ConnectionCloseFrame,
};

/// Packets received in the closing state before CONNECTION_CLOSE is sent again.
const RESEND_AFTER_PACKETS: usize = 3;
const RESEND_AFTER: Duration = Duration::from_secs(1);

/// Keeps the CONNECTION_CLOSE frame of a closing connection, and decides
/// when it is sent again.
///
/// The frame is sent once on entering the closing state; after that only in
/// response to incoming packets, at most once per three packets or per
/// second.
#[derive(Debug)]
pub struct Terminator {
    ccf: ConnectionCloseFrame,
    rcvd_packets: usize,
    last_sent: Option<Instant>,
    pending: bool,
}

impl Terminator {
    pub fn new(ccf: ConnectionCloseFrame) -> Self {
        Self {
            ccf,
            rcvd_packets: 0,
            last_sent: None,
            pending: true,
        }
    }

    /// The frame to send in a packet of `epoch`.
    ///
    /// Application errors are not revealed before the handshake completes,
    /// the peer sees a transport APPLICATION_ERROR instead.
    pub fn ccf_at(&self, epoch: Epoch) -> ConnectionCloseFrame {
        match &self.ccf {
            ConnectionCloseFrame::App(_) if epoch != Epoch::Data => {
                QuicError::with_default_fty(ErrorKind::Application, "").into()
            }
            ccf => ccf.clone(),
        }
    }

    pub fn on_packet_rcvd(&mut self, now: Instant) {
        self.rcvd_packets += 1;
        if self.rcvd_packets >= RESEND_AFTER_PACKETS
            || self
                .last_sent
                .is_some_and(|last| now.saturating_duration_since(last) > RESEND_AFTER)
        {
            self.pending = true;
        }
    }

    pub fn should_send(&self) -> bool {
        self.pending
    }

    pub fn on_sent(&mut self, now: Instant) {
        self.pending = false;
        self.rcvd_packets = 0;
        self.last_sent = Some(now);
    }
}
