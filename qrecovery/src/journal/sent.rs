use std::time::Instant;

use qbase::{
    error::{ErrorKind, QuicError},
    frame::{AckFrame, BeFrame},
    util::{ExceedLimit, IndexDeque},
    varint::VARINT_MAX,
};

/// A packet in flight: what was sent in it, when, and how large it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord<T> {
    pn: u64,
    sent_time: Instant,
    size: usize,
    frames: Vec<T>,
}

impl<T> SentRecord<T> {
    pub fn pn(&self) -> u64 {
        self.pn
    }

    pub fn sent_time(&self) -> Instant {
        self.sent_time
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The frames carried, in the order they were written.
    pub fn frames(&self) -> &[T] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<T> {
        self.frames
    }
}

/// Records of the packets sent in one packet number space.
///
/// Packet numbers are assigned here, strictly increasing from 0 and never
/// reused. A record leaves the journal once it is acknowledged or declared
/// lost; the frames are handed back so the caller can confirm or resend them.
#[derive(Debug)]
pub struct SentJournal<T> {
    records: IndexDeque<Option<SentRecord<T>>, VARINT_MAX>,
    largest_acked: Option<u64>,
}

impl<T> Default for SentJournal<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<T> SentJournal<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: IndexDeque::with_capacity(capacity),
            largest_acked: None,
        }
    }

    /// The packet number the next sent packet gets.
    pub fn next_pn(&self) -> u64 {
        self.records.largest()
    }

    /// The largest packet number the peer has acknowledged.
    pub fn largest_acked(&self) -> Option<u64> {
        self.largest_acked
    }

    /// Whether some packets are neither acknowledged nor lost.
    pub fn has_outstanding(&self) -> bool {
        self.records.iter_with_idx().any(|(_, r)| r.is_some())
    }

    /// Record the packet just sent, returning the packet number assigned to it.
    pub fn record_sent(
        &mut self,
        frames: Vec<T>,
        size: usize,
        now: Instant,
    ) -> Result<u64, ExceedLimit> {
        let pn = self.records.largest();
        self.records.push_back(Some(SentRecord {
            pn,
            sent_time: now,
            size,
            frames,
        }))
    }

    /// Look at a packet still in flight.
    pub fn get(&self, pn: u64) -> Option<&SentRecord<T>> {
        self.records.get(pn).and_then(Option::as_ref)
    }

    /// Resolve an ACK frame from the peer, returning the records newly acknowledged.
    ///
    /// Packet numbers acknowledged before, or already declared lost, are
    /// ignored. Acknowledging a packet number that was never sent is a
    /// protocol violation.
    pub fn process_ack(&mut self, ack: &AckFrame) -> Result<Vec<SentRecord<T>>, QuicError> {
        if ack.largest() >= self.next_pn() {
            tracing::error!(
                "   Cause by: ack of packet {} which was never sent",
                ack.largest()
            );
            return Err(QuicError::new(
                ErrorKind::ProtocolViolation,
                ack.frame_type(),
                format!("acknowledged packet {} never sent", ack.largest()),
            ));
        }
        self.largest_acked = self.largest_acked.max(Some(ack.largest()));

        let mut newly_acked = Vec::new();
        for range in ack.iter() {
            let start = (*range.start()).max(self.records.offset());
            let end = (*range.end() + 1).min(self.next_pn());
            for pn in start..end {
                if let Some(record) = self.records.get_mut(pn).and_then(Option::take) {
                    newly_acked.push(record);
                }
            }
        }
        self.slide();
        Ok(newly_acked)
    }

    /// Remove a packet declared lost, returning its record.
    pub fn on_pkt_lost(&mut self, pn: u64) -> Option<SentRecord<T>> {
        let record = self.records.get_mut(pn).and_then(Option::take);
        self.slide();
        record
    }

    /// Drop every outstanding record, when the space is discarded.
    pub fn drain(&mut self) -> Vec<SentRecord<T>> {
        let next = self.next_pn();
        self.records.drain_to(next).flatten().collect()
    }

    fn slide(&mut self) {
        while matches!(self.records.front(), Some(None)) {
            self.records.pop_front();
        }
    }
}
