use std::{collections::VecDeque, ops::Range};

use bytes::{Buf, Bytes, BytesMut};
use qbase::util::RangeSet;

/// Data to be reliably sent to the peer will first be cached in [`SendBuf`].
///
/// Each write is kept as one [`Bytes`] chunk, a pick that falls within a
/// chunk is a view of it.
///
/// The buffer tracks which bytes were never sent, which were sent and may be
/// lost, and which were acknowledged. Acknowledged bytes at the head are
/// dropped to make room for new writes.
///
/// The transport layer notifies that the data it has sent is confirmed
/// ([`on_data_acked`]) or lost ([`may_loss_data`]), and [`pick_up`]s a piece
/// of data to send: lost data first, then data never sent. Only data never
/// sent counts against flow control, retransmissions are free.
///
/// [`pick_up`]: SendBuf::pick_up
/// [`on_data_acked`]: SendBuf::on_data_acked
/// [`may_loss_data`]: SendBuf::may_loss_data
#[derive(Debug)]
pub struct SendBuf {
    // bytes below are acknowledged and dropped
    offset: u64,
    chunks: VecDeque<Bytes>,
    // buffered bytes, acknowledged ones excluded
    len: usize,
    // bytes below have been sent at least once
    sent: u64,
    lost: RangeSet,
    acked: RangeSet,
    capacity: usize,
}

impl SendBuf {
    /// Create a new [`SendBuf`] buffering at most `capacity` unacknowledged bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            offset: 0,
            chunks: VecDeque::new(),
            len: 0,
            sent: 0,
            lost: RangeSet::new(),
            acked: RangeSet::new(),
            capacity,
        }
    }

    /// Write as much of `data` as fits, returning the number of bytes taken.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        if n > 0 {
            self.chunks.push_back(Bytes::copy_from_slice(&data[..n]));
            self.len += n;
        }
        n
    }

    /// The total length of data written so far.
    pub fn written(&self) -> u64 {
        self.offset + self.len as u64
    }

    /// The highest offset sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Bytes that can still be written.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.len)
    }

    /// Bytes written but never sent.
    pub fn unsent(&self) -> u64 {
        self.written() - self.sent
    }

    /// Whether some lost data waits to be sent again.
    pub fn has_lost(&self) -> bool {
        !self.lost.is_empty()
    }

    /// Return whether all data written has been acknowledged by the peer.
    pub fn is_all_rcvd(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Pick up at most `max_len` bytes to send.
    ///
    /// Lost data is picked first. Data never sent is additionally limited by
    /// `flow_limit`.
    ///
    /// Returns the offset of the data, whether it is fresh, and the data.
    pub fn pick_up(&mut self, max_len: usize, flow_limit: u64) -> Option<(u64, bool, Bytes)> {
        if max_len == 0 {
            return None;
        }
        if let Some(lost) = self.lost.iter().next() {
            let end = lost.end.min(lost.start + max_len as u64);
            self.lost.remove(lost.start..end);
            return Some((lost.start, false, self.slice(lost.start..end)));
        }
        let n = self.unsent().min(flow_limit).min(max_len as u64);
        if n == 0 {
            return None;
        }
        let start = self.sent;
        self.sent += n;
        Some((start, true, self.slice(start..start + n)))
    }

    fn slice(&self, range: Range<u64>) -> Bytes {
        let mut start = (range.start - self.offset) as usize;
        let mut len = (range.end - range.start) as usize;
        let mut chunks = self.chunks.iter();
        let Some(first) = chunks.find(|chunk| {
            let within = start < chunk.len();
            if !within {
                start -= chunk.len();
            }
            within
        }) else {
            return Bytes::new();
        };
        if start + len <= first.len() {
            return first.slice(start..start + len);
        }

        // spans several writes, gather them
        let mut data = BytesMut::with_capacity(len);
        data.extend_from_slice(&first[start..]);
        len -= first.len() - start;
        for chunk in chunks {
            let n = len.min(chunk.len());
            data.extend_from_slice(&chunk[..n]);
            len -= n;
            if len == 0 {
                break;
            }
        }
        data.freeze()
    }

    fn release_below(&mut self, end: u64) {
        while self.offset < end {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            let n = ((end - self.offset) as usize).min(front.len());
            if n == front.len() {
                self.chunks.pop_front();
            } else {
                front.advance(n);
            }
            self.offset += n as u64;
            self.len -= n;
        }
    }

    /// Called when the `range` of data sent is acknowledged by the peer.
    ///
    /// An acknowledged range is no longer lost, even if it was declared so.
    pub fn on_data_acked(&mut self, range: &Range<u64>) {
        let range = range.start.max(self.offset)..range.end.min(self.sent);
        if range.is_empty() {
            return;
        }
        self.lost.remove(range.clone());
        self.acked.insert(range);

        let contiguous = self
            .acked
            .iter()
            .next()
            .filter(|r| r.start <= self.offset)
            .map(|r| r.end);
        if let Some(end) = contiguous {
            self.release_below(end);
            self.acked.remove_below(end);
        }
    }

    /// Called when the `range` of data sent may be lost.
    ///
    /// The parts of it not acknowledged yet will be sent again.
    pub fn may_loss_data(&mut self, range: &Range<u64>) {
        let range = range.start.max(self.offset)..range.end.min(self.sent);
        if range.is_empty() {
            return;
        }
        let gaps = self.acked.gaps(range).collect::<Vec<_>>();
        for gap in gaps {
            self.lost.insert(gap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_within_capacity() {
        let mut buf = SendBuf::with_capacity(8);
        assert_eq!(buf.write(b"hello world"), 8);
        assert_eq!(buf.remaining(), 0);
        assert_eq!(buf.written(), 8);
        assert_eq!(buf.write(b"!"), 0);
    }

    #[test]
    fn test_pick_up_fresh_data() {
        let mut buf = SendBuf::with_capacity(64);
        buf.write(b"hello world");
        assert_eq!(
            buf.pick_up(5, 100),
            Some((0, true, Bytes::from_static(b"hello")))
        );
        // limited by flow control
        assert_eq!(buf.pick_up(100, 2), Some((5, true, Bytes::from_static(b" w"))));
        assert_eq!(buf.pick_up(100, 0), None);
        assert_eq!(buf.unsent(), 4);
        assert_eq!(buf.sent(), 7);
    }

    #[test]
    fn test_lost_data_first() {
        let mut buf = SendBuf::with_capacity(64);
        buf.write(b"hello world");
        buf.pick_up(11, 100);
        buf.may_loss_data(&(2..6));
        assert!(buf.has_lost());
        assert_eq!(
            buf.pick_up(3, 0),
            Some((2, false, Bytes::from_static(b"llo")))
        );
        assert_eq!(buf.pick_up(3, 0), Some((5, false, Bytes::from_static(b" "))));
        assert_eq!(buf.pick_up(3, 0), None);
    }

    #[test]
    fn test_acked_data_released() {
        let mut buf = SendBuf::with_capacity(8);
        buf.write(b"abcdefgh");
        buf.pick_up(8, 100);
        buf.on_data_acked(&(4..8));
        assert_eq!(buf.remaining(), 0);
        // a spurious loss of acknowledged data is not resent
        buf.may_loss_data(&(2..8));
        assert_eq!(buf.pick_up(8, 0), Some((2, false, Bytes::from_static(b"cd"))));
        buf.on_data_acked(&(0..4));
        assert!(buf.is_all_rcvd());
        assert_eq!(buf.remaining(), 8);
        assert_eq!(buf.write(b"ijk"), 3);
        assert_eq!(buf.pick_up(8, 100), Some((8, true, Bytes::from_static(b"ijk"))));
    }

    #[test]
    fn test_ack_clears_lost() {
        let mut buf = SendBuf::with_capacity(16);
        buf.write(b"0123456789");
        buf.pick_up(10, 100);
        buf.may_loss_data(&(0..10));
        // the retransmission was not needed after all
        buf.on_data_acked(&(0..10));
        assert!(!buf.has_lost());
        assert_eq!(buf.pick_up(10, 100), None);
    }

    #[test]
    fn test_pick_up_across_writes() {
        let mut buf = SendBuf::with_capacity(64);
        buf.write(b"hello");
        buf.write(b" ");
        buf.write(b"world");
        assert_eq!(
            buf.pick_up(8, 100),
            Some((0, true, Bytes::from_static(b"hello wo")))
        );
        buf.on_data_acked(&(0..3));
        assert_eq!(buf.remaining(), 64 - 8);
        buf.may_loss_data(&(0..8));
        assert_eq!(buf.pick_up(2, 0), Some((3, false, Bytes::from_static(b"lo"))));
        assert_eq!(buf.pick_up(8, 0), Some((5, false, Bytes::from_static(b" wo"))));
        assert_eq!(buf.pick_up(8, 100), Some((8, true, Bytes::from_static(b"rld"))));
    }

    #[test]
    fn test_pick_up_within_write_shares_buffer() {
        let mut buf = SendBuf::with_capacity(64);
        buf.write(b"0123456789");
        let (_, _, head) = buf.pick_up(4, 100).unwrap();
        let (_, _, tail) = buf.pick_up(6, 100).unwrap();
        // views of one allocation
        assert_eq!(head.as_ptr().wrapping_add(4), tail.as_ptr());
        assert_eq!(&tail[..], b"456789");
    }
}
