use std::collections::BTreeMap;

use bytes::{Buf, Bytes};
use qbase::util::RangeSet;

/// Reassembles out-of-order stream data.
///
/// Segments are kept by offset, bytes already held are never stored twice:
/// of overlapping segments, the bytes which arrived first are kept. Only the
/// contiguous bytes from the read offset can be read.
#[derive(Default, Debug)]
pub struct RecvBuf {
    nread: u64,
    segments: BTreeMap<u64, Bytes>,
    // ranges received above the read offset
    rcvd: RangeSet,
    largest: u64,
}

impl RecvBuf {
    /// Receive `data` at `offset`, returning the number of bytes stored.
    pub fn recv(&mut self, offset: u64, mut data: Bytes) -> usize {
        let end = offset + data.len() as u64;
        self.largest = self.largest.max(end);
        let start = offset.max(self.nread);
        if start >= end {
            return 0;
        }
        data.advance((start - offset) as usize);

        let gaps = self.rcvd.gaps(start..end).collect::<Vec<_>>();
        let mut stored = 0;
        for gap in gaps {
            let from = (gap.start - start) as usize;
            let to = (gap.end - start) as usize;
            self.segments.insert(gap.start, data.slice(from..to));
            stored += to - from;
        }
        self.rcvd.insert(start..end);
        stored
    }

    /// The offset of the next byte to read.
    pub fn nread(&self) -> u64 {
        self.nread
    }

    /// The highest offset received.
    pub fn largest(&self) -> u64 {
        self.largest
    }

    /// Bytes readable right now.
    pub fn available(&self) -> u64 {
        self.rcvd
            .iter()
            .next()
            .filter(|r| r.start == self.nread)
            .map_or(0, |r| r.end - r.start)
    }

    pub fn is_readable(&self) -> bool {
        self.available() > 0
    }

    /// Whether every byte up to `final_size` was received.
    pub fn is_complete(&self, final_size: u64) -> bool {
        self.nread + self.available() >= final_size
    }

    /// Read contiguous bytes into `buf`, returning how many were read.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            let Some(mut entry) = self.segments.first_entry() else {
                break;
            };
            if *entry.key() != self.nread {
                break;
            }
            let segment = entry.get_mut();
            let len = segment.len().min(buf.len() - n);
            buf[n..n + len].copy_from_slice(&segment[..len]);
            segment.advance(len);
            n += len;
            self.nread += len as u64;
            if segment.is_empty() {
                entry.remove();
            } else {
                let rest = entry.remove();
                self.segments.insert(self.nread, rest);
            }
        }
        self.rcvd.remove_below(self.nread);
        n
    }

    /// Drop everything buffered, returning the unread bytes received up to `final_size`.
    pub fn clear(&mut self, final_size: u64) -> u64 {
        let unread = final_size.saturating_sub(self.nread);
        self.segments.clear();
        self.rcvd = RangeSet::new();
        self.nread = self.nread.max(final_size);
        unread
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(buf: &mut RecvBuf) -> Vec<u8> {
        let mut out = vec![0; 64];
        let n = buf.read(&mut out);
        out.truncate(n);
        out
    }

    #[test]
    fn test_out_of_order() {
        let mut buf = RecvBuf::default();
        assert_eq!(buf.recv(10, Bytes::from_static(b"0123456789")), 10);
        assert!(!buf.is_readable());
        assert!(read_all(&mut buf).is_empty());
        assert!(!buf.is_complete(20));

        assert_eq!(buf.recv(0, Bytes::from_static(b"abcdefghij")), 10);
        assert!(buf.is_complete(20));
        assert_eq!(buf.available(), 20);
        assert_eq!(read_all(&mut buf), b"abcdefghij0123456789");
        assert_eq!(buf.nread(), 20);
    }

    #[test]
    fn test_overlap_kept_once() {
        let mut buf = RecvBuf::default();
        buf.recv(2, Bytes::from_static(b"cdef"));
        // overlaps both sides of the held segment
        assert_eq!(buf.recv(0, Bytes::from_static(b"abCDEFgh")), 4);
        assert_eq!(read_all(&mut buf), b"abcdefgh");
        // data already read is dropped
        assert_eq!(buf.recv(4, Bytes::from_static(b"zzzz")), 0);
        assert_eq!(buf.largest(), 8);
    }

    #[test]
    fn test_partial_read() {
        let mut buf = RecvBuf::default();
        buf.recv(0, Bytes::from_static(b"hello world"));
        let mut out = [0; 5];
        assert_eq!(buf.read(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert_eq!(buf.available(), 6);
        assert_eq!(read_all(&mut buf), b" world");
    }

    #[test]
    fn test_clear() {
        let mut buf = RecvBuf::default();
        buf.recv(0, Bytes::from_static(b"abc"));
        buf.recv(5, Bytes::from_static(b"fg"));
        let mut out = [0; 1];
        buf.read(&mut out);
        assert_eq!(buf.clear(10), 9);
        assert!(!buf.is_readable());
        assert_eq!(buf.nread(), 10);
    }
}
