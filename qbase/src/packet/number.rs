use std::cmp::max;

use bytes::BufMut;

/// A truncated packet number, as carried on the wire.
///
/// The full packet number is an integer in the range 0 to 2^62 - 1, only its
/// low 1 to 4 bytes are sent; the receiver recovers the rest from the largest
/// packet number it has received.
///
/// See [packet number encoding and decoding](https://www.rfc-editor.org/rfc/rfc9000.html#section-17.1)
/// of [RFC 9000](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PacketNumber {
    U8(u8),
    U16(u16),
    U24(u32),
    U32(u32),
}

/// Write a truncated packet number into a buffer.
pub trait WritePacketNumber {
    fn put_packet_number(&mut self, pn: PacketNumber);
}

impl<T: BufMut> WritePacketNumber for T {
    fn put_packet_number(&mut self, pn: PacketNumber) {
        match pn {
            PacketNumber::U8(x) => self.put_u8(x),
            PacketNumber::U16(x) => self.put_u16(x),
            PacketNumber::U24(x) => {
                self.put_u8((x >> 16) as u8);
                self.put_u16(x as u16);
            }
            PacketNumber::U32(x) => self.put_u32(x),
        }
    }
}

/// Parse a truncated packet number of `pn_len` bytes,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
///
/// ## Example
///
/// ```
/// use qbase::packet::{PacketNumber, take_pn_len};
///
/// let buf = [0x01, 0x00];
/// assert_eq!(
///     (&[][..], PacketNumber::U16(1 << 8)),
///     take_pn_len(2)(&buf).unwrap()
/// );
/// ```
pub fn take_pn_len(pn_len: u8) -> impl Fn(&[u8]) -> nom::IResult<&[u8], PacketNumber> {
    use nom::{
        Parser,
        combinator::map,
        number::complete::{be_u8, be_u16, be_u24, be_u32},
    };
    move |input: &[u8]| match pn_len {
        1 => map(be_u8, PacketNumber::U8).parse(input),
        2 => map(be_u16, PacketNumber::U16).parse(input),
        3 => map(be_u24, PacketNumber::U24).parse(input),
        4 => map(be_u32, PacketNumber::U32).parse(input),
        _ => Err(nom::Err::Error(nom::error::make_error(
            input,
            nom::error::ErrorKind::LengthValue,
        ))),
    }
}

impl PacketNumber {
    /// Truncate `pn` given the largest packet number the peer acknowledged.
    ///
    /// Twice the distance to the largest acknowledged is encoded, and at least
    /// 16 bits, so that delayed packets still decode.
    pub fn encode(pn: u64, largest_acked: Option<u64>) -> Self {
        let unacked = match largest_acked {
            Some(largest) => pn.saturating_sub(largest),
            None => pn + 1,
        };
        let range = max(unacked * 2, (1 << 16) - 1);
        if range < 1 << 16 {
            Self::U16(pn as u16)
        } else if range < 1 << 24 {
            Self::U24(pn as u32 & 0x00ff_ffff)
        } else {
            debug_assert!(range < 1 << 32, "too many packets in flight");
            Self::U32(pn as u32)
        }
    }

    /// The size of the encoding in bytes.
    pub fn size(self) -> usize {
        match self {
            PacketNumber::U8(_) => 1,
            PacketNumber::U16(_) => 2,
            PacketNumber::U24(_) => 3,
            PacketNumber::U32(_) => 4,
        }
    }

    /// Recover the full packet number, `expected` being the largest received plus one.
    ///
    /// See [Appendix A.3](https://www.rfc-editor.org/rfc/rfc9000.html#section-a.3).
    pub fn decode(self, expected: u64) -> u64 {
        let (truncated, nbits) = match self {
            PacketNumber::U8(x) => (u64::from(x), 8),
            PacketNumber::U16(x) => (u64::from(x), 16),
            PacketNumber::U24(x) => (u64::from(x), 24),
            PacketNumber::U32(x) => (u64::from(x), 32),
        };
        let win = 1 << nbits;
        let hwin = win / 2;
        let mask = win - 1;
        // The candidate must land within half a window of the expected number.
        let candidate = (expected & !mask) | truncated;
        if expected.checked_sub(hwin).is_some_and(|x| candidate <= x) {
            candidate + win
        } else if candidate > expected + hwin && candidate > win {
            candidate - win
        } else {
            candidate
        }
    }
}
