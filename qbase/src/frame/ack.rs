use std::{ops::RangeInclusive, time::Duration};

use crate::varint::{VarInt, WriteVarInt, be_varint};

/// ACK frame.
///
/// ```text
/// ACK Frame {
///   Type (i) = 0x02..0x03,
///   Largest Acknowledged (i),
///   ACK Delay (i),
///   ACK Range Count (i),
///   First ACK Range (i),
///   ACK Range (..) ...,
///   [ECN Counts (..)],
/// }
/// ```
///
/// Ranges are described newest first: the first range ends at the largest
/// acknowledged packet number, every following range is described by the gap
/// of unacknowledged packets before it and its own length, both minus one.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AckFrame {
    largest: VarInt,
    delay: VarInt,
    first_range: VarInt,
    ranges: Vec<(VarInt, VarInt)>,
    ecn: Option<EcnCounts>,
}

const ACK_FRAME_TYPE: u8 = 0x02;

const ECN_OPT: u8 = 0x1;

/// The ack delay is encoded in units of 2^3 microseconds.
pub const ACK_DELAY_EXPONENT: u8 = 3;

impl super::BeFrame for AckFrame {
    fn frame_type(&self) -> super::FrameType {
        super::FrameType::Ack(if self.ecn.is_some() { 1 } else { 0 })
    }

    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8 + 8 + 8 + self.ranges.len() * 16 + if self.ecn.is_some() { 24 } else { 0 }
    }

    fn encoding_size(&self) -> usize {
        1 + self.largest.encoding_size()
            + self.delay.encoding_size()
            + VarInt(self.ranges.len() as u64).encoding_size()
            + self.first_range.encoding_size()
            + self
                .ranges
                .iter()
                .map(|(gap, range)| gap.encoding_size() + range.encoding_size())
                .sum::<usize>()
            + self.ecn.as_ref().map_or(0, EcnCounts::encoding_size)
    }
}

impl AckFrame {
    /// Create a new [`AckFrame`].
    ///
    /// The `ranges` are the alternating gaps and ranges following the first range,
    /// they must describe packet numbers that do not underflow.
    pub fn new(
        largest: VarInt,
        delay: VarInt,
        first_range: VarInt,
        ranges: Vec<(VarInt, VarInt)>,
        ecn: Option<EcnCounts>,
    ) -> Self {
        Self {
            largest,
            delay,
            first_range,
            ranges,
            ecn,
        }
    }

    /// Build an [`AckFrame`] from ranges of packet numbers, ordered newest first
    /// and not adjacent to each other.
    ///
    /// Returns `None` if `ranges` is empty.
    pub fn from_ranges<'r>(
        mut ranges: impl Iterator<Item = &'r RangeInclusive<u64>>,
        delay: Duration,
        ecn: Option<EcnCounts>,
    ) -> Option<Self> {
        let first = ranges.next()?;
        let mut smallest = *first.start();
        let mut rest = Vec::new();
        for range in ranges {
            debug_assert!(*range.end() + 1 < smallest);
            let gap = smallest - *range.end() - 2;
            let len = *range.end() - *range.start();
            rest.push((VarInt(gap), VarInt(len)));
            smallest = *range.start();
        }
        let delay = (delay.as_micros() as u64 >> ACK_DELAY_EXPONENT).min(crate::varint::VARINT_MAX);
        Some(Self {
            largest: VarInt(*first.end()),
            delay: VarInt(delay),
            first_range: VarInt(*first.end() - *first.start()),
            ranges: rest,
            ecn,
        })
    }

    /// Return the largest acknowledged packet number.
    pub fn largest(&self) -> u64 {
        self.largest.into_inner()
    }

    /// Return the ack delay reported by the peer.
    pub fn delay(&self) -> Duration {
        Duration::from_micros(self.delay.into_inner() << ACK_DELAY_EXPONENT)
    }

    /// Return the count of packets acknowledged in the first range, minus one.
    pub fn first_range(&self) -> u64 {
        self.first_range.into_inner()
    }

    /// Return the alternating gaps and ranges after the first range.
    pub fn ranges(&self) -> &[(VarInt, VarInt)] {
        &self.ranges
    }

    /// Return the ECN counts, if present.
    pub fn ecn(&self) -> Option<EcnCounts> {
        self.ecn
    }

    /// Iterate over the acknowledged packet number ranges, newest first.
    pub fn iter(&self) -> AckRanges<'_> {
        AckRanges {
            largest: self.largest.into_inner(),
            first_range: Some(self.first_range.into_inner()),
            iter: self.ranges.iter(),
        }
    }
}

impl<'a> IntoIterator for &'a AckFrame {
    type Item = RangeInclusive<u64>;
    type IntoIter = AckRanges<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the packet number ranges of an [`AckFrame`].
#[derive(Debug)]
pub struct AckRanges<'a> {
    largest: u64,
    first_range: Option<u64>,
    iter: std::slice::Iter<'a, (VarInt, VarInt)>,
}

impl Iterator for AckRanges<'_> {
    type Item = RangeInclusive<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(first_range) = self.first_range.take() {
            let largest = self.largest;
            let smallest = largest - first_range;
            self.largest = smallest;
            Some(smallest..=largest)
        } else {
            self.iter.next().map(|(gap, range)| {
                let largest = self.largest - gap.into_inner() - 2;
                let smallest = largest - range.into_inner();
                self.largest = smallest;
                smallest..=largest
            })
        }
    }
}

/// The ECN counts carried by ACK frames of type 0x03.
///
/// ```text
/// ECN Counts {
///   ECT0 Count (i),
///   ECT1 Count (i),
///   ECN-CE Count (i),
/// }
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EcnCounts {
    pub ect0: VarInt,
    pub ect1: VarInt,
    pub ce: VarInt,
}

impl EcnCounts {
    fn encoding_size(&self) -> usize {
        self.ect0.encoding_size() + self.ect1.encoding_size() + self.ce.encoding_size()
    }
}

fn be_ecn_counts(input: &[u8]) -> nom::IResult<&[u8], EcnCounts> {
    use nom::{Parser, combinator::map};
    map((be_varint, be_varint, be_varint), |(ect0, ect1, ce)| {
        EcnCounts { ect0, ect1, ce }
    })
    .parse(input)
}

fn verify_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::make_error(input, nom::error::ErrorKind::Verify))
}

/// Return a parser for ACK frames with the ECN flag,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
///
/// Ranges that would describe negative packet numbers are rejected.
pub fn ack_frame_with_flag(ecn_flag: u8) -> impl Fn(&[u8]) -> nom::IResult<&[u8], AckFrame> {
    use nom::Parser;
    move |input: &[u8]| {
        let (mut remain, (largest, delay, count, first_range)) =
            (be_varint, be_varint, be_varint, be_varint).parse(input)?;
        if first_range > largest.into_inner() {
            return Err(verify_error(input));
        }
        let mut smallest = largest.into_inner() - first_range.into_inner();
        let mut ranges = Vec::new();
        for _ in 0..count.into_inner() {
            let (i, (gap, range)) = (be_varint, be_varint).parse(remain)?;
            let Some(next_largest) = smallest.checked_sub(gap.into_inner() + 2) else {
                return Err(verify_error(input));
            };
            let Some(next_smallest) = next_largest.checked_sub(range.into_inner()) else {
                return Err(verify_error(input));
            };
            smallest = next_smallest;
            ranges.push((gap, range));
            remain = i;
        }

        let ecn = if ecn_flag & ECN_OPT != 0 {
            let (i, ecn) = be_ecn_counts(remain)?;
            remain = i;
            Some(ecn)
        } else {
            None
        };

        Ok((
            remain,
            AckFrame {
                largest,
                delay,
                first_range,
                ranges,
                ecn,
            },
        ))
    }
}

impl<T: bytes::BufMut> super::io::WriteFrame<AckFrame> for T {
    fn put_frame(&mut self, frame: &AckFrame) {
        let mut frame_type = ACK_FRAME_TYPE;
        if frame.ecn.is_some() {
            frame_type |= ECN_OPT;
        }
        self.put_u8(frame_type);
        self.put_varint(&frame.largest);
        self.put_varint(&frame.delay);
        self.put_varint(&VarInt(frame.ranges.len() as u64));
        self.put_varint(&frame.first_range);
        for (gap, ack) in &frame.ranges {
            self.put_varint(gap);
            self.put_varint(ack);
        }
        if let Some(ecn) = &frame.ecn {
            self.put_varint(&ecn.ect0);
            self.put_varint(&ecn.ect1);
            self.put_varint(&ecn.ce);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ACK_FRAME_TYPE, AckFrame, EcnCounts, ack_frame_with_flag, be_ecn_counts};
    use crate::{
        frame::{BeFrame, FrameType, io::WriteFrame},
        varint::VarInt,
    };

    #[test]
    fn test_read_ecn_count() {
        let input = vec![0x52, 0x34, 0x52, 0x34, 0x52, 0x34];
        let (input, ecn) = be_ecn_counts(&input).unwrap();
        assert!(input.is_empty());
        assert_eq!(
            ecn,
            EcnCounts {
                ect0: VarInt(0x1234),
                ect1: VarInt(0x1234),
                ce: VarInt(0x1234),
            }
        );
    }

    #[test]
    fn test_read_ack_frame() {
        let input = vec![0x52, 0x34, 0x52, 0x34, 0x01, 0x52, 0x30, 3, 20];
        let (input, ack_frame) = ack_frame_with_flag(0)(&input).unwrap();
        assert!(input.is_empty());
        assert_eq!(
            ack_frame,
            AckFrame::new(
                VarInt(0x1234),
                VarInt(0x1234),
                VarInt(0x1230),
                vec![(VarInt(3), VarInt(20))],
                None
            )
        );
    }

    #[test]
    fn test_read_malformed_ack_frame() {
        // first range larger than the largest acknowledged
        let input = vec![0x05, 0x00, 0x00, 0x06];
        assert!(ack_frame_with_flag(0)(&input).is_err());
        // gap underflows the packet number space
        let input = vec![0x05, 0x00, 0x01, 0x01, 0x03, 0x00];
        assert!(ack_frame_with_flag(0)(&input).is_err());
        // truncated
        let input = vec![0x05, 0x00, 0x01, 0x01];
        assert!(matches!(
            ack_frame_with_flag(0)(&input),
            Err(nom::Err::Incomplete(_))
        ));
    }

    #[test]
    fn test_write_ack_frame() {
        let mut buf = Vec::new();
        let frame = AckFrame::new(
            VarInt(0x1234),
            VarInt(0x1234),
            VarInt(0x1230),
            vec![(VarInt(3), VarInt(20))],
            None,
        );
        buf.put_frame(&frame);
        assert_eq!(frame.encoding_size(), buf.len());
        assert_eq!(
            buf,
            vec![ACK_FRAME_TYPE, 0x52, 0x34, 0x52, 0x34, 0x01, 0x52, 0x30, 3, 20]
        );
    }

    #[test]
    fn test_write_ack_frame_with_ecn() {
        let mut buf = Vec::new();
        let ecn = EcnCounts {
            ect0: VarInt(1),
            ect1: VarInt(2),
            ce: VarInt(3),
        };
        let frame = AckFrame::new(VarInt(10), VarInt(0), VarInt(0), vec![], Some(ecn));
        assert_eq!(frame.frame_type(), FrameType::Ack(1));
        buf.put_frame(&frame);
        assert_eq!(buf, vec![0x03, 10, 0, 0, 0, 1, 2, 3]);
        assert_eq!(frame.encoding_size(), buf.len());
        let (remain, parsed) = ack_frame_with_flag(1)(&buf[1..]).unwrap();
        assert!(remain.is_empty());
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_ack_frame_iter() {
        let frame = AckFrame::new(
            VarInt(1000),
            VarInt(0x1234),
            VarInt(0),
            vec![
                (VarInt(0), VarInt(2)),
                (VarInt(4), VarInt(30)),
                (VarInt(7), VarInt(40)),
            ],
            None,
        );
        let mut iter = frame.iter();
        assert_eq!(iter.next(), Some(1000..=1000));
        assert_eq!(iter.next(), Some(996..=998));
        assert_eq!(iter.next(), Some(960..=990));
        assert_eq!(iter.next(), Some(911..=951));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_ack_frame_from_ranges() {
        let ranges = [1000..=1000, 996..=998, 960..=990, 911..=951];
        let frame = AckFrame::from_ranges(ranges.iter(), Duration::from_micros(80), None).unwrap();
        assert_eq!(frame.largest(), 1000);
        assert_eq!(frame.delay(), Duration::from_micros(80));
        assert_eq!(frame.iter().collect::<Vec<_>>(), ranges.to_vec());
        assert!(AckFrame::from_ranges([].iter(), Duration::ZERO, None).is_none());
    }
}
