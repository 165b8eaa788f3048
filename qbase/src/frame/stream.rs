use std::ops::Range;

use super::{BeFrame, FrameType};
use crate::{
    sid::{StreamId, WriteStreamId, be_streamid},
    varint::{VARINT_MAX, VarInt, WriteVarInt, be_varint},
};

/// STREAM frame.
///
/// ```text
/// STREAM Frame {
///   Type (i) = 0x08..0x0f,
///   Stream ID (i),
///   [Offset (i)],
///   [Length (i)],
///   Stream Data (..),
/// }
/// ```
///
/// - OFF bit: 0x04
/// - LEN bit: 0x02
/// - FIN bit: 0x01
///
/// The frame only describes the data, which travels next to it.
/// Frames built locally always carry the length, so several STREAM frames
/// can share one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    id: StreamId,
    offset: VarInt,
    length: usize,
    flag: u8,
}

const STREAM_FRAME_TYPE: u8 = 0x08;

const OFF_BIT: u8 = 0x04;
const LEN_BIT: u8 = 0x02;
const FIN_BIT: u8 = 0x01;

/// The maximum size of a STREAM frame header, without data.
pub const STREAM_FRAME_MAX_ENCODING_SIZE: usize = 1 + 8 + 8 + 8;

impl BeFrame for StreamFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::Stream(self.flag)
    }

    fn max_encoding_size(&self) -> usize {
        STREAM_FRAME_MAX_ENCODING_SIZE + self.length
    }

    fn encoding_size(&self) -> usize {
        1 + self.id.encoding_size()
            + if self.flag & OFF_BIT != 0 {
                self.offset.encoding_size()
            } else {
                0
            }
            + if self.flag & LEN_BIT != 0 {
                VarInt(self.length as u64).encoding_size()
            } else {
                0
            }
            + self.length
    }
}

impl StreamFrame {
    /// Create a new [`StreamFrame`] describing `length` bytes at `offset` of stream `id`.
    pub fn new(id: StreamId, offset: u64, length: usize) -> Self {
        assert!(offset + length as u64 <= VARINT_MAX);
        let mut flag = LEN_BIT;
        if offset != 0 {
            flag |= OFF_BIT;
        }
        Self {
            id,
            offset: VarInt(offset),
            length,
            flag,
        }
    }

    /// Return the stream id of the frame.
    pub fn stream_id(&self) -> StreamId {
        self.id
    }

    /// Return the offset of the data in the stream.
    pub fn offset(&self) -> u64 {
        self.offset.into_inner()
    }

    /// Return the length of the data.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Return whether the frame ends the stream.
    pub fn is_fin(&self) -> bool {
        self.flag & FIN_BIT != 0
    }

    /// Return the range of the data in the stream.
    pub fn range(&self) -> Range<u64> {
        self.offset.into_inner()..self.offset.into_inner() + self.length as u64
    }

    /// Mark the frame as the last one of the stream.
    pub fn set_fin(&mut self, is_fin: bool) {
        if is_fin {
            self.flag |= FIN_BIT;
        } else {
            self.flag &= !FIN_BIT;
        }
    }

    /// Estimate how many data bytes fit in `capacity` for a frame of stream `sid` at `offset`.
    ///
    /// Returns `None` if not even one byte of data fits.
    pub fn estimate_max_capacity(capacity: usize, sid: StreamId, offset: u64) -> Option<usize> {
        assert!(offset <= VARINT_MAX);
        let mut least = 1 + sid.encoding_size();
        if offset != 0 {
            least += VarInt(offset).encoding_size();
        }
        // the data length never exceeds the capacity
        least += VarInt(capacity as u64).encoding_size();
        if capacity <= least {
            None
        } else {
            Some(capacity - least)
        }
    }
}

/// Return a parser for STREAM frames with the given flag bits,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
///
/// Without the LEN bit, the data extends to the end of the packet.
pub fn stream_frame_with_flag(flag: u8) -> impl Fn(&[u8]) -> nom::IResult<&[u8], StreamFrame> {
    move |input: &[u8]| {
        let (remain, id) = be_streamid(input)?;
        let (remain, offset) = if flag & OFF_BIT != 0 {
            be_varint(remain)?
        } else {
            (remain, VarInt::default())
        };
        let (remain, length) = if flag & LEN_BIT != 0 {
            let (remain, length) = be_varint(remain)?;
            (remain, length.into_inner() as usize)
        } else {
            (remain, remain.len())
        };
        if offset.into_inner() + length as u64 > VARINT_MAX {
            return Err(nom::Err::Error(nom::error::make_error(
                input,
                nom::error::ErrorKind::TooLarge,
            )));
        }
        Ok((
            remain,
            StreamFrame {
                id,
                offset,
                length,
                flag,
            },
        ))
    }
}

/// Write a STREAM frame along with its data.
pub trait WriteStreamFrame {
    fn put_stream_frame(&mut self, frame: &StreamFrame, data: &[u8]);
}

impl<T: bytes::BufMut> WriteStreamFrame for T {
    fn put_stream_frame(&mut self, frame: &StreamFrame, data: &[u8]) {
        debug_assert_eq!(frame.length, data.len());
        self.put_u8(STREAM_FRAME_TYPE | frame.flag);
        self.put_streamid(&frame.id);
        if frame.flag & OFF_BIT != 0 {
            self.put_varint(&frame.offset);
        }
        if frame.flag & LEN_BIT != 0 {
            self.put_varint(&VarInt(frame.length as u64));
        }
        self.put_slice(data);
    }
}
