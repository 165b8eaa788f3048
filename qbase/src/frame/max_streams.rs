use crate::{
    sid::{Dir, MAX_STREAMS_LIMIT},
    varint::{VarInt, WriteVarInt, be_varint},
};

/// MAX_STREAMS frame.
///
/// ```text
/// MAX_STREAMS Frame {
///   Type (i) = 0x12..0x13,
///   Maximum Streams (i),
/// }
/// ```
///
/// Informs the peer of the cumulative number of streams of a given type it is permitted to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxStreamsFrame {
    Bi(VarInt),
    Uni(VarInt),
}

const MAX_STREAMS_FRAME_TYPE: u8 = 0x12;

const DIR_BIT: u8 = 0x1;

impl MaxStreamsFrame {
    pub fn with(dir: Dir, max_streams: VarInt) -> Self {
        match dir {
            Dir::Bi => MaxStreamsFrame::Bi(max_streams),
            Dir::Uni => MaxStreamsFrame::Uni(max_streams),
        }
    }

    pub fn dir(&self) -> Dir {
        match self {
            MaxStreamsFrame::Bi(_) => Dir::Bi,
            MaxStreamsFrame::Uni(_) => Dir::Uni,
        }
    }
}

impl super::BeFrame for MaxStreamsFrame {
    fn frame_type(&self) -> super::FrameType {
        super::FrameType::MaxStreams(match self {
            MaxStreamsFrame::Bi(_) => 0,
            MaxStreamsFrame::Uni(_) => 1,
        })
    }

    fn max_encoding_size(&self) -> usize {
        1 + 8
    }

    fn encoding_size(&self) -> usize {
        1 + match self {
            MaxStreamsFrame::Bi(max) => max.encoding_size(),
            MaxStreamsFrame::Uni(max) => max.encoding_size(),
        }
    }
}

/// Return a parser for MAX_STREAMS frame with the given direction,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
///
/// A limit above 2^60 can never be satisfied and is rejected.
pub fn max_streams_frame_with_dir(
    dir: u8,
) -> impl Fn(&[u8]) -> nom::IResult<&[u8], MaxStreamsFrame> {
    move |input: &[u8]| {
        let (remain, max_streams) = be_varint(input)?;
        if max_streams > MAX_STREAMS_LIMIT {
            Err(nom::Err::Error(nom::error::make_error(
                input,
                nom::error::ErrorKind::TooLarge,
            )))
        } else {
            Ok((
                remain,
                if dir & DIR_BIT == Dir::Bi as u8 {
                    MaxStreamsFrame::Bi(max_streams)
                } else {
                    MaxStreamsFrame::Uni(max_streams)
                },
            ))
        }
    }
}

impl<T: bytes::BufMut> super::io::WriteFrame<MaxStreamsFrame> for T {
    fn put_frame(&mut self, frame: &MaxStreamsFrame) {
        match frame {
            MaxStreamsFrame::Bi(max) => {
                self.put_u8(MAX_STREAMS_FRAME_TYPE);
                self.put_varint(max);
            }
            MaxStreamsFrame::Uni(max) => {
                self.put_u8(MAX_STREAMS_FRAME_TYPE | DIR_BIT);
                self.put_varint(max);
            }
        }
    }
}
