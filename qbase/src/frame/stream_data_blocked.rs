use crate::{
    sid::{StreamId, WriteStreamId, be_streamid},
    varint::{VarInt, WriteVarInt, be_varint},
};

/// STREAM_DATA_BLOCKED frame.
///
/// ```text
/// STREAM_DATA_BLOCKED Frame {
///   Type (i) = 0x15,
///   Stream ID (i),
///   Maximum Stream Data (i),
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDataBlockedFrame {
    stream_id: StreamId,
    maximum_stream_data: VarInt,
}

const STREAM_DATA_BLOCKED_FRAME_TYPE: u8 = 0x15;

impl super::BeFrame for StreamDataBlockedFrame {
    fn frame_type(&self) -> super::FrameType {
        super::FrameType::StreamDataBlocked
    }

    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8
    }

    fn encoding_size(&self) -> usize {
        1 + self.stream_id.encoding_size() + self.maximum_stream_data.encoding_size()
    }
}

impl StreamDataBlockedFrame {
    /// Create a new [`StreamDataBlockedFrame`].
    pub fn new(stream_id: StreamId, maximum_stream_data: VarInt) -> Self {
        Self {
            stream_id,
            maximum_stream_data,
        }
    }

    /// Return the stream id of the frame.
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Return the stream-level limit at which blocking occurred.
    pub fn maximum_stream_data(&self) -> u64 {
        self.maximum_stream_data.into_inner()
    }
}

/// Parse a STREAM_DATA_BLOCKED frame from the input buffer,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
pub fn be_stream_data_blocked_frame(input: &[u8]) -> nom::IResult<&[u8], StreamDataBlockedFrame> {
    use nom::{Parser, combinator::map};
    map((be_streamid, be_varint), |(stream_id, maximum_stream_data)| {
        StreamDataBlockedFrame::new(stream_id, maximum_stream_data)
    })
    .parse(input)
}

impl<T: bytes::BufMut> super::io::WriteFrame<StreamDataBlockedFrame> for T {
    fn put_frame(&mut self, frame: &StreamDataBlockedFrame) {
        self.put_u8(STREAM_DATA_BLOCKED_FRAME_TYPE);
        self.put_streamid(&frame.stream_id);
        self.put_varint(&frame.maximum_stream_data);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        STREAM_DATA_BLOCKED_FRAME_TYPE, StreamDataBlockedFrame, be_stream_data_blocked_frame,
    };
    use crate::{frame::io::WriteFrame, varint::VarInt};

    #[test]
    fn test_read_stream_data_blocked_frame() {
        let buf = vec![0x52, 0x34, 0x80, 0, 0x56, 0x78];
        let (input, frame) = be_stream_data_blocked_frame(&buf).unwrap();
        assert!(input.is_empty());
        assert_eq!(
            frame,
            StreamDataBlockedFrame::new(VarInt::from_u32(0x1234).into(), VarInt::from_u32(0x5678))
        );
    }

    #[test]
    fn test_write_stream_data_blocked_frame() {
        let mut buf = Vec::new();
        buf.put_frame(&StreamDataBlockedFrame::new(
            VarInt::from_u32(0x1234).into(),
            VarInt::from_u32(0x5678),
        ));
        assert_eq!(
            buf,
            vec![STREAM_DATA_BLOCKED_FRAME_TYPE, 0x52, 0x34, 0x80, 0, 0x56, 0x78]
        );
    }
}
