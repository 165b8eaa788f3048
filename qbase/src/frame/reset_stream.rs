use thiserror::Error;

use crate::{
    sid::{StreamId, WriteStreamId, be_streamid},
    varint::{VarInt, WriteVarInt, be_varint},
};

/// RESET_STREAM, type 0x04: stream id, application error code and final
/// size, all varints. The sender gives up on the stream; the receiver
/// drops what it buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetStreamFrame {
    stream_id: StreamId,
    app_error_code: VarInt,
    final_size: VarInt,
}

const RESET_STREAM_FRAME_TYPE: u8 = 0x04;

impl super::BeFrame for ResetStreamFrame {
    fn frame_type(&self) -> super::FrameType {
        super::FrameType::ResetStream
    }

    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8 + 8
    }

    fn encoding_size(&self) -> usize {
        1 + self.stream_id.encoding_size()
            + self.app_error_code.encoding_size()
            + self.final_size.encoding_size()
    }
}

impl ResetStreamFrame {
    pub fn new(stream_id: StreamId, app_error_code: VarInt, final_size: VarInt) -> Self {
        Self {
            stream_id,
            app_error_code,
            final_size,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn app_error_code(&self) -> u64 {
        self.app_error_code.into_inner()
    }

    /// Bytes the stream carried, the receiver checks it against what arrived.
    pub fn final_size(&self) -> u64 {
        self.final_size.into_inner()
    }
}

/// Parse the body of a RESET_STREAM frame, its type already consumed.
pub fn be_reset_stream_frame(input: &[u8]) -> nom::IResult<&[u8], ResetStreamFrame> {
    use nom::Parser;
    let (input, (stream_id, code, final_size)) =
        (be_streamid, be_varint, be_varint).parse(input)?;
    Ok((input, ResetStreamFrame::new(stream_id, code, final_size)))
}

impl<T: bytes::BufMut> super::io::WriteFrame<ResetStreamFrame> for T {
    fn put_frame(&mut self, frame: &ResetStreamFrame) {
        self.put_u8(RESET_STREAM_FRAME_TYPE);
        self.put_streamid(&frame.stream_id);
        self.put_varint(&frame.app_error_code);
        self.put_varint(&frame.final_size);
    }
}

/// Why a stream ended before its data was complete: the code and final
/// size carried by RESET_STREAM, either received or sent.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("stream reset with code {code}, final size {final_size}")]
pub struct ResetStreamError {
    code: VarInt,
    final_size: VarInt,
}

impl ResetStreamError {
    pub fn new(code: VarInt, final_size: VarInt) -> Self {
        Self { code, final_size }
    }

    pub fn error_code(&self) -> u64 {
        self.code.into_inner()
    }

    pub fn final_size(&self) -> u64 {
        self.final_size.into_inner()
    }

    /// The RESET_STREAM frame announcing this reset on `stream_id`.
    pub fn to_frame(self, stream_id: StreamId) -> ResetStreamFrame {
        ResetStreamFrame::new(stream_id, self.code, self.final_size)
    }
}

impl From<&ResetStreamFrame> for ResetStreamError {
    fn from(frame: &ResetStreamFrame) -> Self {
        Self::new(frame.app_error_code, frame.final_size)
    }
}
