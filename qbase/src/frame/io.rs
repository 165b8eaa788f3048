use bytes::{Bytes, BytesMut};

use super::{
    ack::ack_frame_with_flag, connection_close::connection_close_frame_at_layer,
    data_blocked::be_data_blocked_frame, max_data::be_max_data_frame,
    max_stream_data::be_max_stream_data_frame, max_streams::max_streams_frame_with_dir,
    reset_stream::be_reset_stream_frame, stop_sending::be_stop_sending_frame,
    stream::stream_frame_with_flag, stream_data_blocked::be_stream_data_blocked_frame,
    streams_blocked::streams_blocked_frame_with_dir, *,
};

/// Parse the body of a frame whose type was already read.
///
/// STREAM frames slice their data out of `raw` instead of copying it.
fn complete_frame(
    frame_type: FrameType,
    raw: Bytes,
) -> impl Fn(&[u8]) -> nom::IResult<&[u8], Frame> {
    use nom::{Parser, combinator::map};
    move |input: &[u8]| match frame_type {
        FrameType::Padding => Ok((input, Frame::Padding(PaddingFrame))),
        FrameType::Ping => Ok((input, Frame::Ping(PingFrame))),
        FrameType::ConnectionClose(layer) => {
            map(connection_close_frame_at_layer(layer), Frame::Close).parse(input)
        }
        FrameType::DataBlocked => map(be_data_blocked_frame, Frame::DataBlocked).parse(input),
        FrameType::MaxData => map(be_max_data_frame, Frame::MaxData).parse(input),
        FrameType::Ack(ecn) => map(ack_frame_with_flag(ecn), Frame::Ack).parse(input),
        FrameType::ResetStream => map(be_reset_stream_frame, |f| {
            Frame::StreamCtl(StreamCtlFrame::ResetStream(f))
        })
        .parse(input),
        FrameType::StopSending => map(be_stop_sending_frame, |f| {
            Frame::StreamCtl(StreamCtlFrame::StopSending(f))
        })
        .parse(input),
        FrameType::MaxStreamData => map(be_max_stream_data_frame, |f| {
            Frame::StreamCtl(StreamCtlFrame::MaxStreamData(f))
        })
        .parse(input),
        FrameType::MaxStreams(dir) => map(max_streams_frame_with_dir(dir), |f| {
            Frame::StreamCtl(StreamCtlFrame::MaxStreams(f))
        })
        .parse(input),
        FrameType::StreamsBlocked(dir) => map(streams_blocked_frame_with_dir(dir), |f| {
            Frame::StreamCtl(StreamCtlFrame::StreamsBlocked(f))
        })
        .parse(input),
        FrameType::StreamDataBlocked => map(be_stream_data_blocked_frame, |f| {
            Frame::StreamCtl(StreamCtlFrame::StreamDataBlocked(f))
        })
        .parse(input),
        FrameType::Stream(flag) => {
            let (input, frame) = stream_frame_with_flag(flag)(input)?;
            let start = raw.len() - input.len();
            let len = frame.len();
            if input.len() < len {
                Err(nom::Err::Incomplete(nom::Needed::new(len - input.len())))
            } else {
                let data = raw.slice(start..start + len);
                Ok((&input[len..], Frame::Stream(frame, data)))
            }
        }
    }
}

/// Parse one frame from the front of `raw`, which is a packet payload of the given epoch.
///
/// Returns the number of bytes consumed, the frame, and whether it is ack-eliciting.
pub fn be_frame(raw: &Bytes, epoch: Epoch) -> Result<(usize, Frame, bool), Error> {
    let input = raw.as_ref();
    let (remain, frame_type) = be_frame_type(input).map_err(|e| match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(needed) => Error::IncompleteType(format!("{needed:?}")),
    })?;
    if !frame_type.belongs_to(epoch) {
        return Err(Error::WrongType(frame_type, epoch));
    }

    let (remain, frame) =
        complete_frame(frame_type, raw.clone())(remain).map_err(|e| match e {
            ne @ nom::Err::Incomplete(_) => Error::IncompleteFrame(frame_type, ne.to_string()),
            // TooLarge in MAX_STREAMS/STREAM, Verify in ACK, Alt in CONNECTION_CLOSE
            nom::Err::Error(ne) | nom::Err::Failure(ne) => {
                Error::ParseError(frame_type, ne.code.description().to_owned())
            }
        })?;
    Ok((
        input.len() - remain.len(),
        frame,
        frame_type.is_ack_eliciting(),
    ))
}

/// Decode exactly one frame from the front of `raw`, returning it with the bytes consumed.
pub fn decode(raw: &Bytes, epoch: Epoch) -> Result<(Frame, usize), Error> {
    let (consumed, frame, _) = be_frame(raw, epoch)?;
    Ok((frame, consumed))
}

/// Encode one frame into a fresh buffer.
pub fn encode(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(frame.encoding_size());
    buf.put_frame(frame);
    buf.freeze()
}

/// Write a frame into a buffer, in the wire format.
pub trait WriteFrame<F> {
    /// Write the frame.
    fn put_frame(&mut self, frame: &F);
}
