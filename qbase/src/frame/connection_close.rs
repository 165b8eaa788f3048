use std::borrow::Cow;

use super::{BeFrame, FrameType};
use crate::{
    error::ErrorKind,
    varint::{VarInt, WriteVarInt, be_varint},
};

/// CONNECTION_CLOSE frame.
///
/// ```text
/// CONNECTION_CLOSE Frame {
///   Type (i) = 0x1c..0x1d,
///   Error Code (i),
///   [Frame Type (i)],
///   Reason Phrase Length (i),
///   Reason Phrase (..),
/// }
/// ```
///
/// Type 0x1c signals transport errors and carries the type of the frame that
/// triggered the error, type 0x1d signals errors of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCloseFrame {
    Quic(QuicCloseFrame),
    App(AppCloseFrame),
}

/// The transport variant of [`ConnectionCloseFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicCloseFrame {
    error_kind: ErrorKind,
    frame_type: FrameType,
    reason: Cow<'static, str>,
}

/// The application variant of [`ConnectionCloseFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCloseFrame {
    error_code: VarInt,
    reason: Cow<'static, str>,
}

const CONNECTION_CLOSE_FRAME_TYPE: u8 = 0x1c;

const QUIC_LAYER: u8 = 0;
const APP_LAYER: u8 = 1;

// Reasons are truncated so that a close frame always fits in one packet.
const MAX_REASON_LEN: usize = 1024;

fn truncate(reason: Cow<'static, str>) -> Cow<'static, str> {
    if reason.len() <= MAX_REASON_LEN {
        return reason;
    }
    let mut end = MAX_REASON_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(reason[..end].to_owned())
}

impl QuicCloseFrame {
    pub fn new<T: Into<Cow<'static, str>>>(
        error_kind: ErrorKind,
        frame_type: FrameType,
        reason: T,
    ) -> Self {
        Self {
            error_kind,
            frame_type,
            reason: truncate(reason.into()),
        }
    }

    pub fn error_kind(&self) -> ErrorKind {
        self.error_kind
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl AppCloseFrame {
    pub fn new<T: Into<Cow<'static, str>>>(error_code: VarInt, reason: T) -> Self {
        Self {
            error_code,
            reason: truncate(reason.into()),
        }
    }

    pub fn error_code(&self) -> u64 {
        self.error_code.into_inner()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl ConnectionCloseFrame {
    pub fn reason(&self) -> &str {
        match self {
            ConnectionCloseFrame::Quic(frame) => frame.reason(),
            ConnectionCloseFrame::App(frame) => frame.reason(),
        }
    }
}

impl BeFrame for ConnectionCloseFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::ConnectionClose(match self {
            ConnectionCloseFrame::Quic(_) => QUIC_LAYER,
            ConnectionCloseFrame::App(_) => APP_LAYER,
        })
    }

    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8 + 2 + self.reason().len()
    }

    fn encoding_size(&self) -> usize {
        let reason_len = self.reason().len();
        let fields = match self {
            ConnectionCloseFrame::Quic(frame) => {
                VarInt::from(frame.error_kind).encoding_size()
                    + VarInt::from(u8::from(frame.frame_type)).encoding_size()
            }
            ConnectionCloseFrame::App(frame) => frame.error_code.encoding_size(),
        };
        1 + fields + VarInt(reason_len as u64).encoding_size() + reason_len
    }
}

fn alt_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::make_error(input, nom::error::ErrorKind::Alt))
}

/// Return a parser for CONNECTION_CLOSE frame at the given layer,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
///
/// Transport close frames with unknown error codes or frame types are rejected.
pub fn connection_close_frame_at_layer(
    layer: u8,
) -> impl Fn(&[u8]) -> nom::IResult<&[u8], ConnectionCloseFrame> {
    move |input: &[u8]| {
        let (remain, error_code) = be_varint(input)?;
        let (remain, frame_type) = if layer == QUIC_LAYER {
            let (remain, frame_type) = be_varint(remain)?;
            let frame_type = u8::try_from(frame_type.into_inner())
                .ok()
                .and_then(|ty| FrameType::try_from(ty).ok())
                .ok_or_else(|| alt_error(input))?;
            (remain, Some(frame_type))
        } else {
            (remain, None)
        };
        let (remain, reason_length) = be_varint(remain)?;
        let reason_length = reason_length.into_inner() as usize;
        if remain.len() < reason_length {
            return Err(nom::Err::Incomplete(nom::Needed::new(
                reason_length - remain.len(),
            )));
        }
        let (reason, remain) = remain.split_at(reason_length);
        let reason = String::from_utf8_lossy(reason).into_owned();
        let frame = match frame_type {
            Some(frame_type) => {
                let kind = ErrorKind::try_from(error_code).map_err(|_| alt_error(input))?;
                ConnectionCloseFrame::Quic(QuicCloseFrame::new(kind, frame_type, reason))
            }
            None => ConnectionCloseFrame::App(AppCloseFrame::new(error_code, reason)),
        };
        Ok((remain, frame))
    }
}

impl<T: bytes::BufMut> super::io::WriteFrame<ConnectionCloseFrame> for T {
    fn put_frame(&mut self, frame: &ConnectionCloseFrame) {
        match frame {
            ConnectionCloseFrame::Quic(frame) => {
                self.put_u8(CONNECTION_CLOSE_FRAME_TYPE | QUIC_LAYER);
                self.put_varint(&frame.error_kind.into());
                self.put_varint(&VarInt::from(u8::from(frame.frame_type)));
            }
            ConnectionCloseFrame::App(frame) => {
                self.put_u8(CONNECTION_CLOSE_FRAME_TYPE | APP_LAYER);
                self.put_varint(&frame.error_code);
            }
        }
        let reason = frame.reason();
        self.put_varint(&VarInt(reason.len() as u64));
        self.put_slice(reason.as_bytes());
    }
}
