use std::{borrow::Cow, fmt::Display};

use thiserror::Error;

use crate::{
    frame::{AppCloseFrame, ConnectionCloseFrame, FrameType, QuicCloseFrame},
    varint::VarInt,
};

/// Transport error codes carried by CONNECTION_CLOSE frames of type 0x1c.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    /// An endpoint uses this with CONNECTION_CLOSE to signal that
    /// the connection is being closed abruptly in the absence of any error.
    None,
    /// The endpoint encountered an internal error and cannot continue with the connection.
    Internal,
    ConnectionRefused,
    /// An endpoint received more data than it permitted in its advertised data limits.
    FlowControl,
    /// An endpoint received a frame for a stream identifier that
    /// exceeded its advertised stream limit for the corresponding stream type.
    StreamLimit,
    /// An endpoint received a frame for a stream that was not in a state that permitted that frame.
    StreamState,
    /// An endpoint received a STREAM frame or a RESET_STREAM frame containing a final size
    /// that was lower than the size of stream data that was already received,
    /// or a STREAM frame or a RESET_STREAM frame containing a different final size
    /// to the one already established.
    FinalSize,
    /// An endpoint received a frame that was badly formatted.
    FrameEncoding,
    TransportParameter,
    ConnectionIdLimit,
    /// An endpoint detected an error with protocol compliance
    /// that was not covered by more specific error codes.
    ProtocolViolation,
    InvalidToken,
    /// The application or application protocol caused the connection to be closed.
    Application,
    CryptoBufferExceeded,
    KeyUpdate,
    AeadLimitReached,
    NoViablePath,
    /// The cryptographic handshake failed, with the alert in the low byte.
    Crypto(u8),
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            ErrorKind::None => "No error",
            ErrorKind::Internal => "Implementation error",
            ErrorKind::ConnectionRefused => "Server refuses a connection",
            ErrorKind::FlowControl => "Flow control error",
            ErrorKind::StreamLimit => "Too many streams opened",
            ErrorKind::StreamState => "Frame received in invalid stream state",
            ErrorKind::FinalSize => "Change to final size",
            ErrorKind::FrameEncoding => "Frame encoding error",
            ErrorKind::TransportParameter => "Error in transport parameters",
            ErrorKind::ConnectionIdLimit => "Too many connection IDs received",
            ErrorKind::ProtocolViolation => "Generic protocol violation",
            ErrorKind::InvalidToken => "Invalid Token received",
            ErrorKind::Application => "Application error",
            ErrorKind::CryptoBufferExceeded => "CRYPTO data buffer overflowed",
            ErrorKind::KeyUpdate => "Invalid packet protection update",
            ErrorKind::AeadLimitReached => "Excessive use of packet protection keys",
            ErrorKind::NoViablePath => "No viable network path exists",
            ErrorKind::Crypto(x) => return write!(f, "TLS alert code: {x}"),
        };
        write!(f, "{description}")
    }
}

/// Invalid error kind, carrying the raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid error kind {0}")]
pub struct InvalidErrorKind(u64);

impl TryFrom<VarInt> for ErrorKind {
    type Error = InvalidErrorKind;

    fn try_from(value: VarInt) -> Result<Self, Self::Error> {
        Ok(match value.into_inner() {
            0x00 => ErrorKind::None,
            0x01 => ErrorKind::Internal,
            0x02 => ErrorKind::ConnectionRefused,
            0x03 => ErrorKind::FlowControl,
            0x04 => ErrorKind::StreamLimit,
            0x05 => ErrorKind::StreamState,
            0x06 => ErrorKind::FinalSize,
            0x07 => ErrorKind::FrameEncoding,
            0x08 => ErrorKind::TransportParameter,
            0x09 => ErrorKind::ConnectionIdLimit,
            0x0a => ErrorKind::ProtocolViolation,
            0x0b => ErrorKind::InvalidToken,
            0x0c => ErrorKind::Application,
            0x0d => ErrorKind::CryptoBufferExceeded,
            0x0e => ErrorKind::KeyUpdate,
            0x0f => ErrorKind::AeadLimitReached,
            0x10 => ErrorKind::NoViablePath,
            0x0100..=0x01ff => ErrorKind::Crypto((value.into_inner() & 0xff) as u8),
            other => return Err(InvalidErrorKind(other)),
        })
    }
}

impl From<ErrorKind> for VarInt {
    fn from(value: ErrorKind) -> Self {
        match value {
            ErrorKind::None => VarInt(0x00),
            ErrorKind::Internal => VarInt(0x01),
            ErrorKind::ConnectionRefused => VarInt(0x02),
            ErrorKind::FlowControl => VarInt(0x03),
            ErrorKind::StreamLimit => VarInt(0x04),
            ErrorKind::StreamState => VarInt(0x05),
            ErrorKind::FinalSize => VarInt(0x06),
            ErrorKind::FrameEncoding => VarInt(0x07),
            ErrorKind::TransportParameter => VarInt(0x08),
            ErrorKind::ConnectionIdLimit => VarInt(0x09),
            ErrorKind::ProtocolViolation => VarInt(0x0a),
            ErrorKind::InvalidToken => VarInt(0x0b),
            ErrorKind::Application => VarInt(0x0c),
            ErrorKind::CryptoBufferExceeded => VarInt(0x0d),
            ErrorKind::KeyUpdate => VarInt(0x0e),
            ErrorKind::AeadLimitReached => VarInt(0x0f),
            ErrorKind::NoViablePath => VarInt(0x10),
            ErrorKind::Crypto(x) => VarInt(0x0100 + x as u64),
        }
    }
}

/// Transport error, which closes the connection with a CONNECTION_CLOSE frame of type 0x1c.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} in {frame_type:?}, reason: {reason}")]
pub struct QuicError {
    kind: ErrorKind,
    frame_type: FrameType,
    reason: Cow<'static, str>,
}

impl QuicError {
    /// Create a new error with the given kind, the frame type that caused it, and the reason.
    pub fn new<T: Into<Cow<'static, str>>>(
        kind: ErrorKind,
        frame_type: FrameType,
        reason: T,
    ) -> Self {
        Self {
            kind,
            frame_type,
            reason: reason.into(),
        }
    }

    /// Create a new error with unknown frame type, which is PADDING by default.
    pub fn with_default_fty<T: Into<Cow<'static, str>>>(kind: ErrorKind, reason: T) -> Self {
        Self::new(kind, FrameType::Padding, reason)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Application error, which closes the connection with a CONNECTION_CLOSE frame of type 0x1d.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("application error {error_code}, reason: {reason}")]
pub struct AppError {
    error_code: VarInt,
    reason: Cow<'static, str>,
}

impl AppError {
    pub fn new<T: Into<Cow<'static, str>>>(error_code: VarInt, reason: T) -> Self {
        Self {
            error_code,
            reason: reason.into(),
        }
    }

    pub fn error_code(&self) -> u64 {
        self.error_code.into_inner()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// The error that terminates a connection, either raised by the transport or by the application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Quic(#[from] QuicError),
    #[error(transparent)]
    App(#[from] AppError),
}

impl Error {
    /// Returns the transport error kind, [`ErrorKind::Application`] for application errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Quic(e) => e.kind(),
            Error::App(_) => ErrorKind::Application,
        }
    }
}

impl From<QuicError> for ConnectionCloseFrame {
    fn from(e: QuicError) -> Self {
        Self::Quic(QuicCloseFrame::new(e.kind, e.frame_type, e.reason))
    }
}

impl From<AppError> for ConnectionCloseFrame {
    fn from(e: AppError) -> Self {
        Self::App(AppCloseFrame::new(e.error_code, e.reason))
    }
}

impl From<Error> for ConnectionCloseFrame {
    fn from(e: Error) -> Self {
        match e {
            Error::Quic(e) => e.into(),
            Error::App(e) => e.into(),
        }
    }
}

impl From<ConnectionCloseFrame> for Error {
    fn from(frame: ConnectionCloseFrame) -> Self {
        match frame {
            ConnectionCloseFrame::Quic(frame) => Error::Quic(QuicError::new(
                frame.error_kind(),
                frame.frame_type(),
                frame.reason().to_owned(),
            )),
            ConnectionCloseFrame::App(frame) => Error::App(AppError::new(
                VarInt(frame.error_code()),
                frame.reason().to_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        for code in 0x00..=0x10u32 {
            let kind = ErrorKind::try_from(VarInt::from_u32(code)).unwrap();
            assert_eq!(VarInt::from(kind), VarInt::from_u32(code));
        }
        assert_eq!(
            ErrorKind::try_from(VarInt::from_u32(0x0128)),
            Ok(ErrorKind::Crypto(0x28))
        );
        assert_eq!(
            ErrorKind::try_from(VarInt::from_u32(0x11)),
            Err(InvalidErrorKind(0x11))
        );
    }

    #[test]
    fn test_error_into_close_frame() {
        let error = QuicError::new(ErrorKind::FlowControl, FrameType::MaxData, "too much");
        assert_eq!(error.to_string(), "Flow control error in MaxData, reason: too much");
        let frame: ConnectionCloseFrame = Error::from(error.clone()).into();
        assert_eq!(Error::from(frame), Error::Quic(error));

        let error = AppError::new(VarInt::from_u32(42), "bye");
        let frame: ConnectionCloseFrame = error.clone().into();
        let back = Error::from(frame);
        assert_eq!(back.kind(), ErrorKind::Application);
        assert_eq!(back, Error::App(error));
    }
}
