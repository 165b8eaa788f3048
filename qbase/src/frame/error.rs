use thiserror::Error;

use super::FrameType;
use crate::{
    epoch::Epoch,
    error::{ErrorKind, QuicError},
    varint::VarInt,
};

/// Parse errors when decoding frames.
///
/// [`Error::InvalidType`] is an unknown leading type, every other variant
/// is a malformed frame. All of them are fatal to the connection.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum Error {
    #[error("A packet containing no frames")]
    NoFrames,
    #[error("Incomplete frame type: {0}")]
    IncompleteType(String),
    #[error("Invalid frame type from {0}")]
    InvalidType(VarInt),
    #[error("Wrong frame type {0:?} in {1} epoch")]
    WrongType(FrameType, Epoch),
    #[error("Incomplete frame {0:?}: {1}")]
    IncompleteFrame(FrameType, String),
    #[error("Error occurred when parsing frame {0:?}: {1}")]
    ParseError(FrameType, String),
}

impl Error {
    /// Whether the frame bytes were truncated or invalid, as opposed to an
    /// unknown frame type.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Error::InvalidType(_))
    }
}

impl From<Error> for QuicError {
    fn from(e: Error) -> Self {
        tracing::error!("   Cause by: parse frame error {e}");
        match e {
            Error::NoFrames => {
                Self::with_default_fty(ErrorKind::ProtocolViolation, e.to_string())
            }
            Error::IncompleteType(_) | Error::InvalidType(_) => {
                Self::with_default_fty(ErrorKind::FrameEncoding, e.to_string())
            }
            Error::WrongType(fty, _) => {
                Self::new(ErrorKind::ProtocolViolation, fty, e.to_string())
            }
            Error::IncompleteFrame(fty, _) | Error::ParseError(fty, _) => {
                Self::new(ErrorKind::FrameEncoding, fty, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_of_decode_failures() {
        let cases = vec![
            (Error::NoFrames, ErrorKind::ProtocolViolation),
            (
                Error::IncompleteType("test".to_string()),
                ErrorKind::FrameEncoding,
            ),
            (
                Error::InvalidType(VarInt::from_u32(0x1f)),
                ErrorKind::FrameEncoding,
            ),
            (
                Error::WrongType(FrameType::MaxData, Epoch::Initial),
                ErrorKind::ProtocolViolation,
            ),
            (
                Error::IncompleteFrame(FrameType::Ping, "incomplete".to_string()),
                ErrorKind::FrameEncoding,
            ),
            (
                Error::ParseError(FrameType::Ping, "parse error".to_string()),
                ErrorKind::FrameEncoding,
            ),
        ];

        for (error, expected_kind) in cases {
            let error: QuicError = error.into();
            assert_eq!(error.kind(), expected_kind);
        }
    }

    #[test]
    fn test_error_display() {
        let error = Error::NoFrames;
        assert_eq!(error.to_string(), "A packet containing no frames");

        let error = Error::IncompleteType("test".to_string());
        assert_eq!(error.to_string(), "Incomplete frame type: test");

        let error = Error::InvalidType(VarInt::from_u32(0x1f));
        assert_eq!(error.to_string(), "Invalid frame type from 31");
        assert!(!error.is_malformed());

        let error = Error::WrongType(FrameType::MaxData, Epoch::Handshake);
        assert_eq!(error.to_string(), "Wrong frame type MaxData in handshake epoch");
    }
}
