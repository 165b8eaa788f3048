use std::io;

use qbase::{error::Error, frame::ResetStreamError};
use thiserror::Error;

/// Errors reported to the application by stream operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The connection terminated, the stream with it.
    #[error(transparent)]
    Connection(#[from] Error),
    /// The peer reset the stream, or we did.
    #[error(transparent)]
    Reset(#[from] ResetStreamError),
    /// The stream is gone, or its handle no longer refers to a live stream.
    #[error("stream closed")]
    Closed,
    /// The peer's limit on concurrent streams is reached.
    #[error("too many streams")]
    TooManyStreams,
    #[error("EOS has been sent")]
    EosSent,
}

impl From<StreamError> for io::Error {
    fn from(value: StreamError) -> Self {
        match value {
            error @ (StreamError::Connection(..) | StreamError::Reset(..)) => {
                io::Error::new(io::ErrorKind::BrokenPipe, error)
            }
            error @ StreamError::Closed => io::Error::new(io::ErrorKind::NotConnected, error),
            error @ StreamError::TooManyStreams => io::Error::new(io::ErrorKind::WouldBlock, error),
            error @ StreamError::EosSent => io::Error::new(io::ErrorKind::Unsupported, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use qbase::{
        error::{ErrorKind, QuicError},
        varint::VarInt,
    };

    use super::*;

    #[test]
    fn test_into_io_error() {
        let reset = ResetStreamError::new(VarInt::from_u32(7), VarInt::from_u32(100));
        let error = io::Error::from(StreamError::from(reset));
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);

        let closed = QuicError::with_default_fty(ErrorKind::Internal, "gone");
        let error = io::Error::from(StreamError::from(Error::from(closed)));
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);

        assert_eq!(
            io::Error::from(StreamError::Closed).kind(),
            io::ErrorKind::NotConnected
        );
        assert_eq!(
            io::Error::from(StreamError::EosSent).kind(),
            io::ErrorKind::Unsupported
        );
    }
}
