use std::io;

use qbase::{
    epoch::Epoch,
    error::{Error, ErrorKind, QuicError},
};
use thiserror::Error;

/// Why a connection terminated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// We closed the connection, because of a protocol error or at the
    /// application's request.
    #[error("closed locally: {0}")]
    Local(Error),
    /// The peer sent CONNECTION_CLOSE.
    #[error("closed by peer: {0}")]
    Peer(Error),
    /// Nothing was received for the idle timeout, the connection was
    /// dropped without notifying the peer.
    #[error("idle timeout")]
    IdleTimeout,
}

impl ConnectionError {
    /// The error streams report once the connection is gone.
    pub fn to_error(&self) -> Error {
        match self {
            ConnectionError::Local(error) | ConnectionError::Peer(error) => error.clone(),
            ConnectionError::IdleTimeout => {
                QuicError::with_default_fty(ErrorKind::None, "idle timeout").into()
            }
        }
    }
}

impl From<ConnectionError> for io::Error {
    fn from(error: ConnectionError) -> Self {
        let kind = match error {
            ConnectionError::Local(_) => io::ErrorKind::ConnectionAborted,
            ConnectionError::Peer(_) => io::ErrorKind::ConnectionReset,
            ConnectionError::IdleTimeout => io::ErrorKind::TimedOut,
        };
        io::Error::new(kind, error)
    }
}

/// A packet could not be decrypted; the packet is dropped and the
/// connection carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decrypt {level} packet: {reason}")]
pub struct DecryptionFailure {
    pub level: Epoch,
    pub reason: String,
}

/// A blocking operation gave up at its deadline.
///
/// The operation had no effect; it can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled at its deadline")]
pub struct Cancelled;

impl From<Cancelled> for io::Error {
    fn from(error: Cancelled) -> Self {
        io::Error::new(io::ErrorKind::TimedOut, error)
    }
}
