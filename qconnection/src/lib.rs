//! A connection engine multiplexing reliable streams over an unreliable
//! datagram transport.
//!
//! [`RawConnection`] is the engine itself, fed with datagrams and time and
//! polled for datagrams to send. [`Connection`] runs it on a tokio task,
//! over a [`Transport`] and a [`Crypto`] layer, and hands out
//! [`Stream`]s, [`Reader`]s and [`Writer`]s.
//!
//! [`pipe`] links two connections in memory, optionally losing, duplicating
//! and reordering datagrams.
pub mod builder;
mod conn;
mod connection;
pub mod crypto;
mod driver;
pub mod error;
pub mod pipe;
mod space;
pub mod stream;
mod termination;
pub mod transport;

pub use builder::ConnectionBuilder;
pub use conn::{ConnectionStats, RawConnection};
pub use connection::Connection;
pub use crypto::{Crypto, PlainCrypto};
pub use error::{Cancelled, ConnectionError, DecryptionFailure};
pub use stream::{Reader, Stream, Writer};
pub use transport::Transport;

pub mod prelude {
    pub use qbase::{
        config::{Config, Parameters},
        error::{AppError, Error, ErrorKind, QuicError},
        role::Role,
        sid::{Dir, StreamId},
        varint::VarInt,
    };
    pub use qcongestion::{Algorithm, NewReno};
    pub use qrecovery::streams::StreamError;

    pub use crate::{
        Cancelled, Connection, ConnectionError, Reader, Stream, Transport, Writer, crypto::Crypto,
    };
}
