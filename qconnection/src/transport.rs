use std::{
    io,
    task::{Context, Poll},
};

use bytes::Bytes;

/// The datagram substrate under a connection.
///
/// Datagrams may be lost, reordered or duplicated; the connection copes
/// with all of it.
pub trait Transport: Send + 'static {
    /// Send one datagram without waiting; a full queue may drop it.
    fn send(&mut self, datagram: Bytes) -> io::Result<()>;

    /// Receive the next datagram, `None` once no more can arrive.
    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Bytes>>;
}
