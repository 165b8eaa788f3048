//! The application's halves of a stream.
//!
//! A [`Reader`] or [`Writer`] refers to a stream owned by the connection;
//! dropping it releases that half. A dropped [`Writer`] finishes the stream
//! if it was neither finished nor reset, a dropped [`Reader`] asks the peer
//! to stop sending.
use std::{
    future::poll_fn,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use qbase::{sid::StreamId, varint::VarInt};
use qrecovery::streams::{StreamError, StreamKey};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    time::{self, Instant},
};

use crate::{
    connection::{Shared, now},
    error::Cancelled,
};

/// The receiving half of a stream.
#[derive(Debug)]
pub struct Reader {
    shared: Arc<Shared>,
    key: StreamKey,
}

impl Reader {
    pub(crate) fn new(shared: Arc<Shared>, key: StreamKey) -> Self {
        Self { shared, key }
    }

    pub fn stream_id(&self) -> StreamId {
        self.key.stream_id()
    }

    pub fn poll_recv(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize, StreamError>> {
        let now = now();
        self.shared.with_engine(|engine| {
            let srtt = engine.smoothed_rtt();
            engine.streams_mut().poll_read(self.key, cx, buf, now, srtt)
        })
    }

    /// Read the next contiguous bytes, `Ok(0)` once the whole stream was read.
    ///
    /// Fails if the peer reset the stream or the connection terminated.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        poll_fn(|cx| self.poll_recv(cx, buf)).await
    }

    /// [`Reader::read`], giving up at `deadline` with [`io::ErrorKind::TimedOut`].
    pub async fn read_with_deadline(&mut self, buf: &mut [u8], deadline: Instant) -> io::Result<usize> {
        match time::timeout_at(deadline, self.read(buf)).await {
            Ok(read) => Ok(read?),
            Err(_elapsed) => Err(Cancelled.into()),
        }
    }

    /// Ask the peer to stop sending, buffered data is dropped.
    pub fn stop(&mut self, code: VarInt) -> Result<(), StreamError> {
        self.shared
            .with_engine(|engine| engine.streams_mut().stop(self.key, code))
    }
}

impl AsyncRead for Reader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let n = ready!(self.get_mut().poll_recv(cx, buf.initialize_unfilled()))?;
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        let now = now();
        self.shared.with_engine(|engine| {
            let srtt = engine.smoothed_rtt();
            engine.streams_mut().release_reader(self.key, now, srtt);
        });
    }
}

/// The sending half of a stream.
#[derive(Debug)]
pub struct Writer {
    shared: Arc<Shared>,
    key: StreamKey,
}

impl Writer {
    pub(crate) fn new(shared: Arc<Shared>, key: StreamKey) -> Self {
        Self { shared, key }
    }

    pub fn stream_id(&self) -> StreamId {
        self.key.stream_id()
    }

    pub fn poll_send(&mut self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize, StreamError>> {
        self.shared
            .with_engine(|engine| engine.streams_mut().poll_write(self.key, cx, buf))
    }

    /// Buffer some of `buf` for sending, waiting while the send buffer is full.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        poll_fn(|cx| self.poll_send(cx, buf)).await
    }

    /// [`Writer::write`], giving up at `deadline` with [`io::ErrorKind::TimedOut`].
    pub async fn write_with_deadline(&mut self, buf: &[u8], deadline: Instant) -> io::Result<usize> {
        match time::timeout_at(deadline, self.write(buf)).await {
            Ok(written) => Ok(written?),
            Err(_elapsed) => Err(Cancelled.into()),
        }
    }

    /// No more data follows, the peer sees the end of the stream.
    pub fn finish(&mut self) -> Result<(), StreamError> {
        self.shared
            .with_engine(|engine| engine.streams_mut().finish(self.key))
    }

    /// Abandon the stream, the peer's reads fail with `code`.
    pub fn reset(&mut self, code: VarInt) -> Result<(), StreamError> {
        self.shared
            .with_engine(|engine| engine.streams_mut().reset(self.key, code))
    }
}

impl AsyncWrite for Writer {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.get_mut().poll_send(cx, buf).map_err(io::Error::from)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().finish() {
            Ok(()) | Err(StreamError::EosSent) => Poll::Ready(Ok(())),
            Err(error) => Poll::Ready(Err(error.into())),
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.shared
            .with_engine(|engine| engine.streams_mut().release_writer(self.key));
    }
}

/// A bidirectional stream, both halves in one.
#[derive(Debug)]
pub struct Stream {
    reader: Reader,
    writer: Writer,
}

impl Stream {
    pub(crate) fn new(shared: &Arc<Shared>, key: StreamKey) -> Self {
        Self {
            reader: Reader::new(shared.clone(), key),
            writer: Writer::new(shared.clone(), key),
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.reader.stream_id()
    }

    pub fn split(self) -> (Reader, Writer) {
        (self.reader, self.writer)
    }

    pub fn reader(&mut self) -> &mut Reader {
        &mut self.reader
    }

    pub fn writer(&mut self) -> &mut Writer {
        &mut self.writer
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        self.reader.read(buf).await
    }

    pub async fn read_with_deadline(&mut self, buf: &mut [u8], deadline: Instant) -> io::Result<usize> {
        self.reader.read_with_deadline(buf, deadline).await
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        self.writer.write(buf).await
    }

    pub async fn write_with_deadline(&mut self, buf: &[u8], deadline: Instant) -> io::Result<usize> {
        self.writer.write_with_deadline(buf, deadline).await
    }

    pub fn finish(&mut self) -> Result<(), StreamError> {
        self.writer.finish()
    }

    pub fn reset(&mut self, code: VarInt) -> Result<(), StreamError> {
        self.writer.reset(code)
    }

    pub fn stop(&mut self, code: VarInt) -> Result<(), StreamError> {
        self.reader.stop(code)
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}
