use std::{
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};

use bytes::Bytes;
use qbase::{
    error::{Error, ErrorKind, QuicError},
    flow::RecvWindow,
    frame::{
        BeFrame, FrameType, MaxStreamDataFrame, ResetStreamError, ResetStreamFrame, StopSendingFrame,
        StreamFrame,
    },
    sid::StreamId,
    varint::VarInt,
};

use super::rcvbuf::RecvBuf;
use crate::streams::error::StreamError;

/// States of the receiving half of a stream.
///
/// ```text
///   Recv ──fin──► SizeKnown ──all rcvd──► DataRecvd ──all read──► DataRead
///     │              │
///     └──── reset ───┴──► ResetRecvd ──error read──► ResetRead
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    Recv,
    SizeKnown,
    DataRecvd,
    DataRead,
    ResetRecvd,
    ResetRead,
}

/// What a frame changed in the connection level accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accounting {
    /// Bytes beyond the highest offset received before, counted against MAX_DATA.
    pub new_rcvd: u64,
    /// Bytes no longer waiting for the application, returning connection credit.
    pub consumed: u64,
}

/// The receiving half of a stream.
///
/// Received data is reassembled and handed to the application in order.
/// The final size, once known, never changes; the receive window slides as
/// the application reads and the peer is told through MAX_STREAM_DATA.
#[derive(Debug)]
pub struct Recver {
    sid: StreamId,
    state: RecvState,
    rcvbuf: RecvBuf,
    window: RecvWindow,
    final_size: Option<u64>,
    reset: Option<ResetStreamError>,
    stop_sent: bool,
    abandoned: bool,
    error: Option<Error>,
    read_waker: Option<Waker>,
}

impl Recver {
    pub fn new(sid: StreamId, window: u64, max_window: u64) -> Self {
        Self {
            sid,
            state: RecvState::Recv,
            rcvbuf: RecvBuf::default(),
            window: RecvWindow::new(window, max_window),
            final_size: None,
            reset: None,
            stop_sent: false,
            abandoned: false,
            error: None,
            read_waker: None,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.sid
    }

    pub fn state(&self) -> RecvState {
        self.state
    }

    /// DataRead and ResetRead are terminal, and so are DataRecvd and
    /// ResetRecvd once the application abandoned the stream.
    pub fn is_terminal(&self) -> bool {
        match self.state {
            RecvState::DataRead | RecvState::ResetRead => true,
            RecvState::DataRecvd | RecvState::ResetRecvd => self.abandoned,
            _ => false,
        }
    }

    fn final_size_error(&self, frame_type: FrameType, reason: String) -> QuicError {
        tracing::error!("   Cause by: {} {reason}", self.sid);
        QuicError::new(ErrorKind::FinalSize, frame_type, reason)
    }

    /// Receive a STREAM frame and its data.
    pub fn recv_data(
        &mut self,
        frame: &StreamFrame,
        data: Bytes,
    ) -> Result<Accounting, QuicError> {
        let end = frame.range().end;
        if let Some(final_size) = self.final_size {
            if end > final_size || (frame.is_fin() && end != final_size) {
                return Err(self.final_size_error(
                    frame.frame_type(),
                    format!("data ends at {end}, final size is {final_size}"),
                ));
            }
        } else if frame.is_fin() && end < self.rcvd_largest() {
            return Err(self.final_size_error(
                frame.frame_type(),
                format!("final size {end} below data received up to {}", self.rcvd_largest()),
            ));
        }
        if matches!(self.state, RecvState::ResetRecvd | RecvState::ResetRead) {
            return Ok(Accounting::default());
        }

        let new_rcvd = end.saturating_sub(self.rcvd_largest());
        self.window.on_new_rcvd(new_rcvd).map_err(|e| {
            tracing::error!("   Cause by: {} {e}", self.sid);
            QuicError::new(ErrorKind::FlowControl, frame.frame_type(), e.to_string())
        })?;

        if frame.is_fin() && self.final_size.is_none() {
            self.final_size = Some(end);
            self.state = RecvState::SizeKnown;
        }
        let mut consumed = 0;
        if self.state != RecvState::DataRead {
            self.rcvbuf.recv(frame.offset(), data);
        }
        if let Some(final_size) = self.final_size {
            if self.state == RecvState::SizeKnown && self.rcvbuf.is_complete(final_size) {
                tracing::debug!(sid = %self.sid, final_size, "all data received");
                self.state = RecvState::DataRecvd;
                if self.abandoned {
                    consumed = self.rcvbuf.clear(final_size);
                }
            }
        }
        if self.rcvbuf.is_readable() || self.state == RecvState::DataRecvd {
            self.wake();
        }
        Ok(Accounting { new_rcvd, consumed })
    }

    fn rcvd_largest(&self) -> u64 {
        self.window.rcvd()
    }

    /// Receive a RESET_STREAM frame.
    ///
    /// Buffered data is discarded and counted as consumed, as are the bytes
    /// up to the final size that never arrived.
    pub fn recv_reset(&mut self, frame: &ResetStreamFrame) -> Result<Accounting, QuicError> {
        let final_size = frame.final_size();
        if self.final_size.is_some_and(|known| known != final_size) {
            return Err(self.final_size_error(
                frame.frame_type(),
                format!("reset with final size {final_size} changes the known final size"),
            ));
        }
        if final_size < self.rcvd_largest() {
            return Err(self.final_size_error(
                frame.frame_type(),
                format!("reset with final size {final_size} below data received"),
            ));
        }
        if !matches!(self.state, RecvState::Recv | RecvState::SizeKnown) {
            return Ok(Accounting::default());
        }

        let new_rcvd = final_size - self.rcvd_largest();
        self.window.on_new_rcvd(new_rcvd).map_err(|e| {
            tracing::error!("   Cause by: {} {e}", self.sid);
            QuicError::new(ErrorKind::FlowControl, frame.frame_type(), e.to_string())
        })?;
        tracing::debug!(sid = %self.sid, code = frame.app_error_code(), "reset by peer");
        self.final_size = Some(final_size);
        self.reset = Some(ResetStreamError::from(frame));
        self.state = RecvState::ResetRecvd;
        let consumed = self.rcvbuf.clear(final_size);
        self.wake();
        Ok(Accounting { new_rcvd, consumed })
    }

    /// Read data in order, waiting until some is available.
    ///
    /// Returns 0 at the end of the stream. On success, a new limit to
    /// advertise in MAX_STREAM_DATA may come along.
    pub fn poll_read(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
        now: Instant,
        srtt: Duration,
    ) -> Poll<Result<(usize, Option<MaxStreamDataFrame>), StreamError>> {
        if let Some(error) = &self.error {
            return Poll::Ready(Err(StreamError::Connection(error.clone())));
        }
        match self.state {
            RecvState::ResetRecvd | RecvState::ResetRead => {
                self.state = RecvState::ResetRead;
                let reset = self
                    .reset
                    .unwrap_or(ResetStreamError::new(VarInt::default(), VarInt::default()));
                return Poll::Ready(Err(StreamError::Reset(reset)));
            }
            RecvState::DataRead => return Poll::Ready(Ok((0, None))),
            _ => {}
        }
        if buf.is_empty() {
            return Poll::Ready(Ok((0, None)));
        }

        let n = self.rcvbuf.read(buf);
        if n == 0 {
            if self.state == RecvState::DataRecvd {
                self.state = RecvState::DataRead;
                return Poll::Ready(Ok((0, None)));
            }
            self.read_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        if self.state == RecvState::DataRecvd && self.final_size == Some(self.rcvbuf.nread()) {
            self.state = RecvState::DataRead;
        }
        let max_stream_data = match self.state {
            RecvState::Recv => self.window.on_consumed(n as u64, now, srtt).map(|max| {
                MaxStreamDataFrame::new(self.sid, VarInt::from_u64(max).unwrap_or(VarInt::MAX))
            }),
            _ => None,
        };
        Poll::Ready(Ok((n, max_stream_data)))
    }

    /// Ask the peer to stop sending, returning the STOP_SENDING frame to send.
    pub fn stop(&mut self, app_error_code: VarInt) -> Option<StopSendingFrame> {
        if self.stop_sent || !matches!(self.state, RecvState::Recv | RecvState::SizeKnown) {
            return None;
        }
        self.stop_sent = true;
        Some(StopSendingFrame::new(self.sid, app_error_code))
    }

    /// The STOP_SENDING frame to send again after it was lost, if still needed.
    pub fn stop_frame(&self, app_error_code: VarInt) -> Option<StopSendingFrame> {
        (self.stop_sent && matches!(self.state, RecvState::Recv | RecvState::SizeKnown))
            .then(|| StopSendingFrame::new(self.sid, app_error_code))
    }

    /// The application will not read anymore.
    ///
    /// Buffered data is dropped and returned as consumed; a STOP_SENDING frame
    /// is returned if the peer may still be sending.
    pub fn abandon(&mut self) -> (u64, Option<StopSendingFrame>) {
        self.abandoned = true;
        let consumed = match self.state {
            RecvState::DataRecvd => self.rcvbuf.clear(self.final_size.unwrap_or(0)),
            _ => 0,
        };
        (consumed, self.stop(VarInt::default()))
    }

    /// The current limit, to send again after a MAX_STREAM_DATA was lost.
    pub fn max_stream_data_frame(&self) -> Option<MaxStreamDataFrame> {
        (self.state == RecvState::Recv).then(|| {
            MaxStreamDataFrame::new(
                self.sid,
                VarInt::from_u64(self.window.limit()).unwrap_or(VarInt::MAX),
            )
        })
    }

    /// The peer reported being blocked by our limit.
    pub fn recv_data_blocked(&self, limit: u64) {
        tracing::debug!(sid = %self.sid, limit, current = self.window.limit(), "peer is blocked by stream flow control");
    }

    /// The connection is gone, fail pending and future reads.
    pub fn on_conn_error(&mut self, error: &Error) {
        self.error.get_or_insert_with(|| error.clone());
        self.wake();
    }

    fn wake(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }
}
