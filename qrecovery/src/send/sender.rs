use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use qbase::{
    error::Error,
    flow::SendWindow,
    frame::{ResetStreamError, ResetStreamFrame, StreamDataBlockedFrame, StreamFrame},
    sid::StreamId,
    varint::VarInt,
};

use super::sndbuf::SendBuf;
use crate::streams::error::StreamError;

/// States of the sending half of a stream.
///
/// ```text
///        write / finish
///   Ready ──────► Send ──fin sent──► DataSent ──all acked──► DataRecvd
///     │            │                    │
///     └────────────┴────── reset ───────┴──► ResetSent ──acked──► ResetRecvd
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// Accepting writes, nothing sent yet.
    Ready,
    /// Some data sent, more may follow.
    Send,
    /// The frame carrying the final size has been sent.
    DataSent,
    /// Every byte up to the final size was acknowledged.
    DataRecvd,
    /// RESET_STREAM sent, unacknowledged data abandoned.
    ResetSent,
    /// RESET_STREAM acknowledged.
    ResetRecvd,
}

/// The sending half of a stream.
///
/// For the application layer it accepts writes, a graceful finish or a reset.
/// For the protocol layer it produces STREAM frames, and learns from the
/// packet loss detection which of them were acknowledged or lost.
#[derive(Debug)]
pub struct Sender {
    sid: StreamId,
    state: SendState,
    sndbuf: SendBuf,
    window: SendWindow,
    // final size once the application finished writing
    fin: Option<u64>,
    fin_sent: bool,
    fin_acked: bool,
    reset: Option<ResetStreamError>,
    error: Option<Error>,
    writable_waker: Option<Waker>,
}

impl Sender {
    pub fn new(sid: StreamId, max_stream_data: u64, buf_capacity: usize) -> Self {
        Self {
            sid,
            state: SendState::Ready,
            sndbuf: SendBuf::with_capacity(buf_capacity),
            window: SendWindow::new(max_stream_data),
            fin: None,
            fin_sent: false,
            fin_acked: false,
            reset: None,
            error: None,
            writable_waker: None,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.sid
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    /// DataRecvd and ResetRecvd are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SendState::DataRecvd | SendState::ResetRecvd)
    }

    fn check_writable(&self) -> Result<(), StreamError> {
        if let Some(error) = &self.error {
            return Err(StreamError::Connection(error.clone()));
        }
        if let Some(reset) = self.reset {
            return Err(StreamError::Reset(reset));
        }
        if self.fin.is_some() {
            return Err(StreamError::EosSent);
        }
        Ok(())
    }

    /// Write into the send buffer, waiting while it is full.
    pub fn poll_write(
        &mut self,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, StreamError>> {
        self.check_writable()?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let n = self.sndbuf.write(buf);
        if n == 0 {
            self.writable_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        tracing::trace!(sid = %self.sid, n, "written into stream");
        Poll::Ready(Ok(n))
    }

    /// Mark the end of the data, the final size is what was written so far.
    pub fn finish(&mut self) -> Result<(), StreamError> {
        self.check_writable()?;
        self.fin = Some(self.sndbuf.written());
        Ok(())
    }

    /// Abandon the stream, returning the RESET_STREAM frame to send.
    ///
    /// Terminal and already reset streams return `None`.
    pub fn reset(&mut self, app_error_code: VarInt) -> Option<ResetStreamFrame> {
        match self.state {
            SendState::DataRecvd | SendState::ResetSent | SendState::ResetRecvd => return None,
            _ => {}
        }
        let final_size = VarInt::from_u64(self.sndbuf.sent()).unwrap_or(VarInt::MAX);
        let reset = ResetStreamError::new(app_error_code, final_size);
        tracing::debug!(sid = %self.sid, code = app_error_code.into_inner(), "reset sending");
        self.state = SendState::ResetSent;
        self.reset = Some(reset);
        self.wake();
        Some(reset.to_frame(self.sid))
    }

    /// The RESET_STREAM frame was acknowledged.
    pub fn on_reset_acked(&mut self) {
        if self.state == SendState::ResetSent {
            self.state = SendState::ResetRecvd;
        }
    }

    /// The RESET_STREAM frame to send again after it was lost, if still needed.
    pub fn reset_frame(&self) -> Option<ResetStreamFrame> {
        match (self.state, self.reset) {
            (SendState::ResetSent, Some(reset)) => Some(reset.to_frame(self.sid)),
            _ => None,
        }
    }

    /// Raise the flow control limit on MAX_STREAM_DATA.
    pub fn update_window(&mut self, max_stream_data: u64) {
        if self.window.update(max_stream_data) {
            tracing::trace!(sid = %self.sid, max_stream_data, "stream window updated");
        }
    }

    /// Whether something could be picked up, ignoring the connection limit.
    pub fn has_pending(&self) -> bool {
        match self.state {
            SendState::Ready | SendState::Send | SendState::DataSent => {
                self.sndbuf.has_lost()
                    || (self.sndbuf.unsent() > 0 && self.window.credit() > 0)
                    || (self.fin == Some(self.sndbuf.sent()) && !self.fin_sent)
            }
            _ => false,
        }
    }

    /// Pick up a STREAM frame fitting in `capacity` bytes.
    ///
    /// Data never sent is limited by both the stream window and `conn_credit`.
    /// Returns the frame, its data and the number of fresh bytes.
    pub fn pick_up(
        &mut self,
        capacity: usize,
        conn_credit: u64,
    ) -> Option<(StreamFrame, Bytes, u64)> {
        if !matches!(
            self.state,
            SendState::Ready | SendState::Send | SendState::DataSent
        ) {
            return None;
        }
        let max_len = StreamFrame::estimate_max_capacity(capacity, self.sid, self.sndbuf.written())
            .unwrap_or(0);
        let flow_limit = self.window.credit().min(conn_credit);
        let (offset, is_fresh, data) = match self.sndbuf.pick_up(max_len, flow_limit) {
            Some(picked) => picked,
            // only the final size is left to report
            None if self.fin == Some(self.sndbuf.sent())
                && !self.fin_sent
                && StreamFrame::estimate_max_capacity(capacity, self.sid, self.sndbuf.sent())
                    .is_some() =>
            {
                (self.sndbuf.sent(), false, Bytes::new())
            }
            None => return None,
        };

        let mut frame = StreamFrame::new(self.sid, offset, data.len());
        if self.fin == Some(frame.range().end) {
            frame.set_fin(true);
            self.fin_sent = true;
            self.state = SendState::DataSent;
        } else if self.state == SendState::Ready {
            self.state = SendState::Send;
        }
        let fresh = if is_fresh { data.len() as u64 } else { 0 };
        self.window.consume(fresh);
        Some((frame, data, fresh))
    }

    /// A STREAM_DATA_BLOCKED frame to send, once per limit.
    pub fn data_blocked(&mut self) -> Option<StreamDataBlockedFrame> {
        if self.sndbuf.unsent() == 0 || self.reset.is_some() {
            return None;
        }
        self.window.blocked().map(|limit| {
            StreamDataBlockedFrame::new(self.sid, VarInt::from_u64(limit).unwrap_or(VarInt::MAX))
        })
    }

    /// A STREAM frame sent was acknowledged.
    pub fn on_data_acked(&mut self, frame: &StreamFrame) {
        if !matches!(self.state, SendState::Send | SendState::DataSent) {
            return;
        }
        self.sndbuf.on_data_acked(&frame.range());
        if frame.is_fin() {
            self.fin_acked = true;
        }
        if self.fin_acked && self.sndbuf.is_all_rcvd() {
            tracing::debug!(sid = %self.sid, "all data received by peer");
            self.state = SendState::DataRecvd;
        }
        self.wake();
    }

    /// A STREAM frame sent may be lost, its data will be sent again.
    pub fn may_loss_data(&mut self, frame: &StreamFrame) {
        if !matches!(self.state, SendState::Send | SendState::DataSent) {
            return;
        }
        self.sndbuf.may_loss_data(&frame.range());
        if frame.is_fin() && !self.fin_acked {
            self.fin_sent = false;
        }
    }

    /// The connection is gone, fail pending and future writes.
    pub fn on_conn_error(&mut self, error: &Error) {
        self.error.get_or_insert_with(|| error.clone());
        self.wake();
    }

    fn wake(&mut self) {
        if let Some(waker) = self.writable_waker.take() {
            waker.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use qbase::{role::Role, sid::Dir};

    use super::*;

    fn sender(window: u64, capacity: usize) -> Sender {
        Sender::new(StreamId::new(Role::Client, Dir::Bi, 0), window, capacity)
    }

    fn write(sender: &mut Sender, data: &[u8]) -> Poll<Result<usize, StreamError>> {
        let mut cx = Context::from_waker(Waker::noop());
        sender.poll_write(&mut cx, data)
    }

    #[test]
    fn test_send_to_data_recvd() {
        let mut sender = sender(100, 100);
        assert_eq!(write(&mut sender, b"hello"), Poll::Ready(Ok(5)));
        assert_eq!(sender.state(), SendState::Ready);
        let (first, data, fresh) = sender.pick_up(10, 100).unwrap();
        assert_eq!(sender.state(), SendState::Send);
        assert!(!first.is_fin());
        assert_eq!(fresh, data.len() as u64);

        sender.finish().unwrap();
        assert_eq!(write(&mut sender, b"!"), Poll::Ready(Err(StreamError::EosSent)));
        let (second, _, _) = sender.pick_up(100, 100).unwrap();
        assert!(second.is_fin());
        assert_eq!(second.range().end, 5);
        assert_eq!(sender.state(), SendState::DataSent);
        assert!(sender.pick_up(100, 100).is_none());

        sender.on_data_acked(&second);
        assert_eq!(sender.state(), SendState::DataSent);
        sender.on_data_acked(&first);
        assert_eq!(sender.state(), SendState::DataRecvd);
        assert!(sender.is_terminal());
    }

    #[test]
    fn test_flow_control_limits_fresh_data() {
        let mut sender = sender(4, 100);
        assert_eq!(write(&mut sender, b"hello world"), Poll::Ready(Ok(11)));
        let (frame, data, _) = sender.pick_up(100, 100).unwrap();
        assert_eq!(frame.len(), 4);
        assert_eq!(&data[..], b"hell");
        assert!(!sender.has_pending());
        assert!(sender.data_blocked().is_some());
        assert!(sender.data_blocked().is_none());

        sender.update_window(2);
        assert!(!sender.has_pending());
        sender.update_window(8);
        let (frame, _, fresh) = sender.pick_up(100, 1).unwrap();
        assert_eq!((frame.offset(), fresh), (4, 1));
    }

    #[test]
    fn test_lost_fin_resent() {
        let mut sender = sender(100, 100);
        sender.finish().unwrap();
        let (frame, data, _) = sender.pick_up(100, 0).unwrap();
        assert!(frame.is_fin() && data.is_empty());
        sender.may_loss_data(&frame);
        assert!(sender.has_pending());
        let (again, _, _) = sender.pick_up(100, 0).unwrap();
        assert_eq!(again, frame);
        sender.on_data_acked(&again);
        assert_eq!(sender.state(), SendState::DataRecvd);
    }

    #[test]
    fn test_reset() {
        let mut sender = sender(100, 100);
        assert_eq!(write(&mut sender, b"abandoned"), Poll::Ready(Ok(9)));
        sender.pick_up(5 + 3, 100).unwrap();
        let reset = sender.reset(VarInt::from_u32(9)).unwrap();
        assert_eq!(reset.app_error_code(), 9);
        assert_eq!(reset.final_size(), sender.sndbuf.sent());
        assert_eq!(sender.state(), SendState::ResetSent);
        assert!(sender.reset(VarInt::from_u32(1)).is_none());
        assert!(matches!(
            write(&mut sender, b"more"),
            Poll::Ready(Err(StreamError::Reset(_)))
        ));
        assert!(!sender.has_pending());
        assert_eq!(sender.reset_frame(), Some(reset));
        sender.on_reset_acked();
        assert_eq!(sender.state(), SendState::ResetRecvd);
        assert_eq!(sender.reset_frame(), None);
    }

    #[test]
    fn test_full_buffer_waits() {
        let mut sender = sender(100, 4);
        assert_eq!(write(&mut sender, b"abcdef"), Poll::Ready(Ok(4)));
        assert!(write(&mut sender, b"ef").is_pending());
        let (frame, _, _) = sender.pick_up(100, 100).unwrap();
        sender.on_data_acked(&frame);
        assert_eq!(write(&mut sender, b"ef"), Poll::Ready(Ok(2)));
    }
}
