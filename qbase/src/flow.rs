use std::time::{Duration, Instant};

use thiserror::Error;

use crate::{
    error::{ErrorKind, QuicError},
    frame::{DataBlockedFrame, FrameType, MaxDataFrame},
    varint::VarInt,
};

/// The sending side of a flow control limit, either of a stream or of the connection.
///
/// The limit only grows: MAX_DATA or MAX_STREAM_DATA frames that lower it
/// are ignored, since they may simply arrive out of order.
#[derive(Debug, Default, Clone)]
pub struct SendWindow {
    sent: u64,
    max: u64,
    blocked_reported: Option<u64>,
}

impl SendWindow {
    pub fn new(initial_max: u64) -> Self {
        Self {
            sent: 0,
            max: initial_max,
            blocked_reported: None,
        }
    }

    /// Total bytes counted against the limit so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn limit(&self) -> u64 {
        self.max
    }

    /// Bytes that may still be sent.
    pub fn credit(&self) -> u64 {
        self.max - self.sent
    }

    /// Raise the limit, returning whether it grew.
    pub fn update(&mut self, max: u64) -> bool {
        if max > self.max {
            self.max = max;
            true
        } else {
            false
        }
    }

    /// Count `n` bytes of new data against the limit.
    pub fn consume(&mut self, n: u64) {
        debug_assert!(n <= self.credit());
        self.sent += n;
    }

    /// Returns the limit to report in a *_BLOCKED frame, once per limit.
    pub fn blocked(&mut self) -> Option<u64> {
        if self.sent == self.max && self.blocked_reported != Some(self.max) {
            self.blocked_reported = Some(self.max);
            Some(self.max)
        } else {
            None
        }
    }
}

/// Data was received beyond the advertised limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Flow control exceed {0} bytes on receiving")]
pub struct Overflow(pub u64);

/// The receiving side of a flow control limit.
///
/// The advertised limit slides forward as the application consumes data.
/// When the peer consumed the window quickly, within two round trips since
/// the last update, the window doubles up to `max_window`.
#[derive(Debug, Clone)]
pub struct RecvWindow {
    rcvd: u64,
    consumed: u64,
    max: u64,
    window: u64,
    max_window: u64,
    last_update: Option<Instant>,
}

impl RecvWindow {
    pub fn new(window: u64, max_window: u64) -> Self {
        Self {
            rcvd: 0,
            consumed: 0,
            max: window,
            window,
            max_window: max_window.max(window),
            last_update: None,
        }
    }

    /// The limit advertised to the peer.
    pub fn limit(&self) -> u64 {
        self.max
    }

    /// Total bytes the peer has used of the limit.
    pub fn rcvd(&self) -> u64 {
        self.rcvd
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Count `n` newly received bytes, failing if they go beyond the limit.
    pub fn on_new_rcvd(&mut self, n: u64) -> Result<(), Overflow> {
        let rcvd = self.rcvd.saturating_add(n);
        if rcvd > self.max {
            return Err(Overflow(rcvd - self.max));
        }
        self.rcvd = rcvd;
        Ok(())
    }

    /// Count `n` bytes consumed by the application.
    ///
    /// Returns a new limit to advertise once less than half of the window is left.
    pub fn on_consumed(&mut self, n: u64, now: Instant, srtt: Duration) -> Option<u64> {
        self.consumed += n;
        debug_assert!(self.consumed <= self.rcvd);
        if self.max - self.consumed >= self.window / 2 {
            return None;
        }
        if let Some(last_update) = self.last_update {
            if now.saturating_duration_since(last_update) < srtt * 2 && self.window < self.max_window
            {
                self.window = (self.window * 2).min(self.max_window);
                tracing::debug!(window = self.window, "auto-tuned receive window");
            }
        }
        self.last_update = Some(now);
        let max = self.consumed + self.window;
        if max > self.max {
            self.max = max;
            Some(max)
        } else {
            None
        }
    }
}

/// Connection level flow control.
///
/// All data sent in STREAM frames counts toward the connection limit as well,
/// see [Section 4.1](https://www.rfc-editor.org/rfc/rfc9000.html#section-4.1)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html).
#[derive(Debug, Clone)]
pub struct FlowController {
    sender: SendWindow,
    recver: RecvWindow,
}

impl FlowController {
    /// `peer_max_data` is the limit the peer advertised, `local_max_data` ours.
    pub fn new(peer_max_data: u64, local_max_data: u64, max_window: u64) -> Self {
        Self {
            sender: SendWindow::new(peer_max_data),
            recver: RecvWindow::new(local_max_data, max_window),
        }
    }

    pub fn sender(&self) -> &SendWindow {
        &self.sender
    }

    pub fn recver(&self) -> &RecvWindow {
        &self.recver
    }

    /// Bytes of new stream data the connection may still send.
    pub fn send_credit(&self) -> u64 {
        self.sender.credit()
    }

    pub fn on_data_sent(&mut self, n: u64) {
        self.sender.consume(n);
    }

    /// Apply the peer's initial limit, which may only raise the current one.
    pub fn set_peer_max_data(&mut self, max_data: u64) {
        self.sender.update(max_data);
    }

    /// Raise the send limit, returning whether it grew.
    pub fn recv_max_data_frame(&mut self, frame: &MaxDataFrame) -> bool {
        self.sender.update(frame.max_data())
    }

    pub fn recv_data_blocked_frame(&self, frame: &DataBlockedFrame) {
        tracing::debug!(limit = frame.limit(), "peer is blocked by connection flow control");
    }

    /// A DATA_BLOCKED frame to send, once per limit.
    pub fn data_blocked(&mut self) -> Option<DataBlockedFrame> {
        self.sender
            .blocked()
            .map(|limit| DataBlockedFrame::new(VarInt::from_u64(limit).unwrap_or(VarInt::MAX)))
    }

    /// Count newly received stream bytes against the connection limit.
    pub fn on_new_rcvd(&mut self, frame_type: FrameType, n: u64) -> Result<(), QuicError> {
        self.recver.on_new_rcvd(n).map_err(|e| {
            tracing::error!("   Cause by: connection {e}");
            QuicError::new(ErrorKind::FlowControl, frame_type, e.to_string())
        })
    }

    /// Count bytes consumed by the application, returning a MAX_DATA frame to send if any.
    pub fn on_consumed(&mut self, n: u64, now: Instant, srtt: Duration) -> Option<MaxDataFrame> {
        self.recver
            .on_consumed(n, now, srtt)
            .map(|max| MaxDataFrame::new(VarInt::from_u64(max).unwrap_or(VarInt::MAX)))
    }

    /// The current MAX_DATA, for retransmitting a lost update.
    pub fn max_data_frame(&self) -> MaxDataFrame {
        MaxDataFrame::new(VarInt::from_u64(self.recver.limit()).unwrap_or(VarInt::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_window_never_shrinks() {
        let mut window = SendWindow::new(100);
        assert!(!window.update(50));
        assert_eq!(window.limit(), 100);
        window.consume(100);
        assert_eq!(window.credit(), 0);
        assert_eq!(window.blocked(), Some(100));
        assert_eq!(window.blocked(), None);
        assert!(window.update(200));
        assert_eq!(window.credit(), 100);
        window.consume(100);
        assert_eq!(window.blocked(), Some(200));
    }

    #[test]
    fn test_recv_window_overflow() {
        let mut window = RecvWindow::new(100, 1000);
        assert_eq!(window.on_new_rcvd(60), Ok(()));
        assert_eq!(window.on_new_rcvd(40), Ok(()));
        assert_eq!(window.on_new_rcvd(1), Err(Overflow(1)));
        assert_eq!(window.rcvd(), 100);
    }

    #[test]
    fn test_recv_window_update_threshold() {
        let now = Instant::now();
        let srtt = Duration::from_millis(100);
        let mut window = RecvWindow::new(100, 1000);
        window.on_new_rcvd(100).unwrap();
        assert_eq!(window.on_consumed(50, now, srtt), None);
        assert_eq!(window.on_consumed(1, now, srtt), Some(151));
        assert_eq!(window.window(), 100);
    }

    #[test]
    fn test_recv_window_auto_tune() {
        let start = Instant::now();
        let srtt = Duration::from_millis(100);
        let mut window = RecvWindow::new(100, 300);
        window.on_new_rcvd(100).unwrap();
        assert_eq!(window.on_consumed(60, start, srtt), Some(160));

        // consumed another half window within two round trips
        window.on_new_rcvd(60).unwrap();
        let limit = window
            .on_consumed(60, start + Duration::from_millis(150), srtt)
            .unwrap();
        assert_eq!(window.window(), 200);
        assert_eq!(limit, 320);

        window.on_new_rcvd(160).unwrap();
        let limit = window
            .on_consumed(160, start + Duration::from_millis(200), srtt)
            .unwrap();
        assert_eq!(window.window(), 300);
        assert_eq!(limit, 580);

        // slow consumption keeps the window
        window.on_new_rcvd(200).unwrap();
        let limit = window.on_consumed(200, start + Duration::from_secs(5), srtt);
        assert_eq!(limit, Some(780));
        assert_eq!(window.window(), 300);
    }

    #[test]
    fn test_flow_controller() {
        let mut flow = FlowController::new(10, 100, 1000);
        assert_eq!(flow.send_credit(), 10);
        flow.on_data_sent(10);
        assert_eq!(
            flow.data_blocked(),
            Some(DataBlockedFrame::new(VarInt::from_u32(10)))
        );
        assert!(flow.recv_max_data_frame(&MaxDataFrame::new(VarInt::from_u32(20))));
        assert!(!flow.recv_max_data_frame(&MaxDataFrame::new(VarInt::from_u32(15))));
        assert_eq!(flow.send_credit(), 10);

        let err = flow.on_new_rcvd(FrameType::Stream(0), 101).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FlowControl);
    }
}
