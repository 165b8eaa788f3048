use std::{
    collections::{HashMap, VecDeque},
    task::{Context, Poll, Waker, ready},
    time::{Duration, Instant},
};

use bytes::Bytes;
use qbase::{
    config::{Config, Parameters},
    error::{Error, ErrorKind, QuicError},
    flow::FlowController,
    frame::*,
    role::Role,
    sid::{AcceptSid, Dir, ExceedLimitError, LocalStreamIds, RemoteStreamIds, StreamId},
    util::{Arena, Key},
    varint::VarInt,
};

use super::error::StreamError;
use crate::{
    recv::{Accounting, Recver},
    send::Sender,
};

fn wrapper_error(fty: FrameType) -> impl FnOnce(ExceedLimitError) -> QuicError {
    move |e| QuicError::new(ErrorKind::StreamLimit, fty, e.to_string())
}

/// Refers to a stream owned by [`DataStreams`], held by the application.
///
/// Once the stream is collected the key goes stale, operations through it
/// fail with [`StreamError::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    key: Key,
    sid: StreamId,
}

impl StreamKey {
    pub fn stream_id(&self) -> StreamId {
        self.sid
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StreamWindows {
    bidi_local: u64,
    bidi_remote: u64,
    uni: u64,
}

#[derive(Debug)]
struct StreamEntry {
    sid: StreamId,
    sender: Option<Sender>,
    recver: Option<Recver>,
    writer_held: bool,
    reader_held: bool,
}

impl StreamEntry {
    fn is_collectable(&self) -> bool {
        !self.writer_held
            && !self.reader_held
            && self.sender.as_ref().is_none_or(Sender::is_terminal)
            && self.recver.as_ref().is_none_or(Recver::is_terminal)
    }
}

/// All the data streams of a connection.
///
/// Streams live in a generational arena indexed by stream id. Frames from
/// the peer are dispatched to the sending or receiving half they concern,
/// creating peer streams on first reference. Stream control frames to send
/// are queued here and loaded by the packet assembler, which reports their
/// fate back through the `on_*` methods.
#[derive(Debug)]
pub struct DataStreams {
    role: Role,
    send_buffer_capacity: usize,
    max_stream_window: u64,
    local_windows: StreamWindows,
    // zero until the peer's parameters arrive
    peer_windows: StreamWindows,
    streams: Arena<StreamEntry>,
    index: HashMap<StreamId, Key>,
    // streams with a sending half, in round robin order
    send_order: VecDeque<StreamId>,
    local_sids: LocalStreamIds,
    remote_sids: RemoteStreamIds,
    accept_queues: [VecDeque<StreamKey>; 2],
    accept_wakers: [Vec<Waker>; 2],
    open_wakers: [Vec<Waker>; 2],
    flow: FlowController,
    ctl_frames: VecDeque<ReliableFrame>,
    error: Option<Error>,
}

impl DataStreams {
    /// Create the streams of an endpoint playing `role`.
    ///
    /// Our limits come from `config`, the peer's stay at zero until
    /// [`apply_peer_parameters`](Self::apply_peer_parameters).
    pub fn new(role: Role, config: &Config) -> Self {
        Self {
            role,
            send_buffer_capacity: config.send_buffer_capacity(),
            max_stream_window: config.max_stream_window(),
            local_windows: StreamWindows {
                bidi_local: config.initial_max_stream_data_bidi_local(),
                bidi_remote: config.initial_max_stream_data_bidi_remote(),
                uni: config.initial_max_stream_data_uni(),
            },
            peer_windows: StreamWindows::default(),
            streams: Arena::new(),
            index: HashMap::new(),
            send_order: VecDeque::new(),
            local_sids: LocalStreamIds::new(role, 0, 0),
            remote_sids: RemoteStreamIds::new(
                !role,
                config.initial_max_streams_bidi(),
                config.initial_max_streams_uni(),
            ),
            accept_queues: [VecDeque::new(), VecDeque::new()],
            accept_wakers: [Vec::new(), Vec::new()],
            open_wakers: [Vec::new(), Vec::new()],
            flow: FlowController::new(
                0,
                config.initial_max_data(),
                config.max_connection_window(),
            ),
            ctl_frames: VecDeque::new(),
            error: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn flow(&self) -> &FlowController {
        &self.flow
    }

    /// Number of streams not collected yet.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Apply the limits the peer announced during the handshake.
    pub fn apply_peer_parameters(&mut self, params: &Parameters) {
        self.peer_windows = StreamWindows {
            bidi_local: params.initial_max_stream_data_bidi_local(),
            bidi_remote: params.initial_max_stream_data_bidi_remote(),
            uni: params.initial_max_stream_data_uni(),
        };
        self.flow.set_peer_max_data(params.initial_max_data());
        for (_, entry) in self.streams.iter_mut() {
            let (send_window, _) = windows_of(self.role, &self.local_windows, &self.peer_windows, entry.sid);
            if let (Some(sender), Some(window)) = (entry.sender.as_mut(), send_window) {
                sender.update_window(window);
            }
        }
        for (dir, max) in [
            (Dir::Bi, params.initial_max_streams_bidi()),
            (Dir::Uni, params.initial_max_streams_uni()),
        ] {
            let frame = MaxStreamsFrame::with(dir, VarInt::from_u64(max).unwrap_or(VarInt::MAX));
            if self.local_sids.recv_max_streams_frame(&frame) {
                self.wake_openers(dir);
            }
        }
        tracing::debug!(?params, "peer parameters applied to streams");
    }

    fn create_stream(&mut self, sid: StreamId) -> StreamKey {
        let (send_window, recv_window) =
            windows_of(self.role, &self.local_windows, &self.peer_windows, sid);
        let sender = send_window.map(|window| Sender::new(sid, window, self.send_buffer_capacity));
        let recver = recv_window.map(|window| Recver::new(sid, window, self.max_stream_window));
        if sender.is_some() {
            self.send_order.push_back(sid);
        }
        let key = self.streams.insert(StreamEntry {
            sid,
            writer_held: sender.is_some(),
            reader_held: recver.is_some(),
            sender,
            recver,
        });
        self.index.insert(sid, key);
        tracing::debug!(%sid, "stream created");
        StreamKey { key, sid }
    }

    /// Open a new stream, failing with [`StreamError::TooManyStreams`] at the
    /// peer's limit.
    pub fn open(&mut self, dir: Dir) -> Result<StreamKey, StreamError> {
        if let Some(error) = &self.error {
            return Err(StreamError::Connection(error.clone()));
        }
        match self.local_sids.try_alloc_sid(dir) {
            Ok(sid) => Ok(self.create_stream(sid)),
            Err(blocked) => {
                if let Some(frame) = blocked {
                    self.push_ctl(StreamCtlFrame::StreamsBlocked(frame));
                }
                Err(StreamError::TooManyStreams)
            }
        }
    }

    /// Open a new stream, waiting while the peer's limit is reached.
    pub fn poll_open(
        &mut self,
        cx: &mut Context<'_>,
        dir: Dir,
    ) -> Poll<Result<StreamKey, StreamError>> {
        match self.open(dir) {
            Err(StreamError::TooManyStreams) => {
                let wakers = &mut self.open_wakers[dir as usize];
                if !wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
            result => Poll::Ready(result),
        }
    }

    /// Accept the next stream the peer opened in `dir`.
    pub fn poll_accept(
        &mut self,
        cx: &mut Context<'_>,
        dir: Dir,
    ) -> Poll<Result<StreamKey, StreamError>> {
        if let Some(error) = &self.error {
            return Poll::Ready(Err(StreamError::Connection(error.clone())));
        }
        match self.accept_queues[dir as usize].pop_front() {
            Some(stream) => Poll::Ready(Ok(stream)),
            None => {
                let wakers = &mut self.accept_wakers[dir as usize];
                if !wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }

    pub fn poll_write(
        &mut self,
        stream: StreamKey,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, StreamError>> {
        self.sender_mut(stream)?.poll_write(cx, buf)
    }

    /// Finish the sending half, the peer will see the end of the stream.
    pub fn finish(&mut self, stream: StreamKey) -> Result<(), StreamError> {
        self.sender_mut(stream)?.finish()
    }

    /// Reset the sending half, abandoning the data not acknowledged yet.
    pub fn reset(&mut self, stream: StreamKey, app_error_code: VarInt) -> Result<(), StreamError> {
        if let Some(error) = &self.error {
            return Err(StreamError::Connection(error.clone()));
        }
        if let Some(frame) = self.sender_mut(stream)?.reset(app_error_code) {
            self.push_ctl(StreamCtlFrame::ResetStream(frame));
        }
        Ok(())
    }

    pub fn poll_read(
        &mut self,
        stream: StreamKey,
        cx: &mut Context<'_>,
        buf: &mut [u8],
        now: Instant,
        srtt: Duration,
    ) -> Poll<Result<usize, StreamError>> {
        let result = ready!(self.recver_mut(stream)?.poll_read(cx, buf, now, srtt));
        let result = result.map(|(n, max_stream_data)| {
            if let Some(frame) = max_stream_data {
                self.push_ctl(StreamCtlFrame::MaxStreamData(frame));
            }
            if n > 0 {
                if let Some(frame) = self.flow.on_consumed(n as u64, now, srtt) {
                    self.ctl_frames.push_back(ReliableFrame::MaxData(frame));
                }
            }
            n
        });
        self.try_collect(stream.key);
        Poll::Ready(result)
    }

    /// Ask the peer to stop sending on the receiving half.
    pub fn stop(&mut self, stream: StreamKey, app_error_code: VarInt) -> Result<(), StreamError> {
        if let Some(error) = &self.error {
            return Err(StreamError::Connection(error.clone()));
        }
        if let Some(frame) = self.recver_mut(stream)?.stop(app_error_code) {
            self.push_ctl(StreamCtlFrame::StopSending(frame));
        }
        Ok(())
    }

    /// The application dropped its writing half; an unfinished stream is
    /// finished gracefully.
    pub fn release_writer(&mut self, stream: StreamKey) {
        let Some(entry) = self.streams.get_mut(stream.key) else {
            return;
        };
        if !entry.writer_held {
            return;
        }
        entry.writer_held = false;
        if let Some(sender) = entry.sender.as_mut() {
            if sender.finish().is_ok() {
                tracing::trace!(sid = %entry.sid, "finished on release");
            }
        }
        self.try_collect(stream.key);
    }

    /// The application dropped its reading half; the peer is asked to stop
    /// sending and buffered data is dropped.
    pub fn release_reader(&mut self, stream: StreamKey, now: Instant, srtt: Duration) {
        let Some(entry) = self.streams.get_mut(stream.key) else {
            return;
        };
        if !entry.reader_held {
            return;
        }
        entry.reader_held = false;
        let Some((consumed, stop)) = entry.recver.as_mut().map(Recver::abandon) else {
            return self.try_collect(stream.key);
        };
        if let Some(frame) = stop {
            self.push_ctl(StreamCtlFrame::StopSending(frame));
        }
        if consumed > 0 {
            if let Some(frame) = self.flow.on_consumed(consumed, now, srtt) {
                self.ctl_frames.push_back(ReliableFrame::MaxData(frame));
            }
        }
        self.try_collect(stream.key);
    }

    fn sender_mut(&mut self, stream: StreamKey) -> Result<&mut Sender, StreamError> {
        self.streams
            .get_mut(stream.key)
            .and_then(|entry| entry.sender.as_mut())
            .ok_or(StreamError::Closed)
    }

    fn recver_mut(&mut self, stream: StreamKey) -> Result<&mut Recver, StreamError> {
        self.streams
            .get_mut(stream.key)
            .and_then(|entry| entry.recver.as_mut())
            .ok_or(StreamError::Closed)
    }

    fn sender_of(&mut self, sid: StreamId) -> Option<&mut Sender> {
        let key = self.index.get(&sid)?;
        self.streams.get_mut(*key)?.sender.as_mut()
    }

    fn recver_of(&mut self, sid: StreamId) -> Option<&mut Recver> {
        let key = self.index.get(&sid)?;
        self.streams.get_mut(*key)?.recver.as_mut()
    }

    fn try_collect(&mut self, key: Key) {
        if !self.streams.get(key).is_some_and(StreamEntry::is_collectable) {
            return;
        }
        let Some(entry) = self.streams.remove(key) else {
            return;
        };
        self.index.remove(&entry.sid);
        self.send_order.retain(|sid| *sid != entry.sid);
        tracing::debug!(sid = %entry.sid, "stream collected");
        if let Some(frame) = self.remote_sids.on_end_of_stream(entry.sid) {
            self.push_ctl(StreamCtlFrame::MaxStreams(frame));
        }
    }

    fn push_ctl(&mut self, frame: StreamCtlFrame) {
        self.ctl_frames.push_back(ReliableFrame::Stream(frame));
    }

    fn wake_openers(&mut self, dir: Dir) {
        for waker in self.open_wakers[dir as usize].drain(..) {
            waker.wake();
        }
    }

    // every acceptor competes for the queued streams, those losing the race
    // register again
    fn wake_acceptors(&mut self, dir: Dir) {
        for waker in self.accept_wakers[dir as usize].drain(..) {
            waker.wake();
        }
    }
}

fn windows_of(
    role: Role,
    local: &StreamWindows,
    peer: &StreamWindows,
    sid: StreamId,
) -> (Option<u64>, Option<u64>) {
    match (sid.role() == role, sid.dir()) {
        (true, Dir::Bi) => (Some(peer.bidi_remote), Some(local.bidi_local)),
        (false, Dir::Bi) => (Some(peer.bidi_local), Some(local.bidi_remote)),
        (true, Dir::Uni) => (Some(peer.uni), None),
        (false, Dir::Uni) => (None, Some(local.uni)),
    }
}

/// Receiving frames from the peer.
impl DataStreams {
    // A frame for a half of a unidirectional stream that does not exist.
    fn check_half(&self, sid: StreamId, fty: FrameType, toward_recver: bool) -> Result<(), QuicError> {
        let local = sid.role() == self.role;
        if sid.dir() == Dir::Uni && local == toward_recver {
            let reason = if local {
                format!("local {sid} cannot receive {fty:?}")
            } else {
                format!("remote {sid} must not send {fty:?}")
            };
            tracing::error!("   Cause by: {reason}");
            return Err(QuicError::new(ErrorKind::StreamState, fty, reason));
        }
        Ok(())
    }

    /// Find the stream a frame refers to, creating peer streams up to it.
    ///
    /// `None` means the stream was already collected.
    fn resolve(&mut self, sid: StreamId, fty: FrameType) -> Result<Option<Key>, QuicError> {
        if sid.role() == self.role {
            if sid.id() >= self.local_sids.opened_streams(sid.dir()) {
                tracing::error!("   Cause by: local {sid} is not opened yet");
                return Err(QuicError::new(
                    ErrorKind::StreamState,
                    fty,
                    format!("local {sid} is not opened yet"),
                ));
            }
            return Ok(self.index.get(&sid).copied());
        }
        if let AcceptSid::New(need_create) =
            self.remote_sids.try_accept_sid(sid).map_err(wrapper_error(fty))?
        {
            for sid in need_create {
                let stream = self.create_stream(sid);
                self.accept_queues[sid.dir() as usize].push_back(stream);
            }
            self.wake_acceptors(sid.dir());
        }
        Ok(self.index.get(&sid).copied())
    }

    fn account(
        &mut self,
        fty: FrameType,
        accounting: Accounting,
        now: Instant,
        srtt: Duration,
    ) -> Result<(), QuicError> {
        self.flow.on_new_rcvd(fty, accounting.new_rcvd)?;
        if accounting.consumed > 0 {
            if let Some(frame) = self.flow.on_consumed(accounting.consumed, now, srtt) {
                self.ctl_frames.push_back(ReliableFrame::MaxData(frame));
            }
        }
        Ok(())
    }

    /// Receive a STREAM frame.
    pub fn recv_stream_frame(
        &mut self,
        frame: &StreamFrame,
        data: Bytes,
        now: Instant,
        srtt: Duration,
    ) -> Result<(), QuicError> {
        let sid = frame.stream_id();
        let fty = frame.frame_type();
        self.check_half(sid, fty, true)?;
        let Some(key) = self.resolve(sid, fty)? else {
            return Ok(());
        };
        let Some(recver) = self.streams.get_mut(key).and_then(|e| e.recver.as_mut()) else {
            return Ok(());
        };
        let accounting = recver.recv_data(frame, data)?;
        self.account(fty, accounting, now, srtt)?;
        self.try_collect(key);
        Ok(())
    }

    /// Receive a stream control frame.
    pub fn recv_stream_ctl(
        &mut self,
        frame: &StreamCtlFrame,
        now: Instant,
        srtt: Duration,
    ) -> Result<(), QuicError> {
        let fty = frame.frame_type();
        match frame {
            StreamCtlFrame::ResetStream(reset) => {
                let sid = reset.stream_id();
                self.check_half(sid, fty, true)?;
                if let Some(key) = self.resolve(sid, fty)? {
                    if let Some(recver) = self.streams.get_mut(key).and_then(|e| e.recver.as_mut()) {
                        let accounting = recver.recv_reset(reset)?;
                        self.account(fty, accounting, now, srtt)?;
                    }
                    self.try_collect(key);
                }
            }
            StreamCtlFrame::StopSending(stop) => {
                let sid = stop.stream_id();
                self.check_half(sid, fty, false)?;
                if self.resolve(sid, fty)?.is_some() {
                    let code = VarInt::from_u64(stop.app_err_code()).unwrap_or(VarInt::MAX);
                    let reset = self.sender_of(sid).and_then(|sender| sender.reset(code));
                    if let Some(reset) = reset {
                        tracing::debug!(%sid, code = %code, "peer stopped reading, reset sent");
                        self.push_ctl(StreamCtlFrame::ResetStream(reset));
                    }
                }
            }
            StreamCtlFrame::MaxStreamData(max_stream_data) => {
                let sid = max_stream_data.stream_id();
                self.check_half(sid, fty, false)?;
                if self.resolve(sid, fty)?.is_some() {
                    if let Some(sender) = self.sender_of(sid) {
                        sender.update_window(max_stream_data.max_stream_data());
                    }
                }
            }
            StreamCtlFrame::StreamDataBlocked(blocked) => {
                let sid = blocked.stream_id();
                self.check_half(sid, fty, true)?;
                if self.resolve(sid, fty)?.is_some() {
                    if let Some(recver) = self.recver_of(sid) {
                        recver.recv_data_blocked(blocked.maximum_stream_data());
                    }
                }
            }
            StreamCtlFrame::MaxStreams(max_streams) => {
                if self.local_sids.recv_max_streams_frame(max_streams) {
                    let dir = max_streams.dir();
                    tracing::debug!(%dir, max = self.local_sids.max_streams(dir), "stream limit raised");
                    self.wake_openers(dir);
                }
            }
            StreamCtlFrame::StreamsBlocked(streams_blocked) => {
                self.remote_sids.recv_streams_blocked_frame(streams_blocked);
            }
        }
        Ok(())
    }

    pub fn recv_max_data(&mut self, frame: &MaxDataFrame) {
        if self.flow.recv_max_data_frame(frame) {
            tracing::trace!(max_data = frame.max_data(), "connection window updated");
        }
    }

    pub fn recv_data_blocked(&self, frame: &DataBlockedFrame) {
        self.flow.recv_data_blocked_frame(frame);
    }

    /// The connection terminated, every stream fails with `error`.
    pub fn on_conn_error(&mut self, error: &Error) {
        if self.error.is_some() {
            return;
        }
        self.error = Some(error.clone());
        for (_, entry) in self.streams.iter_mut() {
            if let Some(sender) = entry.sender.as_mut() {
                sender.on_conn_error(error);
            }
            if let Some(recver) = entry.recver.as_mut() {
                recver.on_conn_error(error);
            }
        }
        self.ctl_frames.clear();
        for dir in [Dir::Bi, Dir::Uni] {
            self.wake_openers(dir);
            self.wake_acceptors(dir);
        }
    }
}

/// Sending frames to the peer.
impl DataStreams {
    pub fn has_ctl_frames(&self) -> bool {
        !self.ctl_frames.is_empty()
    }

    /// Take the next control frame if it fits in `capacity` bytes.
    pub fn try_load_ctl_frame(&mut self, capacity: usize) -> Option<ReliableFrame> {
        if self
            .ctl_frames
            .front()
            .is_some_and(|frame| frame.encoding_size() <= capacity)
        {
            self.ctl_frames.pop_front()
        } else {
            None
        }
    }

    /// Take a STREAM frame fitting in `capacity` bytes, serving the streams
    /// in turn.
    ///
    /// Streams blocked by flow control queue the corresponding *_BLOCKED frames.
    pub fn try_load_stream_frame(&mut self, capacity: usize) -> Option<(StreamFrame, Bytes)> {
        if self.error.is_some() {
            return None;
        }
        let conn_credit = self.flow.send_credit();
        let mut conn_blocked = false;
        for _ in 0..self.send_order.len() {
            let Some(sid) = self.send_order.pop_front() else {
                break;
            };
            self.send_order.push_back(sid);
            let Some(&key) = self.index.get(&sid) else {
                continue;
            };
            let Some(sender) = self.streams.get_mut(key).and_then(|e| e.sender.as_mut()) else {
                continue;
            };
            if let Some((frame, data, fresh)) = sender.pick_up(capacity, conn_credit) {
                self.flow.on_data_sent(fresh);
                return Some((frame, data));
            }
            if let Some(frame) = sender.data_blocked() {
                self.ctl_frames
                    .push_back(ReliableFrame::Stream(StreamCtlFrame::StreamDataBlocked(frame)));
            }
            conn_blocked |= conn_credit == 0 && sender.has_pending();
        }
        if conn_blocked {
            if let Some(frame) = self.flow.data_blocked() {
                self.ctl_frames.push_back(ReliableFrame::DataBlocked(frame));
            }
        }
        None
    }

    pub fn on_stream_frame_acked(&mut self, frame: &StreamFrame) {
        let Some(&key) = self.index.get(&frame.stream_id()) else {
            return;
        };
        if let Some(sender) = self.streams.get_mut(key).and_then(|e| e.sender.as_mut()) {
            sender.on_data_acked(frame);
        }
        self.try_collect(key);
    }

    pub fn may_loss_stream_frame(&mut self, frame: &StreamFrame) {
        if let Some(sender) = self.sender_of(frame.stream_id()) {
            sender.may_loss_data(frame);
        }
    }

    pub fn on_ctl_frame_acked(&mut self, frame: &ReliableFrame) {
        if let ReliableFrame::Stream(StreamCtlFrame::ResetStream(reset)) = frame {
            let Some(&key) = self.index.get(&reset.stream_id()) else {
                return;
            };
            if let Some(sender) = self.streams.get_mut(key).and_then(|e| e.sender.as_mut()) {
                sender.on_reset_acked();
            }
            self.try_collect(key);
        }
    }

    /// A control frame was lost, send it again if it still matters.
    ///
    /// Limit updates are resent with the current limit, unless a newer one
    /// has been sent already; blocked signals are not resent.
    pub fn on_ctl_frame_lost(&mut self, frame: ReliableFrame) {
        let resend = match &frame {
            ReliableFrame::MaxData(lost) => {
                let current = self.flow.max_data_frame();
                (current.max_data() == lost.max_data()).then_some(ReliableFrame::MaxData(current))
            }
            ReliableFrame::DataBlocked(_) => None,
            ReliableFrame::Stream(ctl) => match ctl {
                StreamCtlFrame::ResetStream(reset) => self
                    .sender_of(reset.stream_id())
                    .and_then(|sender| sender.reset_frame())
                    .map(StreamCtlFrame::ResetStream),
                StreamCtlFrame::StopSending(stop) => {
                    let code = VarInt::from_u64(stop.app_err_code()).unwrap_or(VarInt::MAX);
                    self.recver_of(stop.stream_id())
                        .and_then(|recver| recver.stop_frame(code))
                        .map(StreamCtlFrame::StopSending)
                }
                StreamCtlFrame::MaxStreamData(lost) => self
                    .recver_of(lost.stream_id())
                    .and_then(|recver| recver.max_stream_data_frame())
                    .filter(|current| current.max_stream_data() == lost.max_stream_data())
                    .map(StreamCtlFrame::MaxStreamData),
                StreamCtlFrame::MaxStreams(lost) => {
                    let current = self.remote_sids.max_streams_frame(lost.dir());
                    (current == *lost).then_some(StreamCtlFrame::MaxStreams(current))
                }
                StreamCtlFrame::StreamDataBlocked(_) | StreamCtlFrame::StreamsBlocked(_) => None,
            }
            .map(ReliableFrame::Stream),
        };
        if let Some(frame) = resend {
            tracing::trace!(?frame, "control frame resent");
            self.ctl_frames.push_back(frame);
        }
    }
}
