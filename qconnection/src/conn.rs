//! The connection engine, free of any I/O.
//!
//! [`RawConnection`] is fed received datagrams and the current time, and
//! polled for datagrams to send and for the next instant it wants to be
//! woken at. Everything else, sockets and timers, belongs to the driver.
use std::{
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};

use bytes::{BufMut, Bytes, BytesMut};
use qbase::{
    cid::ConnectionId,
    config::Config,
    epoch::Epoch,
    error::{Error, ErrorKind, QuicError},
    frame::{
        AckFrame, ConnectionCloseFrame, Frame, FrameReader, PingFrame, WriteStreamFrame,
        io::WriteFrame,
    },
    packet::{Header, PacketNumber, WriteHeader, split_packet},
    role::Role,
};
use qcongestion::{Algorithm, CongestionController, Timeout};
use qrecovery::streams::DataStreams;

use crate::{
    crypto::Crypto,
    error::ConnectionError,
    space::{SentFrame, Space},
    termination::Terminator,
};

/// A packet is not started with less room left in the datagram.
const MIN_PACKET_ROOM: usize = 32;

#[derive(Debug)]
enum State {
    Active,
    /// We sent CONNECTION_CLOSE and answer further packets with it.
    Closing {
        error: ConnectionError,
        terminator: Terminator,
        until: Instant,
    },
    /// The peer closed, nothing is sent anymore.
    Draining {
        error: ConnectionError,
        until: Instant,
    },
    Closed(ConnectionError),
}

impl State {
    fn error(&self) -> Option<&ConnectionError> {
        match self {
            State::Active => None,
            State::Closing { error, .. } | State::Draining { error, .. } | State::Closed(error) => {
                Some(error)
            }
        }
    }
}

/// A snapshot of the loss recovery state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub smoothed_rtt: Duration,
    pub cwnd: usize,
    pub bytes_in_flight: usize,
    pub pto_count: u32,
}

pub struct RawConnection {
    role: Role,
    max_datagram_size: usize,
    dcid: ConnectionId,
    crypto: Box<dyn Crypto>,
    spaces: [Space; 3],
    streams: DataStreams,
    cc: CongestionController,
    state: State,
    handshake_done: bool,
    idle_timeout: Duration,
    last_activity: Instant,
    // an ack-eliciting packet went out since the last packet was received
    sent_since_rcvd: bool,
    handshake_wakers: Vec<Waker>,
    closed_wakers: Vec<Waker>,
}

impl std::fmt::Debug for RawConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawConnection")
            .field("role", &self.role)
            .field("dcid", &self.dcid)
            .field("level", &self.crypto.level())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RawConnection {
    pub fn new(role: Role, config: Config, crypto: Box<dyn Crypto>, now: Instant) -> Self {
        let cc = CongestionController::new(&config);
        Self::with_congestion(role, config, crypto, cc, now)
    }

    /// A connection using `algorithm` for congestion control.
    pub fn with_algorithm(
        role: Role,
        config: Config,
        crypto: Box<dyn Crypto>,
        algorithm: Box<dyn Algorithm>,
        now: Instant,
    ) -> Self {
        let cc = CongestionController::with_algorithm(&config, algorithm);
        Self::with_congestion(role, config, crypto, cc, now)
    }

    fn with_congestion(
        role: Role,
        config: Config,
        crypto: Box<dyn Crypto>,
        cc: CongestionController,
        now: Instant,
    ) -> Self {
        Self {
            role,
            max_datagram_size: config.max_datagram_size(),
            dcid: ConnectionId::random_gen(8),
            crypto,
            spaces: Epoch::ALL.map(|epoch| Space::new(epoch, &config)),
            streams: DataStreams::new(role, &config),
            cc,
            state: State::Active,
            handshake_done: false,
            idle_timeout: config.idle_timeout(),
            last_activity: now,
            sent_since_rcvd: false,
            handshake_wakers: Vec::new(),
            closed_wakers: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn streams(&self) -> &DataStreams {
        &self.streams
    }

    pub fn streams_mut(&mut self) -> &mut DataStreams {
        &mut self.streams
    }

    pub fn smoothed_rtt(&self) -> Duration {
        self.cc.rtt().smoothed_rtt()
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            smoothed_rtt: self.smoothed_rtt(),
            cwnd: self.cc.cwnd(),
            bytes_in_flight: self.cc.bytes_in_flight(),
            pto_count: self.cc.pto_count(),
        }
    }

    pub fn is_handshake_done(&self) -> bool {
        self.handshake_done
    }

    /// Why the connection terminated, once it did.
    pub fn error(&self) -> Option<&ConnectionError> {
        self.state.error()
    }

    /// Whether the connection is gone for good, the driver may stop.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed(_))
    }

    pub fn poll_handshake(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), ConnectionError>> {
        if self.handshake_done {
            return Poll::Ready(Ok(()));
        }
        if let Some(error) = self.state.error() {
            return Poll::Ready(Err(error.clone()));
        }
        self.handshake_wakers.push(cx.waker().clone());
        Poll::Pending
    }

    /// Resolves once the connection left the active state.
    pub fn poll_closed(&mut self, cx: &mut Context<'_>) -> Poll<ConnectionError> {
        if let Some(error) = self.state.error() {
            return Poll::Ready(error.clone());
        }
        self.closed_wakers.push(cx.waker().clone());
        Poll::Pending
    }

    fn wake_all(&mut self) {
        self.handshake_wakers.drain(..).for_each(Waker::wake);
        self.closed_wakers.drain(..).for_each(Waker::wake);
    }

    /// Close the connection, `error` is sent to the peer in CONNECTION_CLOSE.
    pub fn close(&mut self, error: Error, now: Instant) {
        if !matches!(self.state, State::Active) {
            return;
        }
        tracing::debug!(role = %self.role, %error, "closing");
        self.streams.on_conn_error(&error);
        self.state = State::Closing {
            terminator: Terminator::new(ConnectionCloseFrame::from(error.clone())),
            error: ConnectionError::Local(error),
            until: now + self.cc.pto_duration() * 3,
        };
        self.wake_all();
    }

    fn enter_draining(&mut self, ccf: ConnectionCloseFrame, now: Instant) {
        let error = match &self.state {
            State::Active => {
                let error = Error::from(ccf);
                tracing::debug!(role = %self.role, %error, "closed by peer");
                self.streams.on_conn_error(&error);
                ConnectionError::Peer(error)
            }
            State::Closing { error, .. } => error.clone(),
            State::Draining { .. } | State::Closed(_) => return,
        };
        self.state = State::Draining {
            error,
            until: now + self.cc.pto_duration() * 3,
        };
        self.wake_all();
    }

    fn enter_closed(&mut self, error: ConnectionError) {
        tracing::debug!(role = %self.role, %error, "connection closed");
        if matches!(self.state, State::Active) {
            self.streams.on_conn_error(&error.to_error());
        }
        self.state = State::Closed(error);
        self.wake_all();
    }

    fn idle_deadline(&self) -> Option<Instant> {
        if self.idle_timeout.is_zero() {
            return None;
        }
        let timeout = self.idle_timeout.max(self.cc.pto_duration() * 3);
        Some(self.last_activity + timeout)
    }
}

/// Receiving.
impl RawConnection {
    /// Process one datagram from the peer, which may carry several packets.
    #[tracing::instrument(level = "trace", skip_all, fields(role = %self.role, len = datagram.len()))]
    pub fn recv_datagram(&mut self, datagram: Bytes, now: Instant) {
        if matches!(self.state, State::Draining { .. } | State::Closed(_)) {
            return;
        }
        let mut remain = &datagram[..];
        while !remain.is_empty() {
            let (header, raw_header, protected, rest) = match split_packet(remain) {
                Ok(parts) => parts,
                Err(error) => {
                    tracing::debug!(%error, "dropped the rest of the datagram");
                    return;
                }
            };
            remain = rest;
            let epoch = header.epoch();
            if self.spaces[epoch].is_discarded() {
                tracing::trace!(%epoch, "packet of a discarded space");
                continue;
            }
            let (encoded_pn, payload) = match self.crypto.decrypt(epoch, raw_header, protected) {
                Ok(opened) => opened,
                Err(error) => {
                    tracing::debug!(%error, "dropped packet");
                    continue;
                }
            };
            self.recv_packet(epoch, encoded_pn, payload, now);
            self.check_handshake_progress(now);
            if !matches!(self.state, State::Active | State::Closing { .. }) {
                return;
            }
        }
    }

    fn recv_packet(&mut self, epoch: Epoch, encoded_pn: PacketNumber, payload: Bytes, now: Instant) {
        let rcvd = self.spaces[epoch].journal().rcvd();
        let pn = encoded_pn.decode(rcvd.expected_pn());
        if rcvd.is_duplicate(pn) {
            tracing::trace!(%epoch, pn, "duplicate packet");
            return;
        }

        let frames = match collect_frames(payload, epoch) {
            Ok(frames) => frames,
            Err(error) => return self.close(error.into(), now),
        };
        self.last_activity = now;
        self.sent_since_rcvd = false;

        if let State::Closing { terminator, .. } = &mut self.state {
            match frames.into_iter().find_map(|(frame, _)| match frame {
                Frame::Close(ccf) => Some(ccf),
                _ => None,
            }) {
                Some(ccf) => self.enter_draining(ccf, now),
                None => terminator.on_packet_rcvd(now),
            }
            return;
        }

        let ack_eliciting = frames.iter().any(|(_, eliciting)| *eliciting);
        self.spaces[epoch]
            .journal_mut()
            .rcvd_mut()
            .record_received(pn, ack_eliciting, now);
        tracing::trace!(%epoch, pn, frames = frames.len(), "packet received");

        for (frame, _) in frames {
            if let Err(error) = self.recv_frame(epoch, frame, now) {
                return self.close(error.into(), now);
            }
            if !matches!(self.state, State::Active) {
                return;
            }
        }
    }

    fn recv_frame(&mut self, epoch: Epoch, frame: Frame, now: Instant) -> Result<(), QuicError> {
        let srtt = self.smoothed_rtt();
        match frame {
            Frame::Padding(_) | Frame::Ping(_) => {}
            Frame::Ack(ack) => self.recv_ack_frame(epoch, &ack, now)?,
            Frame::Close(ccf) => self.enter_draining(ccf, now),
            Frame::MaxData(frame) => self.streams.recv_max_data(&frame),
            Frame::DataBlocked(frame) => self.streams.recv_data_blocked(&frame),
            Frame::StreamCtl(frame) => self.streams.recv_stream_ctl(&frame, now, srtt)?,
            Frame::Stream(frame, data) => self.streams.recv_stream_frame(&frame, data, now, srtt)?,
        }
        Ok(())
    }

    fn recv_ack_frame(&mut self, epoch: Epoch, ack: &AckFrame, now: Instant) -> Result<(), QuicError> {
        let acked = self.spaces[epoch].journal_mut().sent_mut().process_ack(ack)?;
        let outcome = self.cc.on_ack_received(epoch, ack, now);
        for record in acked {
            for frame in record.into_frames() {
                self.on_frame_acked(epoch, frame);
            }
        }
        for pn in outcome.lost {
            self.on_packet_lost(epoch, pn);
        }
        Ok(())
    }

    fn on_frame_acked(&mut self, epoch: Epoch, frame: SentFrame) {
        match frame {
            SentFrame::Ack(largest) => self.spaces[epoch]
                .journal_mut()
                .rcvd_mut()
                .on_ack_acked(largest),
            SentFrame::Ping => {}
            SentFrame::Reliable(frame) => self.streams.on_ctl_frame_acked(&frame),
            SentFrame::Stream(frame) => self.streams.on_stream_frame_acked(&frame),
        }
    }

    fn on_packet_lost(&mut self, epoch: Epoch, pn: u64) {
        let Some(record) = self.spaces[epoch].journal_mut().sent_mut().on_pkt_lost(pn) else {
            return;
        };
        tracing::trace!(%epoch, pn, "packet lost");
        for frame in record.into_frames() {
            match frame {
                SentFrame::Ack(_) | SentFrame::Ping => {}
                SentFrame::Reliable(frame) => self.streams.on_ctl_frame_lost(frame),
                SentFrame::Stream(frame) => self.streams.may_loss_stream_frame(&frame),
            }
        }
    }

    /// Once the crypto layer reaches the application level the handshake is
    /// done: the peer's parameters apply and the handshake spaces go away.
    fn check_handshake_progress(&mut self, now: Instant) {
        if self.handshake_done
            || self.crypto.level() != Epoch::Data
            || !matches!(self.state, State::Active)
        {
            return;
        }
        let Some(params) = self.crypto.peer_parameters() else {
            tracing::error!("   Cause by: handshake completed without the peer's transport parameters");
            let error = QuicError::with_default_fty(
                ErrorKind::TransportParameter,
                "missing transport parameters",
            );
            return self.close(error.into(), now);
        };

        self.streams.apply_peer_parameters(&params);
        self.cc.set_max_ack_delay(params.max_ack_delay());
        let peer_idle_timeout = params.max_idle_timeout();
        if !peer_idle_timeout.is_zero()
            && (self.idle_timeout.is_zero() || peer_idle_timeout < self.idle_timeout)
        {
            self.idle_timeout = peer_idle_timeout;
        }
        let peer_max_udp_payload = usize::try_from(params.max_udp_payload_size()).unwrap_or(usize::MAX);
        self.max_datagram_size = self.max_datagram_size.min(peer_max_udp_payload);

        for epoch in [Epoch::Initial, Epoch::Handshake] {
            self.spaces[epoch].discard();
            self.cc.discard_space(epoch, now);
        }
        self.cc.on_handshake_confirmed(now);
        self.handshake_done = true;
        tracing::debug!(role = %self.role, "handshake complete");
        self.handshake_wakers.drain(..).for_each(Waker::wake);
    }
}

fn collect_frames(payload: Bytes, epoch: Epoch) -> Result<Vec<(Frame, bool)>, QuicError> {
    let frames = FrameReader::new(payload, epoch).collect::<Result<Vec<_>, _>>()?;
    if frames.is_empty() {
        tracing::error!("   Cause by: received a {epoch} packet without frames");
        return Err(QuicError::with_default_fty(
            ErrorKind::ProtocolViolation,
            "packet without frames",
        ));
    }
    Ok(frames)
}

/// Timers.
impl RawConnection {
    /// The next instant [`RawConnection::handle_timeout`] must be called at.
    pub fn poll_timeout(&self) -> Option<Instant> {
        match &self.state {
            State::Active => {
                let ack_deadlines = self
                    .spaces
                    .iter()
                    .filter(|space| !space.is_discarded())
                    .filter_map(|space| space.journal().rcvd().ack_deadline());
                ack_deadlines
                    .chain(self.cc.poll_timeout())
                    .chain(self.idle_deadline())
                    .min()
            }
            State::Closing { until, .. } | State::Draining { until, .. } => Some(*until),
            State::Closed(_) => None,
        }
    }

    pub fn handle_timeout(&mut self, now: Instant) {
        match &self.state {
            State::Active => {}
            State::Closing { error, until, .. } | State::Draining { error, until } => {
                if *until <= now {
                    let error = error.clone();
                    self.enter_closed(error);
                }
                return;
            }
            State::Closed(_) => return,
        }

        if self.idle_deadline().is_some_and(|deadline| deadline <= now) {
            tracing::debug!(role = %self.role, "idle timeout");
            return self.enter_closed(ConnectionError::IdleTimeout);
        }

        match self.cc.on_timeout(now) {
            Some(Timeout::Lost(epoch, lost)) => {
                for pn in lost {
                    self.on_packet_lost(epoch, pn);
                }
            }
            Some(Timeout::Probe(epoch)) => self.spaces[epoch].request_probe(),
            None => {}
        }
    }
}

/// Sending.
impl RawConnection {
    /// The next datagram to send, `None` if there is nothing to send now.
    ///
    /// Packets of several levels are coalesced into one datagram.
    pub fn poll_transmit(&mut self, now: Instant) -> Option<Bytes> {
        let mut datagram = BytesMut::with_capacity(self.max_datagram_size);
        match &self.state {
            State::Active => {
                for epoch in Epoch::ALL {
                    if epoch > self.crypto.level() || self.spaces[epoch].is_discarded() {
                        continue;
                    }
                    if self.max_datagram_size - datagram.len() < MIN_PACKET_ROOM {
                        break;
                    }
                    self.write_packet(epoch, &mut datagram, now);
                }
            }
            State::Closing { .. } => self.write_close_packet(&mut datagram, now),
            State::Draining { .. } | State::Closed(_) => {}
        }
        (!datagram.is_empty()).then(|| datagram.freeze())
    }

    /// The size of the payload one packet of `epoch` may carry in the room
    /// left, and the packet number it gets.
    fn packet_layout(&self, epoch: Epoch, room: usize) -> Option<(Header, PacketNumber, usize)> {
        let header = Header::new(epoch, self.dcid);
        let sent = self.spaces[epoch].journal().sent();
        let pn = PacketNumber::encode(sent.next_pn(), sent.largest_acked());
        let overhead = header.encoding_size(room) + pn.size() + self.crypto.tag_len(epoch);
        let capacity = room.checked_sub(overhead)?;
        Some((header, pn, capacity))
    }

    fn write_packet(&mut self, epoch: Epoch, datagram: &mut BytesMut, now: Instant) -> bool {
        let room = self.max_datagram_size - datagram.len();
        let Some((header, encoded_pn, capacity)) = self.packet_layout(epoch, room) else {
            return false;
        };
        // a packet carrying anything but ACK and PING counts whole against the
        // congestion window
        let quota = self.cc.send_quota().saturating_sub(room - capacity);
        let budget = |payload: &BytesMut| {
            (capacity - payload.len()).min(quota.saturating_sub(payload.len()))
        };

        let mut payload = BytesMut::with_capacity(capacity);
        let mut frames = Vec::new();
        let mut ack_eliciting = false;
        let mut congestion_controlled = false;

        let rcvd = self.spaces[epoch].journal().rcvd();
        let ack_due = match epoch {
            Epoch::Data => rcvd.ack_deadline().is_some_and(|deadline| deadline <= now),
            _ => rcvd.ack_deadline().is_some(),
        };
        if ack_due {
            self.load_ack_frame(epoch, &mut payload, &mut frames, capacity, now);
        }

        let can_open = self.role == Role::Client || epoch != Epoch::Initial;
        if self.spaces[epoch].needs_ping(can_open) && capacity > payload.len() {
            payload.put_frame(&PingFrame);
            frames.push(SentFrame::Ping);
            ack_eliciting = true;
        }

        if epoch == Epoch::Data {
            while let Some(frame) = self.streams.try_load_ctl_frame(budget(&payload)) {
                payload.put_frame(&frame);
                frames.push(SentFrame::Reliable(frame));
                ack_eliciting = true;
                congestion_controlled = true;
            }
            while let Some((frame, data)) = self.streams.try_load_stream_frame(budget(&payload)) {
                payload.put_stream_frame(&frame, &data);
                frames.push(SentFrame::Stream(frame));
                ack_eliciting = true;
                congestion_controlled = true;
            }
        }

        // piggyback an ACK on anything the peer will acknowledge anyway
        if !ack_due && ack_eliciting && self.spaces[epoch].journal().rcvd().has_unacked() {
            let left = if congestion_controlled {
                budget(&payload)
            } else {
                capacity - payload.len()
            };
            self.load_ack_frame(epoch, &mut payload, &mut frames, left, now);
        }

        if payload.is_empty() {
            return false;
        }
        let mut padded = false;
        if self.role == Role::Client && epoch == Epoch::Initial && ack_eliciting {
            payload.put_bytes(0, capacity - payload.len());
            padded = true;
        }

        let Some((pn, size)) =
            self.seal_packet(epoch, header, encoded_pn, &payload, datagram, frames, now)
        else {
            return false;
        };
        if ack_eliciting {
            self.spaces[epoch].take_probe();
            if !self.sent_since_rcvd {
                self.last_activity = now;
                self.sent_since_rcvd = true;
            }
        }
        let in_flight = ack_eliciting || padded || congestion_controlled;
        self.cc
            .on_packet_sent(epoch, pn, ack_eliciting, in_flight, size, now);
        tracing::trace!(%epoch, pn, size, ack_eliciting, "packet sent");
        true
    }

    fn load_ack_frame(
        &mut self,
        epoch: Epoch,
        payload: &mut BytesMut,
        frames: &mut Vec<SentFrame>,
        capacity: usize,
        now: Instant,
    ) {
        let rcvd = self.spaces[epoch].journal_mut().rcvd_mut();
        if let Some(ack) = rcvd.gen_ack_frame(now, capacity) {
            payload.put_frame(&ack);
            frames.push(SentFrame::Ack(ack.largest()));
        }
    }

    /// Record the packet in its space, then write its header and protected
    /// part to the datagram. Returns the packet number and the packet size.
    #[allow(clippy::too_many_arguments)]
    fn seal_packet(
        &mut self,
        epoch: Epoch,
        header: Header,
        encoded_pn: PacketNumber,
        payload: &[u8],
        datagram: &mut BytesMut,
        frames: Vec<SentFrame>,
        now: Instant,
    ) -> Option<(u64, usize)> {
        let protected_len = encoded_pn.size() + payload.len() + self.crypto.tag_len(epoch);
        let size = header.encoding_size(protected_len) + protected_len;
        let pn = match self.spaces[epoch].journal_mut().sent_mut().record_sent(frames, size, now) {
            Ok(pn) => pn,
            Err(error) => {
                tracing::error!("   Cause by: {epoch} packet numbers exhausted, {error}");
                let error = QuicError::with_default_fty(ErrorKind::Internal, error.to_string());
                self.close(error.into(), now);
                return None;
            }
        };

        let header_start = datagram.len();
        datagram.put_header(&header, protected_len);
        let sealed = self
            .crypto
            .encrypt(epoch, encoded_pn, &datagram[header_start..], payload);
        debug_assert_eq!(sealed.len(), protected_len);
        datagram.extend_from_slice(&sealed);
        Some((pn, size))
    }

    fn write_close_packet(&mut self, datagram: &mut BytesMut, now: Instant) {
        let State::Closing { terminator, .. } = &self.state else {
            return;
        };
        if !terminator.should_send() {
            return;
        }
        let Some(epoch) = Epoch::ALL
            .into_iter()
            .rev()
            .find(|&epoch| epoch <= self.crypto.level() && !self.spaces[epoch].is_discarded())
        else {
            return;
        };
        let ccf = terminator.ccf_at(epoch);

        let room = self.max_datagram_size - datagram.len();
        let Some((header, encoded_pn, capacity)) = self.packet_layout(epoch, room) else {
            return;
        };
        let mut payload = BytesMut::with_capacity(capacity);
        payload.put_frame(&ccf);
        if self
            .seal_packet(epoch, header, encoded_pn, &payload, datagram, Vec::new(), now)
            .is_some()
            && let State::Closing { terminator, .. } = &mut self.state
        {
            tracing::trace!(%epoch, "CONNECTION_CLOSE sent");
            terminator.on_sent(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::task::Waker;

    use qbase::{
        config::Parameters,
        error::AppError,
        sid::{Dir, StreamId},
        varint::VarInt,
    };
    use qrecovery::streams::StreamError;

    use super::*;
    use crate::crypto::PlainCrypto;

    fn endpoint(role: Role, config: &Config, now: Instant) -> RawConnection {
        let crypto = PlainCrypto::new(config.parameters());
        RawConnection::new(role, config.clone(), Box::new(crypto), now)
    }

    fn pair(now: Instant) -> (RawConnection, RawConnection) {
        let config = Config::default();
        (
            endpoint(Role::Client, &config, now),
            endpoint(Role::Server, &config, now),
        )
    }

    /// Deliver datagrams both ways until both ends are quiet.
    fn pump(a: &mut RawConnection, b: &mut RawConnection, now: Instant) {
        loop {
            let mut moved = false;
            while let Some(datagram) = a.poll_transmit(now) {
                b.recv_datagram(datagram, now);
                moved = true;
            }
            while let Some(datagram) = b.poll_transmit(now) {
                a.recv_datagram(datagram, now);
                moved = true;
            }
            if !moved {
                break;
            }
        }
    }

    fn handshake(client: &mut RawConnection, server: &mut RawConnection, now: Instant) {
        pump(client, server, now);
        assert!(client.is_handshake_done());
        assert!(server.is_handshake_done());
    }

    #[test]
    fn test_handshake() {
        let now = Instant::now();
        let (mut client, mut server) = pair(now);

        let initial = client.poll_transmit(now).unwrap();
        assert_eq!(initial.len(), Config::default().max_datagram_size());
        assert!(client.poll_transmit(now).is_none());

        server.recv_datagram(initial, now);
        assert!(!server.is_handshake_done());
        let response = server.poll_transmit(now).unwrap();
        client.recv_datagram(response, now);
        assert!(client.is_handshake_done());
        assert!(client.spaces[Epoch::Initial].is_discarded());
        assert!(client.spaces[Epoch::Handshake].is_discarded());

        let first = client.poll_transmit(now).unwrap();
        server.recv_datagram(first, now);
        assert!(server.is_handshake_done());
        assert!(server.spaces[Epoch::Handshake].is_discarded());
        assert_eq!(server.stats().bytes_in_flight, 0);
    }

    #[test]
    fn test_stream_transfer() {
        let now = Instant::now();
        let (mut client, mut server) = pair(now);
        handshake(&mut client, &mut server, now);
        let mut cx = Context::from_waker(Waker::noop());

        let stream = client.streams_mut().open(Dir::Bi).unwrap();
        assert_eq!(stream.stream_id(), StreamId::new(Role::Client, Dir::Bi, 0));
        assert_eq!(
            client.streams_mut().poll_write(stream, &mut cx, b"hello world"),
            Poll::Ready(Ok(11))
        );
        client.streams_mut().finish(stream).unwrap();
        pump(&mut client, &mut server, now);

        let Poll::Ready(Ok(accepted)) = server.streams_mut().poll_accept(&mut cx, Dir::Bi) else {
            panic!("no stream accepted");
        };
        let mut buf = [0; 32];
        let srtt = server.smoothed_rtt();
        let read = server
            .streams_mut()
            .poll_read(accepted, &mut cx, &mut buf, now, srtt);
        assert_eq!(read, Poll::Ready(Ok(11)));
        assert_eq!(&buf[..11], b"hello world");
        let read = server
            .streams_mut()
            .poll_read(accepted, &mut cx, &mut buf, now, srtt);
        assert_eq!(read, Poll::Ready(Ok(0)));
    }

    #[test]
    fn test_lost_stream_data_resent() {
        let now = Instant::now();
        let (mut client, mut server) = pair(now);
        handshake(&mut client, &mut server, now);
        let mut cx = Context::from_waker(Waker::noop());

        let stream = client.streams_mut().open(Dir::Uni).unwrap();
        let _ = client.streams_mut().poll_write(stream, &mut cx, b"lost once");
        let lost = client.poll_transmit(now).unwrap();
        drop(lost);
        assert!(client.stats().bytes_in_flight > 0);

        // the probe timeout fires, a PING goes out and its ACK reveals the loss
        let mut now = now;
        let mut resent = false;
        for _ in 0..10 {
            now = client.poll_timeout().unwrap();
            client.handle_timeout(now);
            server.handle_timeout(now);
            pump(&mut client, &mut server, now);
            if let Poll::Ready(Ok(accepted)) = server.streams_mut().poll_accept(&mut cx, Dir::Uni) {
                let mut buf = [0; 16];
                let srtt = server.smoothed_rtt();
                let read = server
                    .streams_mut()
                    .poll_read(accepted, &mut cx, &mut buf, now, srtt);
                assert_eq!(read, Poll::Ready(Ok(9)));
                assert_eq!(&buf[..9], b"lost once");
                resent = true;
                break;
            }
        }
        assert!(resent);
    }

    #[test]
    fn test_in_flight_bounded_by_window() {
        let mut now = Instant::now();
        let (mut client, mut server) = pair(now);
        handshake(&mut client, &mut server, now);
        let mut cx = Context::from_waker(Waker::noop());

        let data = (0..100_000).map(|i| (i % 251) as u8).collect::<Vec<_>>();
        let stream = client.streams_mut().open(Dir::Uni).unwrap();
        assert_eq!(
            client.streams_mut().poll_write(stream, &mut cx, &data),
            Poll::Ready(Ok(data.len()))
        );
        client.streams_mut().finish(stream).unwrap();

        let mut datagrams = 0;
        let mut dropped = 0;
        let mut reader = None;
        let mut received = Vec::new();
        let mut finished = false;
        for _ in 0..5000 {
            loop {
                let before = client.stats();
                let probing = client.spaces[Epoch::Data].needs_ping(true);
                let Some(datagram) = client.poll_transmit(now) else {
                    break;
                };
                let after = client.stats();
                if after.bytes_in_flight > before.bytes_in_flight && !probing {
                    assert!(after.bytes_in_flight <= after.cwnd, "{after:?}");
                }
                datagrams += 1;
                // every fourth datagram, and a burst of three now and then
                if datagrams % 4 == 0 || datagrams % 50 < 3 {
                    dropped += 1;
                } else {
                    server.recv_datagram(datagram, now);
                }
            }
            while let Some(datagram) = server.poll_transmit(now) {
                client.recv_datagram(datagram, now);
            }

            if reader.is_none() {
                reader = match server.streams_mut().poll_accept(&mut cx, Dir::Uni) {
                    Poll::Ready(Ok(accepted)) => Some(accepted),
                    _ => None,
                };
            }
            if let Some(reader) = reader {
                let mut buf = [0; 4096];
                let srtt = server.smoothed_rtt();
                while let Poll::Ready(read) =
                    server.streams_mut().poll_read(reader, &mut cx, &mut buf, now, srtt)
                {
                    match read.unwrap() {
                        0 => {
                            finished = true;
                            break;
                        }
                        n => received.extend_from_slice(&buf[..n]),
                    }
                }
            }
            if finished {
                break;
            }

            now += Duration::from_millis(2);
            for conn in [&mut client, &mut server] {
                if conn.poll_timeout().is_some_and(|at| at <= now) {
                    conn.handle_timeout(now);
                }
            }
        }
        assert!(finished);
        assert!(dropped > 0);
        assert!(received == data);
    }

    #[test]
    fn test_malformed_frame_closes() {
        let now = Instant::now();
        let (mut client, mut server) = pair(now);
        handshake(&mut client, &mut server, now);

        // MAX_DATA without its value
        let mut payload = BytesMut::new();
        payload.put_u8(0x10);
        let mut datagram = BytesMut::new();
        let sent = client.spaces[Epoch::Data].journal().sent();
        let pn = PacketNumber::encode(sent.next_pn(), sent.largest_acked());
        let header = Header::new(Epoch::Data, client.dcid);
        client.seal_packet(Epoch::Data, header, pn, &payload, &mut datagram, Vec::new(), now);
        server.recv_datagram(datagram.freeze(), now);

        let Some(ConnectionError::Local(error)) = server.error() else {
            panic!("server still active");
        };
        assert_eq!(error.kind(), ErrorKind::FrameEncoding);

        pump(&mut server, &mut client, now);
        let Some(ConnectionError::Peer(error)) = client.error() else {
            panic!("client did not see the close");
        };
        assert_eq!(error.kind(), ErrorKind::FrameEncoding);
        assert!(client.poll_transmit(now).is_none());
    }

    #[test]
    fn test_close_then_closed() {
        let now = Instant::now();
        let (mut client, mut server) = pair(now);
        handshake(&mut client, &mut server, now);
        let stream = server.streams_mut().open(Dir::Bi).unwrap();

        let error = AppError::new(VarInt::from_u32(7), "done");
        client.close(error.clone().into(), now);
        let close = client.poll_transmit(now).unwrap();
        assert!(client.poll_transmit(now).is_none());
        server.recv_datagram(close, now);

        assert_eq!(
            server.error(),
            Some(&ConnectionError::Peer(error.clone().into()))
        );
        let mut cx = Context::from_waker(Waker::noop());
        assert!(matches!(
            server.streams_mut().poll_write(stream, &mut cx, b"late"),
            Poll::Ready(Err(StreamError::Connection(_)))
        ));

        let until = client.poll_timeout().unwrap();
        client.handle_timeout(until);
        assert!(client.is_closed());
        assert_eq!(client.error(), Some(&ConnectionError::Local(error.into())));
        let until = server.poll_timeout().unwrap();
        server.handle_timeout(until);
        assert!(server.is_closed());
    }

    #[test]
    fn test_closing_answers_with_close() {
        let now = Instant::now();
        let (mut client, mut server) = pair(now);
        handshake(&mut client, &mut server, now);
        let mut cx = Context::from_waker(Waker::noop());

        client.close(QuicError::with_default_fty(ErrorKind::Internal, "bug").into(), now);
        // the first CONNECTION_CLOSE is lost
        assert!(client.poll_transmit(now).is_some());

        let stream = server.streams_mut().open(Dir::Uni).unwrap();
        let _ = server.streams_mut().poll_write(stream, &mut cx, &[1; 5000]);
        let mut answered = false;
        while let Some(datagram) = server.poll_transmit(now) {
            client.recv_datagram(datagram, now);
            answered |= client.poll_transmit(now).is_some();
        }
        assert!(answered);
    }

    #[test]
    fn test_idle_timeout() {
        let now = Instant::now();
        let (mut client, mut server) = pair(now);
        handshake(&mut client, &mut server, now);

        let idle = now + Config::default().idle_timeout();
        let mut at = now;
        while !client.is_closed() {
            at = client.poll_timeout().unwrap();
            client.handle_timeout(at);
            while client.poll_transmit(at).is_some() {}
        }
        assert!(at >= idle);
        assert_eq!(client.error(), Some(&ConnectionError::IdleTimeout));
        assert!(client.poll_transmit(at).is_none());
    }

    #[test]
    fn test_missing_peer_parameters() {
        struct Mute(PlainCrypto);

        impl Crypto for Mute {
            fn level(&self) -> Epoch {
                self.0.level()
            }
            fn tag_len(&self, level: Epoch) -> usize {
                self.0.tag_len(level)
            }
            fn encrypt(
                &mut self,
                level: Epoch,
                pn: PacketNumber,
                header: &[u8],
                payload: &[u8],
            ) -> Bytes {
                self.0.encrypt(level, pn, header, payload)
            }
            fn decrypt(
                &mut self,
                level: Epoch,
                header: &[u8],
                protected: &[u8],
            ) -> Result<(PacketNumber, Bytes), crate::error::DecryptionFailure> {
                self.0.decrypt(level, header, protected)
            }
            fn peer_parameters(&self) -> Option<Parameters> {
                None
            }
        }

        let now = Instant::now();
        let config = Config::default();
        let crypto = Mute(PlainCrypto::new(config.parameters()));
        let mut client = RawConnection::new(Role::Client, config.clone(), Box::new(crypto), now);
        let mut server = endpoint(Role::Server, &config, now);
        pump(&mut client, &mut server, now);

        let Some(ConnectionError::Local(error)) = client.error() else {
            panic!("client completed without parameters");
        };
        assert_eq!(error.kind(), ErrorKind::TransportParameter);
    }
}
