use thiserror::Error;

use super::{Dir, MAX_STREAMS_LIMIT, Role, StreamId};
use crate::{
    frame::{MaxStreamsFrame, StreamsBlockedFrame},
    varint::VarInt,
};

/// Exceed the maximum stream ID limit error,
/// similar with [`ErrorKind::StreamLimit`](`crate::error::ErrorKind::StreamLimit`).
///
/// This error occurs when the stream ID in the received stream-related frames
/// exceeds the limit we advertised to the peer.
#[derive(Debug, PartialEq, Eq, Error)]
#[error("{0} exceed limit: {1}")]
pub struct ExceedLimitError(pub StreamId, pub u64);

/// Result of accepting a stream ID received from peer.
#[derive(Debug, PartialEq, Eq)]
pub enum AcceptSid {
    /// The stream ID was already opened before.
    Old,
    /// The stream ID is new, the `NeedCreate` inside is the range of stream IDs
    /// that need to be created together.
    New(NeedCreate),
}

/// The range of stream IDs that need to be created, see [`AcceptSid::New`].
#[derive(Debug, PartialEq, Eq)]
pub struct NeedCreate {
    start: StreamId,
    end: StreamId,
}

impl Iterator for NeedCreate {
    type Item = StreamId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start > self.end {
            None
        } else {
            let id = self.start;
            self.start = self.start.successor();
            Some(id)
        }
    }
}

/// Management of the stream IDs opened by peer.
///
/// Checks whether the stream IDs in received frames exceed the limit, and reports
/// which streams must be created. Before a stream is created, all streams of the
/// same type with lower-numbered stream IDs must be created, because frames can
/// arrive out of order.
///
/// Whenever a peer stream ends, the limit in its direction is raised by one,
/// keeping the number of concurrent streams available to the peer constant.
#[derive(Debug)]
pub struct RemoteStreamIds {
    role: Role,
    max: [u64; 2],
    unallocated: [StreamId; 2],
}

impl RemoteStreamIds {
    /// Create a new [`RemoteStreamIds`] with the peer's role, and the maximum
    /// number of streams the peer may open in each [`Dir`].
    pub fn new(role: Role, max_bi: u64, max_uni: u64) -> Self {
        Self {
            role,
            max: [max_bi, max_uni],
            unallocated: [
                StreamId::new(role, Dir::Bi, 0),
                StreamId::new(role, Dir::Uni, 0),
            ],
        }
    }

    /// Returns the role of the peer.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Try to accept the stream ID received from peer.
    pub fn try_accept_sid(&mut self, sid: StreamId) -> Result<AcceptSid, ExceedLimitError> {
        debug_assert_eq!(sid.role(), self.role);
        let idx = sid.dir() as usize;
        if sid.id() >= self.max[idx] {
            tracing::error!("   Cause by: accepted {sid}");
            return Err(ExceedLimitError(sid, self.max[idx]));
        }
        let cur = &mut self.unallocated[idx];
        if sid < *cur {
            Ok(AcceptSid::Old)
        } else {
            let start = *cur;
            *cur = sid.successor();
            Ok(AcceptSid::New(NeedCreate { start, end: sid }))
        }
    }

    /// Called when a stream opened by the peer has been fully closed.
    ///
    /// Returns the [`MaxStreamsFrame`] announcing the raised limit.
    pub fn on_end_of_stream(&mut self, sid: StreamId) -> Option<MaxStreamsFrame> {
        if sid.role() != self.role {
            return None;
        }
        let max = &mut self.max[sid.dir() as usize];
        if *max >= MAX_STREAMS_LIMIT {
            return None;
        }
        *max += 1;
        Some(MaxStreamsFrame::with(sid.dir(), VarInt(*max)))
    }

    /// The MAX_STREAMS frame carrying the current limit in `dir`.
    pub fn max_streams_frame(&self, dir: Dir) -> MaxStreamsFrame {
        MaxStreamsFrame::with(dir, VarInt(self.max[dir as usize]))
    }

    /// The peer reported it is blocked by our limit; the limit only grows as
    /// streams end, so this is informational.
    pub fn recv_streams_blocked_frame(&mut self, frame: &StreamsBlockedFrame) {
        let (dir, max_streams) = match frame {
            StreamsBlockedFrame::Bi(max) => (Dir::Bi, max.into_inner()),
            StreamsBlockedFrame::Uni(max) => (Dir::Uni, max.into_inner()),
        };
        tracing::debug!(%dir, max_streams, current = self.max[dir as usize], "peer is blocked by stream limit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_accept_sid() {
        let mut sids = RemoteStreamIds::new(Role::Server, 10, 5);
        let result = sids.try_accept_sid(StreamId::new(Role::Server, Dir::Bi, 0));
        assert_eq!(
            result,
            Ok(AcceptSid::New(NeedCreate {
                start: StreamId::new(Role::Server, Dir::Bi, 0),
                end: StreamId::new(Role::Server, Dir::Bi, 0)
            }))
        );
        assert_eq!(sids.unallocated[0], StreamId::new(Role::Server, Dir::Bi, 1));

        let result = sids.try_accept_sid(StreamId::new(Role::Server, Dir::Uni, 2));
        let Ok(AcceptSid::New(range)) = result else {
            panic!("expected new streams");
        };
        assert_eq!(
            range.collect::<Vec<_>>(),
            vec![
                StreamId::new(Role::Server, Dir::Uni, 0),
                StreamId::new(Role::Server, Dir::Uni, 1),
                StreamId::new(Role::Server, Dir::Uni, 2),
            ]
        );
        assert_eq!(
            sids.try_accept_sid(StreamId::new(Role::Server, Dir::Uni, 1)),
            Ok(AcceptSid::Old)
        );

        let result = sids.try_accept_sid(StreamId::new(Role::Server, Dir::Uni, 5));
        assert_eq!(
            result,
            Err(ExceedLimitError(StreamId::new(Role::Server, Dir::Uni, 5), 5))
        );
    }

    #[test]
    fn test_end_of_stream_raises_limit() {
        let mut sids = RemoteStreamIds::new(Role::Client, 1, 0);
        let sid = StreamId::new(Role::Client, Dir::Bi, 0);
        assert!(sids.try_accept_sid(sid).is_ok());
        assert!(
            sids.try_accept_sid(StreamId::new(Role::Client, Dir::Bi, 1))
                .is_err()
        );
        assert_eq!(
            sids.on_end_of_stream(sid),
            Some(MaxStreamsFrame::Bi(VarInt(2)))
        );
        assert!(
            sids.try_accept_sid(StreamId::new(Role::Client, Dir::Bi, 1))
                .is_ok()
        );
        // streams opened by ourselves do not affect the peer's limit
        assert_eq!(
            sids.on_end_of_stream(StreamId::new(Role::Server, Dir::Bi, 0)),
            None
        );
    }

    #[test]
    fn test_current_max_streams_frame() {
        let mut sids = RemoteStreamIds::new(Role::Client, 2, 1);
        assert_eq!(
            sids.max_streams_frame(Dir::Bi),
            MaxStreamsFrame::Bi(VarInt(2))
        );
        sids.on_end_of_stream(StreamId::new(Role::Client, Dir::Uni, 0));
        assert_eq!(
            sids.max_streams_frame(Dir::Uni),
            MaxStreamsFrame::Uni(VarInt(2))
        );
    }
}
