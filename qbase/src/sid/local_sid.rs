use super::{Dir, MAX_STREAMS_LIMIT, Role, StreamId};
use crate::{
    frame::{MaxStreamsFrame, StreamsBlockedFrame},
    varint::VarInt,
};

/// Management of stream IDs that are allowed to be opened locally.
///
/// The number of streams that can be opened in each direction is limited by
/// the [`MaxStreamsFrame`] received from the peer. When the stream IDs in a
/// direction are exhausted, a [`StreamsBlockedFrame`] is produced for the peer,
/// once per limit.
#[derive(Debug)]
pub struct LocalStreamIds {
    role: Role,
    max: [u64; 2],
    unallocated: [u64; 2],
    blocked_at: [Option<u64>; 2],
}

impl LocalStreamIds {
    /// Create a new [`LocalStreamIds`] with our role, and the initial maximum
    /// number of streams the peer allows us to open in each [`Dir`].
    pub fn new(role: Role, max_bi: u64, max_uni: u64) -> Self {
        Self {
            role,
            max: [max_bi, max_uni],
            unallocated: [0, 0],
            blocked_at: [None, None],
        }
    }

    /// Returns local role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the number of opened streams in the `dir` direction.
    pub fn opened_streams(&self, dir: Dir) -> u64 {
        self.unallocated[dir as usize]
    }

    /// Returns the current limit set by the peer in the `dir` direction.
    pub fn max_streams(&self, dir: Dir) -> u64 {
        self.max[dir as usize]
    }

    /// Receive the [`MaxStreamsFrame`] from peer, raising the limit in its direction.
    ///
    /// Returns whether the limit was increased; a frame that does not increase
    /// the limit is ignored.
    pub fn recv_max_streams_frame(&mut self, frame: &MaxStreamsFrame) -> bool {
        let (dir, val) = match frame {
            MaxStreamsFrame::Bi(max) => (Dir::Bi, max.into_inner()),
            MaxStreamsFrame::Uni(max) => (Dir::Uni, max.into_inner()),
        };
        let max_streams = &mut self.max[dir as usize];
        if *max_streams < val.min(MAX_STREAMS_LIMIT) {
            *max_streams = val.min(MAX_STREAMS_LIMIT);
            true
        } else {
            false
        }
    }

    /// Allocate the next new [`StreamId`] in the `dir` direction.
    ///
    /// Returns `Err` when the limit is reached. The error carries a
    /// [`StreamsBlockedFrame`] the first time each limit is hit, which should be
    /// sent to the peer, and `None` afterwards.
    pub fn try_alloc_sid(&mut self, dir: Dir) -> Result<StreamId, Option<StreamsBlockedFrame>> {
        let idx = dir as usize;
        let max = self.max[idx];
        let unallocated = self.unallocated[idx];
        if unallocated < max {
            self.unallocated[idx] += 1;
            Ok(StreamId::new(self.role, dir, unallocated))
        } else if self.blocked_at[idx] == Some(max) {
            Err(None)
        } else {
            self.blocked_at[idx] = Some(max);
            tracing::debug!(%dir, max, "stream ids exhausted, peer should raise MAX_STREAMS");
            Err(Some(StreamsBlockedFrame::with(dir, VarInt(max))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_until_blocked() {
        let mut sids = LocalStreamIds::new(Role::Client, 2, 0);
        assert_eq!(
            sids.try_alloc_sid(Dir::Bi),
            Ok(StreamId::new(Role::Client, Dir::Bi, 0))
        );
        assert_eq!(
            sids.try_alloc_sid(Dir::Bi),
            Ok(StreamId::new(Role::Client, Dir::Bi, 1))
        );
        assert_eq!(
            sids.try_alloc_sid(Dir::Bi),
            Err(Some(StreamsBlockedFrame::Bi(VarInt(2))))
        );
        // blocked only reported once per limit
        assert_eq!(sids.try_alloc_sid(Dir::Bi), Err(None));
        assert_eq!(
            sids.try_alloc_sid(Dir::Uni),
            Err(Some(StreamsBlockedFrame::Uni(VarInt(0))))
        );
        assert_eq!(sids.opened_streams(Dir::Bi), 2);
    }

    #[test]
    fn test_recv_max_streams() {
        let mut sids = LocalStreamIds::new(Role::Server, 0, 0);
        assert!(sids.try_alloc_sid(Dir::Uni).is_err());
        assert!(sids.recv_max_streams_frame(&MaxStreamsFrame::Uni(VarInt(1))));
        // lower limits are ignored
        assert!(!sids.recv_max_streams_frame(&MaxStreamsFrame::Uni(VarInt(0))));
        assert_eq!(
            sids.try_alloc_sid(Dir::Uni),
            Ok(StreamId::new(Role::Server, Dir::Uni, 0))
        );
        assert_eq!(sids.max_streams(Dir::Uni), 1);
    }
}
