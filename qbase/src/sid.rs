use std::fmt;

use crate::{
    role::Role,
    varint::{VarInt, WriteVarInt, be_varint},
};

mod local_sid;
mod remote_sid;

pub use local_sid::LocalStreamIds;
pub use remote_sid::{AcceptSid, ExceedLimitError, NeedCreate, RemoteStreamIds};

/// Sum type for stream directions.
///
/// Unidirectional streams carry data in one direction: from the initiator of the stream to its peer.
/// Bidirectional streams allow for data to be sent in both directions.
///
/// The second least significant bit (0x02) of the [`StreamId`] distinguishes between
/// bidirectional streams (with the bit set to 0) and unidirectional streams (with the bit set to 1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Dir {
    /// Data flows in both directions
    Bi = 0,
    /// Data flows only from the stream's initiator
    Uni = 1,
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match *self {
            Self::Bi => "bidirectional",
            Self::Uni => "unidirectional",
        })
    }
}

/// Streams are identified within a connection by a numeric value,
/// referred to as the stream ID.
///
/// A stream ID is a 62-bit integer that is unique for all streams on a connection,
/// encoded as [`VarInt`]. The low two bits carry the initiator [`Role`] and the
/// [`Dir`], so each of the four stream classes numbers its streams independently.
/// Stream IDs are never reused within a connection.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StreamId(u64);

/// Maximum ID for each type of stream.
///
/// After removing the lowest 2 bits for direction and role,
/// the remaining 60 bits are used to represent the actual ID for each type of stream.
pub const MAX_STREAMS_LIMIT: u64 = (1 << 60) - 1;

impl StreamId {
    /// Create a new stream ID with the given role, direction, and ID.
    pub fn new(role: Role, dir: Dir, id: u64) -> Self {
        assert!(id <= MAX_STREAMS_LIMIT);
        Self((((id << 1) | (dir as u64)) << 1) | (role as u64))
    }

    /// Returns the role of the initiator of this stream.
    pub fn role(&self) -> Role {
        if self.0 & 0x1 == 0 {
            Role::Client
        } else {
            Role::Server
        }
    }

    /// Returns the direction of this stream ID.
    pub fn dir(&self) -> Dir {
        if self.0 & 2 == 0 { Dir::Bi } else { Dir::Uni }
    }

    /// Get the actual ID of this stream, removing the lowest 2 bits for direction and role.
    pub fn id(&self) -> u64 {
        self.0 >> 2
    }

    /// Return the encoding size of this stream ID.
    pub fn encoding_size(&self) -> usize {
        VarInt(self.0).encoding_size()
    }

    // Stream ids handed out by the id managers stay below MAX_STREAMS_LIMIT,
    // so the successor is always representable.
    fn successor(&self) -> Self {
        Self(self.0 + 4)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} side {} stream {}",
            self.role(),
            self.dir(),
            self.id()
        )
    }
}

impl From<VarInt> for StreamId {
    fn from(v: VarInt) -> Self {
        Self(v.into_inner())
    }
}

impl From<StreamId> for VarInt {
    fn from(s: StreamId) -> Self {
        VarInt(s.0)
    }
}

impl From<StreamId> for u64 {
    fn from(s: StreamId) -> Self {
        s.0
    }
}

/// Parse a stream ID from the input bytes,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
pub fn be_streamid(input: &[u8]) -> nom::IResult<&[u8], StreamId> {
    use nom::{Parser, combinator::map};
    map(be_varint, StreamId::from).parse(input)
}

/// A BufMut extension trait for writing a stream ID.
pub trait WriteStreamId: bytes::BufMut {
    /// Write a stream ID to the buffer.
    fn put_streamid(&mut self, stream_id: &StreamId);
}

impl<T: bytes::BufMut> WriteStreamId for T {
    fn put_streamid(&mut self, stream_id: &StreamId) {
        self.put_varint(&(*stream_id).into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_layout() {
        let sid = StreamId::new(Role::Client, Dir::Bi, 0);
        assert_eq!(u64::from(sid), 0);
        let sid = StreamId::new(Role::Server, Dir::Bi, 0);
        assert_eq!(u64::from(sid), 1);
        let sid = StreamId::new(Role::Client, Dir::Uni, 0);
        assert_eq!(u64::from(sid), 2);
        let sid = StreamId::new(Role::Server, Dir::Uni, 3);
        assert_eq!(u64::from(sid), 15);
        assert_eq!(sid.role(), Role::Server);
        assert_eq!(sid.dir(), Dir::Uni);
        assert_eq!(sid.id(), 3);
        assert_eq!(sid.successor().id(), 4);
        assert_eq!(sid.to_string(), "server side unidirectional stream 3");
    }

    #[test]
    fn test_read_write_stream_id() {
        let mut buf = Vec::new();
        let sid = StreamId::new(Role::Client, Dir::Bi, 0x1234 >> 2);
        buf.put_streamid(&sid);
        assert_eq!(buf, vec![0x52, 0x34]);
        assert_eq!(be_streamid(&buf), Ok((&[][..], sid)));
    }
}
