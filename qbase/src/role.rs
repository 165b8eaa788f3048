use std::{fmt, ops};

/// Roles of the two endpoints of a connection.
///
/// The least significant bit (0x01) of a [`StreamId`](crate::sid::StreamId) identifies
/// the initiator role of the stream. Client-initiated streams have even-numbered
/// stream IDs, server-initiated streams have odd-numbered stream IDs.
///
/// # Example
///
/// ```
/// use qbase::role::Role;
///
/// let local = Role::Client;
/// let peer = !local;
/// assert_eq!(peer, Role::Server);
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Role {
    /// The initiator of a connection
    Client = 0,
    /// The acceptor of a connection
    Server = 1,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match *self {
            Self::Client => "client",
            Self::Server => "server",
        })
    }
}

impl ops::Not for Role {
    type Output = Self;
    fn not(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}
