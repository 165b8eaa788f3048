use std::{fmt, ops::Deref};

use rand::Rng;

/// The longest connection ID, in bytes.
pub const MAX_CID_SIZE: usize = 20;

/// A connection ID, which lets an endpoint find the connection an incoming packet belongs to.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct ConnectionId {
    len: u8,
    bytes: [u8; MAX_CID_SIZE],
}

impl ConnectionId {
    /// Create a connection ID from at most [`MAX_CID_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > MAX_CID_SIZE {
            return None;
        }
        let mut cid = Self {
            len: bytes.len() as u8,
            bytes: [0; MAX_CID_SIZE],
        };
        cid.bytes[..bytes.len()].copy_from_slice(bytes);
        Some(cid)
    }

    /// Generate a random connection ID of the given length, capped at [`MAX_CID_SIZE`].
    pub fn random_gen(len: usize) -> Self {
        let len = len.min(MAX_CID_SIZE);
        let mut bytes = [0; MAX_CID_SIZE];
        rand::rng().fill(&mut bytes[..len]);
        Self {
            len: len as u8,
            bytes,
        }
    }

    pub fn encoding_size(&self) -> usize {
        1 + self.len as usize
    }
}

impl Deref for ConnectionId {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes[..self.len as usize]
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Parse a length-prefixed connection ID,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
pub fn be_connection_id(input: &[u8]) -> nom::IResult<&[u8], ConnectionId> {
    let Some((&len, remain)) = input.split_first() else {
        return Err(nom::Err::Incomplete(nom::Needed::new(1)));
    };
    let len = len as usize;
    if len > MAX_CID_SIZE {
        return Err(nom::Err::Error(nom::error::make_error(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    if remain.len() < len {
        return Err(nom::Err::Incomplete(nom::Needed::new(len - remain.len())));
    }
    let (bytes, remain) = remain.split_at(len);
    let mut cid = ConnectionId {
        len: len as u8,
        bytes: [0; MAX_CID_SIZE],
    };
    cid.bytes[..len].copy_from_slice(bytes);
    Ok((remain, cid))
}

/// Write a length-prefixed connection ID into a buffer.
pub trait WriteConnectionId {
    fn put_connection_id(&mut self, cid: &ConnectionId);
}

impl<T: bytes::BufMut> WriteConnectionId for T {
    fn put_connection_id(&mut self, cid: &ConnectionId) {
        self.put_u8(cid.len);
        self.put_slice(cid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_codec() {
        let cid = ConnectionId::random_gen(8);
        assert_eq!(cid.len(), 8);
        let mut buf = Vec::new();
        buf.put_connection_id(&cid);
        assert_eq!(buf.len(), cid.encoding_size());
        assert_eq!(be_connection_id(&buf).unwrap(), (&[][..], cid));
    }

    #[test]
    fn test_connection_id_too_long() {
        assert!(ConnectionId::from_slice(&[0; 21]).is_none());
        let mut buf = vec![21];
        buf.extend_from_slice(&[0; 21]);
        assert!(be_connection_id(&buf).is_err());
        assert_eq!(ConnectionId::random_gen(64).len(), MAX_CID_SIZE);
    }

    #[test]
    fn test_display() {
        let cid = ConnectionId::from_slice(&[0xde, 0xad]).unwrap();
        assert_eq!(cid.to_string(), "dead");
    }
}
