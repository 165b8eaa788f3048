use bytes::BufMut;
use nom::Parser;
use thiserror::Error;

use crate::{
    cid::{ConnectionId, WriteConnectionId, be_connection_id},
    epoch::Epoch,
    varint::{VarInt, WriteVarInt, be_varint},
};

mod number;

pub use number::{PacketNumber, WritePacketNumber, take_pn_len};

/// The plaintext header in front of each packet.
///
/// ```text
/// Packet {
///   Header Form (1) = 1 for Initial/Handshake, 0 for Data,
///   Fixed Bit (1) = 1,
///   Long Packet Type (2),
///   Reserved (4),
///   Destination Connection ID Length (8),
///   Destination Connection ID (0..160),
///   Length (i),
///   Protected Payload (..),
/// }
/// ```
///
/// The protected part starts with the truncated packet number and is only
/// readable by the crypto layer. The Length field lets several packets of
/// different epochs share one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    epoch: Epoch,
    dcid: ConnectionId,
}

const FIXED_BIT: u8 = 0x40;
const LONG_HEADER_BIT: u8 = 0x80;
const INITIAL_TYPE: u8 = LONG_HEADER_BIT | FIXED_BIT;
const HANDSHAKE_TYPE: u8 = LONG_HEADER_BIT | FIXED_BIT | 0x20;
const DATA_TYPE: u8 = FIXED_BIT;

/// Errors when reading packet headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Unknown packet type {0:#04x}")]
    UnknownType(u8),
    #[error("Incomplete packet header: {0}")]
    Incomplete(String),
    #[error("Invalid packet header: {0}")]
    Invalid(String),
}

impl Header {
    pub fn new(epoch: Epoch, dcid: ConnectionId) -> Self {
        Self { epoch, dcid }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn dcid(&self) -> &ConnectionId {
        &self.dcid
    }

    /// Size of the header given the length of the protected part.
    pub fn encoding_size(&self, protected_len: usize) -> usize {
        1 + self.dcid.encoding_size() + VarInt(protected_len as u64).encoding_size()
    }

    fn type_byte(&self) -> u8 {
        match self.epoch {
            Epoch::Initial => INITIAL_TYPE,
            Epoch::Handshake => HANDSHAKE_TYPE,
            Epoch::Data => DATA_TYPE,
        }
    }
}

/// Write a packet header with the length of the protected part that follows it.
pub trait WriteHeader {
    fn put_header(&mut self, header: &Header, protected_len: usize);
}

impl<T: BufMut> WriteHeader for T {
    fn put_header(&mut self, header: &Header, protected_len: usize) {
        self.put_u8(header.type_byte());
        self.put_connection_id(&header.dcid);
        self.put_varint(&VarInt(protected_len as u64));
    }
}

/// Split the first packet off a datagram.
///
/// Returns the header, the raw header bytes, the protected part and what
/// remains of the datagram.
pub fn split_packet(datagram: &[u8]) -> Result<(Header, &[u8], &[u8], &[u8]), Error> {
    let Some(&ty) = datagram.first() else {
        return Err(Error::Incomplete("empty datagram".to_owned()));
    };
    let epoch = match ty {
        INITIAL_TYPE => Epoch::Initial,
        HANDSHAKE_TYPE => Epoch::Handshake,
        DATA_TYPE => Epoch::Data,
        ty => return Err(Error::UnknownType(ty)),
    };
    let (remain, (dcid, length)) = (be_connection_id, be_varint)
        .parse(&datagram[1..])
        .map_err(|e| match e {
            nom::Err::Incomplete(_) => Error::Incomplete(e.to_string()),
            _ => Error::Invalid(e.to_string()),
        })?;
    let length = length.into_inner() as usize;
    if remain.len() < length {
        return Err(Error::Incomplete(format!(
            "protected payload needs {length} bytes, only {} left",
            remain.len()
        )));
    }
    let header_len = datagram.len() - remain.len();
    let (protected, rest) = remain.split_at(length);
    Ok((
        Header::new(epoch, dcid),
        &datagram[..header_len],
        protected,
        rest,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesced_packets() {
        let dcid = ConnectionId::from_slice(&[1, 2, 3, 4]).unwrap();
        let mut datagram = Vec::new();
        let initial = Header::new(Epoch::Initial, dcid);
        datagram.put_header(&initial, 3);
        datagram.extend_from_slice(b"abc");
        let data = Header::new(Epoch::Data, dcid);
        datagram.put_header(&data, 2);
        datagram.extend_from_slice(b"de");
        assert_eq!(
            datagram.len(),
            initial.encoding_size(3) + 3 + data.encoding_size(2) + 2
        );

        let (header, raw, protected, rest) = split_packet(&datagram).unwrap();
        assert_eq!(header, initial);
        assert_eq!(raw.len(), initial.encoding_size(3));
        assert_eq!(protected, b"abc");
        let (header, _, protected, rest) = split_packet(rest).unwrap();
        assert_eq!(header.epoch(), Epoch::Data);
        assert_eq!(header.dcid(), &dcid);
        assert_eq!(protected, b"de");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_bad_packets() {
        assert_eq!(split_packet(&[0x00, 0]), Err(Error::UnknownType(0)));
        assert!(matches!(split_packet(&[]), Err(Error::Incomplete(_))));
        // length beyond the datagram
        assert!(matches!(
            split_packet(&[DATA_TYPE, 0, 5, 1, 2]),
            Err(Error::Incomplete(_))
        ));
    }
}
