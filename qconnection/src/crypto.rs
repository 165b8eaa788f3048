use bytes::{BufMut, Bytes, BytesMut};
use qbase::{
    config::Parameters,
    epoch::Epoch,
    packet::{PacketNumber, WritePacketNumber, take_pn_len},
};

use crate::error::DecryptionFailure;

/// The handshake and record layer of a connection.
///
/// It owns the keys of every encryption level, protects outgoing packets
/// and opens incoming ones. The connection learns the progress of the
/// handshake from [`Crypto::level`]; once the application level is reached
/// the peer's transport parameters must be known.
pub trait Crypto: Send + 'static {
    /// The highest encryption level whose keys are available.
    fn level(&self) -> Epoch;

    /// Bytes sealing adds to a packet besides the truncated packet number.
    fn tag_len(&self, level: Epoch) -> usize;

    /// Seal the `payload` of a packet.
    ///
    /// `header` is authenticated but sent in the clear. The result is exactly
    /// `pn.size() + payload.len() + self.tag_len(level)` bytes.
    fn encrypt(&mut self, level: Epoch, pn: PacketNumber, header: &[u8], payload: &[u8]) -> Bytes;

    /// Open the protected part of a packet, returning its truncated packet
    /// number and payload.
    fn decrypt(
        &mut self,
        level: Epoch,
        header: &[u8],
        protected: &[u8],
    ) -> Result<(PacketNumber, Bytes), DecryptionFailure>;

    /// The peer's transport parameters, once the handshake revealed them.
    fn peer_parameters(&self) -> Option<Parameters>;
}

/// A record layer without confidentiality, for tests and local links.
///
/// The protected part of a packet is the packet number length, the packet
/// number, the payload and a one byte checksum over all of it and the
/// header. Every packet opened at the current level or above moves the
/// handshake one level forward, so a client and a server reach the
/// application level after one round trip.
#[derive(Debug, Clone)]
pub struct PlainCrypto {
    level: Epoch,
    peer_parameters: Parameters,
}

impl PlainCrypto {
    /// `peer_parameters` stand for the parameters the handshake would carry.
    pub fn new(peer_parameters: Parameters) -> Self {
        Self {
            level: Epoch::Initial,
            peer_parameters,
        }
    }
}

fn checksum(header: &[u8], body: &[u8]) -> u8 {
    header
        .iter()
        .chain(body)
        .fold(0u8, |sum, byte| sum.wrapping_mul(31).wrapping_add(*byte))
}

fn next_level(level: Epoch) -> Epoch {
    match level {
        Epoch::Initial => Epoch::Handshake,
        Epoch::Handshake | Epoch::Data => Epoch::Data,
    }
}

impl Crypto for PlainCrypto {
    fn level(&self) -> Epoch {
        self.level
    }

    fn tag_len(&self, _level: Epoch) -> usize {
        2
    }

    fn encrypt(&mut self, _level: Epoch, pn: PacketNumber, header: &[u8], payload: &[u8]) -> Bytes {
        let mut sealed = BytesMut::with_capacity(pn.size() + payload.len() + 2);
        sealed.put_u8(pn.size() as u8);
        sealed.put_packet_number(pn);
        sealed.put_slice(payload);
        sealed.put_u8(checksum(header, &sealed));
        sealed.freeze()
    }

    fn decrypt(
        &mut self,
        level: Epoch,
        header: &[u8],
        protected: &[u8],
    ) -> Result<(PacketNumber, Bytes), DecryptionFailure> {
        let failure = |reason: &str| DecryptionFailure {
            level,
            reason: reason.to_owned(),
        };
        let (&sum, body) = protected.split_last().ok_or_else(|| failure("empty packet"))?;
        if checksum(header, body) != sum {
            return Err(failure("checksum mismatch"));
        }
        let (&pn_len, rest) = body.split_first().ok_or_else(|| failure("missing packet number"))?;
        let (payload, pn) =
            take_pn_len(pn_len)(rest).map_err(|_| failure("invalid packet number"))?;

        if level >= self.level {
            self.level = next_level(level);
        }
        Ok((pn, Bytes::copy_from_slice(payload)))
    }

    fn peer_parameters(&self) -> Option<Parameters> {
        (self.level == Epoch::Data).then_some(self.peer_parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let mut client = PlainCrypto::new(Parameters::default());
        let mut server = PlainCrypto::new(Parameters::default());
        let pn = PacketNumber::encode(7, None);
        let sealed = client.encrypt(Epoch::Initial, pn, b"hdr", b"payload");
        assert_eq!(sealed.len(), pn.size() + 7 + client.tag_len(Epoch::Initial));

        assert_eq!(server.peer_parameters(), None);
        let (opened_pn, payload) = server.decrypt(Epoch::Initial, b"hdr", &sealed).unwrap();
        assert_eq!(opened_pn, pn);
        assert_eq!(&payload[..], b"payload");
        assert_eq!(server.level(), Epoch::Handshake);

        // an Initial packet no longer moves the handshake forward
        server.decrypt(Epoch::Initial, b"hdr", &sealed).unwrap();
        assert_eq!(server.level(), Epoch::Handshake);
        let sealed = client.encrypt(Epoch::Data, pn, b"hdr", b"");
        server.decrypt(Epoch::Data, b"hdr", &sealed).unwrap();
        assert_eq!(server.level(), Epoch::Data);
        assert_eq!(server.peer_parameters(), Some(Parameters::default()));
    }

    #[test]
    fn test_corrupted_packet() {
        let mut crypto = PlainCrypto::new(Parameters::default());
        let pn = PacketNumber::encode(0, None);
        let sealed = crypto.encrypt(Epoch::Initial, pn, b"hdr", b"payload");
        let mut corrupted = sealed.to_vec();
        corrupted[4] ^= 0xff;
        let error = crypto
            .decrypt(Epoch::Initial, b"hdr", &corrupted)
            .unwrap_err();
        assert_eq!(error.level, Epoch::Initial);
        // a different header fails the same way
        assert!(crypto.decrypt(Epoch::Initial, b"HDR", &sealed).is_err());
        assert!(crypto.decrypt(Epoch::Initial, b"hdr", &[]).is_err());
        assert_eq!(crypto.level(), Epoch::Initial);
    }
}
