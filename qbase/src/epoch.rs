use std::fmt;

/// Encryption levels of a connection, each with its own packet number space.
///
/// Initial and Handshake carry the cryptographic handshake, Data carries
/// application data once the handshake keys are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Epoch {
    Initial = 0,
    Handshake = 1,
    Data = 2,
}

impl Epoch {
    /// All epochs, in the order their keys become available.
    pub const ALL: [Epoch; 3] = [Epoch::Initial, Epoch::Handshake, Epoch::Data];

    pub fn iter() -> std::slice::Iter<'static, Epoch> {
        Self::ALL.iter()
    }
}

impl TryFrom<u8> for Epoch {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Epoch::Initial),
            1 => Ok(Epoch::Handshake),
            2 => Ok(Epoch::Data),
            other => Err(other),
        }
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Epoch::Initial => "initial",
            Epoch::Handshake => "handshake",
            Epoch::Data => "data",
        })
    }
}

impl<T> std::ops::Index<Epoch> for [T; 3] {
    type Output = T;

    fn index(&self, index: Epoch) -> &Self::Output {
        &self[index as usize]
    }
}

impl<T> std::ops::IndexMut<Epoch> for [T; 3] {
    fn index_mut(&mut self, index: Epoch) -> &mut Self::Output {
        &mut self[index as usize]
    }
}
