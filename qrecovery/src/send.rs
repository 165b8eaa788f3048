//! The sending half of a stream.
mod sender;
mod sndbuf;

pub use sender::{SendState, Sender};
pub use sndbuf::SendBuf;
