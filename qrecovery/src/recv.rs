//! The receiving half of a stream.
mod rcvbuf;
mod recver;

pub use rcvbuf::RecvBuf;
pub use recver::{Accounting, RecvState, Recver};
