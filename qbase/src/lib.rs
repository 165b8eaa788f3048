//! Protocol primitives shared by the connection engine: variable-length
//! integers, stream ids, frames and their codec, error codes, flow control
//! windows, packet headers and configuration.

pub mod cid;
pub mod config;
pub mod epoch;
pub mod error;
pub mod flow;
pub mod frame;
pub mod packet;
pub mod role;
pub mod sid;
pub mod util;
pub mod varint;
