//! Reliable delivery on top of packets that may be lost, reordered or duplicated.
//!
//! - [`journal`] records what each packet number space sent and received,
//!   producing ACK frames and resolving received ones.
//! - [`send`] and [`recv`] are the two halves of a stream with their buffers.
//! - [`streams`] owns all streams of a connection and their flow control.
pub mod journal;
pub mod recv;
pub mod send;
pub mod streams;
