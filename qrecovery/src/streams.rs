//! The data streams of a connection, see [`DataStreams`].
mod data;
pub mod error;

pub use data::{DataStreams, StreamKey};
pub use error::StreamError;
