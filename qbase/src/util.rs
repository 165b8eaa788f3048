mod arena;
mod index_deque;
mod range_set;

pub use arena::{Arena, Key};
pub use index_deque::{ExceedLimit, IndexDeque};
pub use range_set::RangeSet;
